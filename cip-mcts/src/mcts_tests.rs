use std::collections::BTreeSet;

use cip_core::{InitialState, Intervention, InterventionSpace, RewardModel, SWAP_SENTINEL};

use crate::{
    select_child, uct_score, Arena, CausalMcts, Expansion, MctsConfig, MctsError, Node,
    NodeId, NullSink, Phase, Problem, Termination, TraceEvent, UntriedActions, VecSink, ROOT,
};

fn initial(objects: &[(&str, [f64; 3])], rels: &[&str]) -> InitialState {
    InitialState {
        objects: objects.iter().map(|(k, p)| (k.to_string(), *p)).collect(),
        relationships: rels.iter().map(|s| s.to_string()).collect(),
    }
}

fn space(entries: &[(&str, &[&str])]) -> InterventionSpace {
    entries
        .iter()
        .map(|(obj, acts)| (obj.to_string(), acts.iter().map(|a| a.to_string()).collect()))
        .collect()
}

fn goal(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn cfg(threshold: f64) -> MctsConfig {
    MctsConfig {
        iterations: 100,
        exploration_constant: 0.5,
        seed: 42,
        alignment_threshold: threshold,
        ..MctsConfig::default()
    }
}

/// Two blocks, block 1 resting 2cm off-centre on block 0.
fn two_block_problem(termination_threshold: f64) -> Problem {
    Problem {
        initial: initial(
            &[("0", [0.0, 0.0, 0.0]), ("1", [0.02, 0.0, 0.0])],
            &["On(1,0)"],
        ),
        space: space(&[("1", &["left,0.01", "right,0.01"])]),
        reward: RewardModel::new(goal(&["On(1,0)"]), 0.0, 0.05),
        max_rollout_depth: 2,
        termination_threshold,
    }
}

fn three_block_problem(termination_threshold: f64) -> Problem {
    Problem {
        initial: initial(
            &[
                ("0", [0.0, 0.0, 0.0]),
                ("1", [0.03, 0.0, 0.04]),
                ("2", [0.0, 0.03, 0.08]),
            ],
            &["On(1,0)", "On(2,1)", "Clear(2)"],
        ),
        space: space(&[
            ("1", &["left,0.01", "right,0.01"]),
            ("2", &["forward,0.01", "back,0.01"]),
        ]),
        reward: RewardModel::new(goal(&["On(1,0)", "On(2,1)"]), 0.0, 0.05),
        max_rollout_depth: 3,
        termination_threshold,
    }
}

#[test]
fn uct_prefers_unvisited_child_regardless_of_reward() {
    let mut arena = Arena::with_root();
    let a = arena.attach(Node::new(vec![Intervention::new("1", "left,0.01")], Some(ROOT)));
    let b = arena.attach(Node::new(vec![Intervention::new("1", "right,0.01")], Some(ROOT)));
    arena.get_mut(ROOT).visits = 5;
    arena.get_mut(a).visits = 5;
    arena.get_mut(a).total_reward = 1.0e6;

    assert_eq!(select_child(&arena, ROOT, 0.0), Some(b));
    assert_eq!(select_child(&arena, ROOT, 10.0), Some(b));
}

#[test]
fn uct_ties_between_unvisited_go_to_first_child() {
    let mut arena = Arena::with_root();
    let a = arena.attach(Node::new(vec![Intervention::new("1", "left,0.01")], Some(ROOT)));
    let _b = arena.attach(Node::new(vec![Intervention::new("2", "left,0.01")], Some(ROOT)));
    assert_eq!(select_child(&arena, ROOT, 1.0), Some(a));
    assert_eq!(select_child(&Arena::with_root(), ROOT, 1.0), None);
}

#[test]
fn uct_score_formula() {
    assert_eq!(uct_score(3.0, 0, 10, 1.0), f64::INFINITY);
    let s = uct_score(3.0, 2, 10, 0.5);
    let expected = 1.5 + 0.5 * ((10f64).ln() / 2.0).sqrt();
    assert!((s - expected).abs() < 1e-12);
    // C = 0 is pure exploitation.
    assert_eq!(uct_score(3.0, 2, 10, 0.0), 1.5);
}

#[test]
fn uct_exploration_can_outrank_higher_mean() {
    let mut arena = Arena::with_root();
    let a = arena.attach(Node::new(vec![Intervention::new("1", "left,0.01")], Some(ROOT)));
    let b = arena.attach(Node::new(vec![Intervention::new("1", "right,0.01")], Some(ROOT)));
    arena.get_mut(ROOT).visits = 101;
    arena.get_mut(a).visits = 100;
    arena.get_mut(a).total_reward = 60.0;
    arena.get_mut(b).visits = 1;
    arena.get_mut(b).total_reward = 0.5;

    assert_eq!(select_child(&arena, ROOT, 0.0), Some(a));
    assert_eq!(select_child(&arena, ROOT, 1.0), Some(b));
}

#[test]
fn two_block_scenario_succeeds_on_first_iteration() {
    let mut m = CausalMcts::new(cfg(0.05), two_block_problem(0.9)).unwrap();
    let res = m.search_resolution(50, &mut NullSink);

    assert_eq!(res.termination, Termination::Success);
    assert_eq!(res.iterations, 0);
    assert_eq!(res.interventions, vec![Intervention::new("1", "left,0.01")]);

    // 0.95 terminal (goal held, one step) + 0.25 alignment bonus for block 1.
    let r = res.best_reward.unwrap();
    assert!((r - 1.2).abs() < 1e-9, "reward={}", r);
    assert_eq!(res.history.len(), 1);
    assert_eq!(res.history[0].interventions, res.interventions);
    assert_eq!(m.arena().get(ROOT).visits, 1);
}

#[test]
fn backpropagation_conserves_visits() {
    let n = 25;
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    let res = m.search_resolution(n, &mut NullSink);

    assert_eq!(res.termination, Termination::BudgetExhausted);
    assert_eq!(res.iterations, n);
    assert_eq!(res.stats.skipped, 0);
    assert_eq!(res.history.len() as u32, n);

    let arena = m.arena();
    let root = arena.get(ROOT);
    assert_eq!(root.visits, n);
    let child_visits: u32 = root.children.iter().map(|&c| arena.get(c).visits).sum();
    assert_eq!(child_visits, n);
    let total: f64 = res.history.iter().map(|h| h.reward).sum();
    assert!((root.total_reward - total).abs() < 1e-9);
}

#[test]
fn budget_exhaustion_returns_best_root_child_by_mean() {
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    let res = m.search_resolution(40, &mut NullSink);

    let arena = m.arena();
    let best_mean = arena
        .get(ROOT)
        .children
        .iter()
        .map(|&c| arena.get(c).mean_reward())
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(res.interventions.len(), 1);
    assert_eq!(res.best_reward, Some(best_mean));
}

#[test]
fn expansion_order_is_space_order_and_skips_touched_objects() {
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    m.search_resolution(4, &mut NullSink);

    let arena = m.arena();
    let firsts: Vec<Intervention> = arena
        .get(ROOT)
        .children
        .iter()
        .map(|&c| arena.get(c).interventions[0].clone())
        .collect();
    assert_eq!(
        firsts,
        vec![
            Intervention::new("1", "left,0.01"),
            Intervention::new("1", "right,0.01"),
            Intervention::new("2", "forward,0.01"),
            Intervention::new("2", "back,0.01"),
        ]
    );
    assert!(arena.get(ROOT).untried.is_initialized());
    assert!(!arena.get(ROOT).untried.has_any());

    // A child under object 1 may only continue with object 2.
    let legal = m.legal_actions_at(&[Intervention::new("1", "left,0.01")], ROOT);
    assert!(legal.iter().all(|i| i.object == "2"));
    assert_eq!(legal.len(), 2);
}

#[test]
fn root_children_follow_declared_object_order() {
    let mut p = three_block_problem(100.0);
    p.initial.objects.insert("10".to_string(), [0.0, 0.0, 0.12]);
    p.space = space(&[
        ("2", &["forward,0.01"]),
        ("10", &["left,0.01"]),
        ("1", &["left,0.01"]),
    ]);
    let mut m = CausalMcts::new(cfg(0.005), p).unwrap();
    m.search_resolution(3, &mut NullSink);

    let arena = m.arena();
    let objects: Vec<&str> = arena
        .get(ROOT)
        .children
        .iter()
        .map(|&c| arena.get(c).interventions[0].object.as_str())
        .collect();
    assert_eq!(objects, vec!["2", "10", "1"]);
}

#[test]
fn empty_space_skips_every_iteration() {
    let mut p = two_block_problem(100.0);
    p.space = InterventionSpace::new();
    let mut m = CausalMcts::new(cfg(0.05), p).unwrap();
    let mut sink = VecSink::new();
    let res = m.search_resolution(5, &mut sink);

    assert_eq!(res.termination, Termination::BudgetExhausted);
    assert!(res.interventions.is_empty());
    assert_eq!(res.best_reward, None);
    assert!(res.history.is_empty());
    assert_eq!(res.stats.skipped, 5);
    assert_eq!(m.arena().len(), 1);
    assert_eq!(
        sink.events
            .iter()
            .filter(|e| matches!(e, TraceEvent::Skipped { .. }))
            .count(),
        5
    );
}

#[test]
fn dead_end_below_root_is_rolled_out_again() {
    let mut p = two_block_problem(100.0);
    p.space = space(&[("1", &["left,0.01"])]);
    let mut m = CausalMcts::new(cfg(0.05), p).unwrap();
    let res = m.search_resolution(5, &mut NullSink);

    let arena = m.arena();
    assert_eq!(arena.len(), 2);
    let child = arena.get(ROOT).children[0];
    assert_eq!(arena.get(child).visits, 5);
    assert_eq!(arena.get(child).untried, UntriedActions::Populated(Default::default()));
    assert_eq!(arena.get(ROOT).visits, 5);
    assert_eq!(res.stats.skipped, 0);
    assert_eq!(res.stats.expansions, 1);
}

#[test]
fn expand_on_exhausted_node_returns_it() {
    let mut p = two_block_problem(100.0);
    p.space = InterventionSpace::new();
    let mut m = CausalMcts::new(cfg(0.05), p).unwrap();
    assert_eq!(m.expand(ROOT), Expansion::Exhausted(ROOT));
    assert_eq!(m.select(ROOT), ROOT);
}

#[test]
fn violations_propagate_to_parent_and_prune_expansion() {
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    m.search_resolution(1, &mut NullSink);
    let child = m.arena().get(ROOT).children[0];

    let bad = Intervention::new("2", "back,0.01");
    m.mark_violation(child, bad.clone());
    assert!(!m.arena().get(ROOT).local_violations.contains(&bad));

    m.backpropagate(child, 0.0, &mut NullSink);
    assert!(m.arena().get(ROOT).local_violations.contains(&bad));
    assert!(!m.legal_actions_at(&[], ROOT).contains(&bad));

    // A node whose frontier is computed after the violation never offers it.
    match m.expand(child) {
        Expansion::Created(_) => {}
        other => panic!("expected a new child, got {:?}", other),
    }
    let remaining = &m.arena().get(child).untried;
    match remaining {
        UntriedActions::Populated(q) => assert!(!q.contains(&bad)),
        UntriedActions::Uninitialized => panic!("frontier should be populated"),
    }
}

#[test]
fn same_seed_same_search() {
    let run = |seed: u64| {
        let mut c = cfg(0.005);
        c.seed = seed;
        let mut m = CausalMcts::new(c, three_block_problem(100.0)).unwrap();
        m.search_resolution(60, &mut NullSink).history
    };
    assert_eq!(run(7), run(7));
    // Re-running on the same engine reseeds.
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    let a = m.search_resolution(30, &mut NullSink).history;
    let b = m.search_resolution(30, &mut NullSink).history;
    assert_eq!(a, b);
}

#[test]
fn rollout_depth_is_bounded() {
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    let res = m.search_resolution(50, &mut NullSink);
    for h in &res.history {
        assert!(h.interventions.len() <= 3);
        let mut objs: Vec<&str> = h.interventions.iter().map(|i| i.object.as_str()).collect();
        objs.sort();
        objs.dedup();
        assert_eq!(objs.len(), h.interventions.len(), "object reused in {:?}", h);
    }
}

#[test]
fn unsupported_actions_absorbed_as_zero_reward() {
    let mut p = two_block_problem(100.0);
    p.space = space(&[(SWAP_SENTINEL, &["0,1"]), ("1", &["pick-top"])]);
    p.max_rollout_depth = 0;
    let mut m = CausalMcts::new(cfg(0.05), p).unwrap();
    let mut sink = VecSink::new();
    let res = m.search_resolution(2, &mut sink);

    assert_eq!(res.stats.failed_applications, 2);
    let reasons: Vec<&str> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::ApplyFailed { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec!["swap", "pick_place"]);

    // Nothing moved: goal held, 1 aligned. Terminal reward counted for prefix and history.
    for h in &res.history {
        let expected = 2.0 * (1.0 - 0.05) + 0.25;
        assert!((h.reward - expected).abs() < 1e-9, "{:?}", h);
    }
}

#[test]
fn trace_records_each_phase_per_iteration() {
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    let mut sink = VecSink::new();
    m.search_resolution(6, &mut sink);

    assert!(matches!(
        sink.events.first(),
        Some(TraceEvent::SearchStarted { root_actions: 4, .. })
    ));
    assert!(matches!(
        sink.events.last(),
        Some(TraceEvent::Finished {
            termination: Termination::BudgetExhausted,
            iteration: 6,
            ..
        })
    ));
    for phase in [Phase::Select, Phase::Expand, Phase::Rollout, Phase::Backpropagate] {
        assert_eq!(sink.phases(phase).count(), 6, "{:?}", phase);
    }
    for e in sink.phases(Phase::Rollout) {
        assert!(matches!(e, TraceEvent::Phase { reward: Some(_), .. }));
    }
}

#[test]
fn backup_records_every_node_on_the_path() {
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    let mut sink = VecSink::new();
    m.search_resolution(12, &mut sink);

    // Split the stream per iteration at each Rollout phase event.
    let mut expected_depth: Option<usize> = None;
    let mut backups: Vec<(NodeId, usize, u32, f64, f64)> = Vec::new();
    let mut root_visits = 0;
    for e in &sink.events {
        match e {
            TraceEvent::Phase {
                phase: Phase::Rollout,
                depth,
                ..
            } => {
                expected_depth = Some(*depth);
                backups.clear();
            }
            TraceEvent::Backup {
                node,
                depth,
                visits,
                mean_reward,
                reward,
            } => backups.push((*node, *depth, *visits, *mean_reward, *reward)),
            TraceEvent::Phase {
                phase: Phase::Backpropagate,
                reward,
                ..
            } => {
                let leaf_depth = expected_depth.unwrap();
                assert_eq!(backups.len(), leaf_depth + 1);
                // Leaf first, root last, one level up each step.
                for (i, b) in backups.iter().enumerate() {
                    assert_eq!(b.1, leaf_depth - i);
                    assert_eq!(Some(b.4), *reward);
                }
                let root = backups.last().unwrap();
                assert_eq!(root.0, ROOT);
                root_visits += 1;
                assert_eq!(root.2, root_visits);
            }
            _ => {}
        }
    }
    assert_eq!(root_visits, 12);

    let arena = m.arena();
    let last = backups.last().unwrap();
    assert_eq!(last.3, arena.get(ROOT).mean_reward());
}

#[test]
fn verbose_emits_alignment_probes_for_shallow_rollouts() {
    let mut c = cfg(0.05);
    c.verbose = true;
    let mut m = CausalMcts::new(c, two_block_problem(0.9)).unwrap();
    let mut sink = VecSink::new();
    m.search_resolution(1, &mut sink);

    let probes: Vec<&TraceEvent> = sink
        .events
        .iter()
        .filter(|e| matches!(e, TraceEvent::AlignmentProbe { .. }))
        .collect();
    assert_eq!(probes.len(), 1);
    assert!(matches!(
        probes[0],
        TraceEvent::AlignmentProbe { aligned: true, .. }
    ));

    let mut quiet = CausalMcts::new(cfg(0.05), two_block_problem(0.9)).unwrap();
    let mut sink = VecSink::new();
    quiet.search_resolution(1, &mut sink);
    assert!(!sink
        .events
        .iter()
        .any(|e| matches!(e, TraceEvent::AlignmentProbe { .. })));
}

#[test]
fn initial_alignment_uses_diagnostic_copy() {
    let m = CausalMcts::new(cfg(0.01), two_block_problem(0.9)).unwrap();
    let probes = m.initial_alignment();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].object, "1");
    assert!(!probes[0].aligned);
}

#[test]
fn invalid_config_fails_loudly() {
    let mut c = cfg(0.05);
    c.exploration_constant = -1.0;
    assert!(matches!(
        CausalMcts::new(c, two_block_problem(0.9)),
        Err(MctsError::InvalidConfig { .. })
    ));

    let mut c = cfg(0.05);
    c.iterations = 0;
    assert!(CausalMcts::new(c, two_block_problem(0.9)).is_err());

    let mut c = cfg(0.05);
    c.alignment_threshold = f64::NAN;
    assert!(CausalMcts::new(c, two_block_problem(0.9)).is_err());

    let c = cfg(0.05);
    assert!(CausalMcts::new(c, two_block_problem(f64::INFINITY)).is_err());
}

#[test]
fn ancestry_walks_back_to_root() {
    let mut m = CausalMcts::new(cfg(0.005), three_block_problem(100.0)).unwrap();
    m.search_resolution(8, &mut NullSink);
    let arena = m.arena();
    let deep = (0..arena.len() as u32)
        .find(|&id| arena.get(id).depth() == 2)
        .unwrap();
    let path = arena.ancestry(deep);
    assert_eq!(path.len(), 3);
    assert_eq!(path[0], deep);
    assert_eq!(*path.last().unwrap(), ROOT);
    assert!(arena.get(path[1]).children.contains(&deep));
}

#[test]
fn arena_always_holds_root() {
    let arena = Arena::with_root();
    assert_eq!(arena.len(), 1);
    assert!(!arena.is_empty());
    assert!(arena.get(ROOT).parent.is_none());
}
