//! UCT MCTS (single-threaded) over intervention sequences.
//!
//! One iteration is select -> expand -> rollout -> backpropagate. Rollouts replay the
//! node's sequence on a private `SymbolicState` copy, so they never observe each other.

use std::collections::{BTreeSet, VecDeque};

use cip_core::{
    alignment_report, legal_actions, AlignmentProbe, Config, InitialState, Intervention,
    InterventionApplier, InterventionSpace, RewardModel, Scenario, ScenarioError, SymbolicState,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::arena::{Arena, ROOT};
use crate::node::{Node, NodeId, UntriedActions};
use crate::trace::{Phase, Termination, TraceEvent, TraceSink};

#[derive(Clone, Debug)]
pub struct MctsConfig {
    /// Iteration budget used by [`CausalMcts::run`].
    pub iterations: u32,
    /// UCT exploration constant `C`.
    pub exploration_constant: f64,
    /// Seed for the rollout-suffix PRNG; re-applied at the start of every search.
    pub seed: u64,
    pub alignment_threshold: f64,
    /// Applier reward for a successful shift.
    pub shift_reward: f64,
    pub reference_object: String,
    pub tracked_objects: Vec<String>,
    /// Per tracked object aligned with the reference after the prefix replay.
    pub alignment_bonus: f64,
    /// Emit alignment probes for rollouts whose prefix has at most one intervention.
    pub verbose: bool,
}

impl MctsConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            iterations: cfg.search.iterations,
            exploration_constant: cfg.search.exploration_constant,
            seed: cfg.search.seed,
            alignment_threshold: cfg.rollout.alignment_threshold,
            shift_reward: cfg.rollout.shift_reward,
            reference_object: cfg.rollout.reference_object.clone(),
            tracked_objects: cfg.rollout.tracked_objects.clone(),
            alignment_bonus: cfg.rollout.alignment_bonus,
            verbose: cfg.rollout.verbose,
        }
    }
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Error)]
pub enum MctsError {
    #[error("invalid config: {msg}")]
    InvalidConfig { msg: &'static str },
    #[error(transparent)]
    InvalidScenario(#[from] ScenarioError),
}

/// Immutable inputs of one planning problem.
#[derive(Debug, Clone)]
pub struct Problem {
    pub initial: InitialState,
    pub space: InterventionSpace,
    pub reward: RewardModel,
    pub max_rollout_depth: u32,
    pub termination_threshold: f64,
}

impl Problem {
    pub fn from_scenario(initial: InitialState, scenario: &Scenario) -> Result<Self, MctsError> {
        scenario.validate()?;
        Ok(Self {
            initial,
            space: scenario.intv_space.clone(),
            reward: RewardModel::new(
                scenario.goal_set(),
                scenario.reward_shaping.shift_bonus,
                scenario.reward_shaping.depth_penalty,
            ),
            max_rollout_depth: scenario.max_rollout_depth,
            termination_threshold: scenario.termination_threshold,
        })
    }
}

/// One evaluated rollout: the full applied sequence (prefix + random suffix) and its reward.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutRecord {
    pub interventions: Vec<Intervention>,
    pub reward: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SearchStats {
    pub node_count: usize,
    pub expansions: u32,
    pub rollouts: u32,
    pub skipped: u32,
    pub failed_applications: u32,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub interventions: Vec<Intervention>,
    /// Iteration index of the successful rollout, or the budget if exhausted.
    pub iterations: u32,
    pub termination: Termination,
    /// Winning rollout reward on success; best root-child mean otherwise.
    pub best_reward: Option<f64>,
    pub history: Vec<RolloutRecord>,
    pub stats: SearchStats,
}

/// Outcome of [`CausalMcts::expand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    Created(NodeId),
    /// No untried action left; the node itself is returned.
    Exhausted(NodeId),
}

/// UCT score; +inf for an unvisited child (or an unvisited parent).
pub fn uct_score(total_reward: f64, visits: u32, parent_visits: u32, c: f64) -> f64 {
    if visits == 0 || parent_visits == 0 {
        return f64::INFINITY;
    }
    let n = visits as f64;
    total_reward / n + c * ((parent_visits as f64).ln() / n).sqrt()
}

/// Child of `parent` with the highest UCT score; ties go to the earliest child.
pub fn select_child(arena: &Arena, parent: NodeId, c: f64) -> Option<NodeId> {
    let p = arena.get(parent);
    let mut best: Option<NodeId> = None;
    let mut best_score = f64::NEG_INFINITY;
    for &cid in &p.children {
        let ch = arena.get(cid);
        let score = uct_score(ch.total_reward, ch.visits, p.visits, c);
        if best.is_none() || score > best_score {
            best = Some(cid);
            best_score = score;
        }
    }
    best
}

pub struct CausalMcts {
    cfg: MctsConfig,
    problem: Problem,
    arena: Arena,
    rng: ChaCha8Rng,
    history: Vec<RolloutRecord>,
    stats: SearchStats,
    // Long-lived copy of the initial state, for alignment diagnostics only.
    diagnostics: SymbolicState,
}

impl CausalMcts {
    pub fn new(cfg: MctsConfig, problem: Problem) -> Result<Self, MctsError> {
        if !(cfg.exploration_constant.is_finite() && cfg.exploration_constant >= 0.0) {
            return Err(MctsError::InvalidConfig {
                msg: "exploration_constant must be finite and >= 0",
            });
        }
        if cfg.iterations == 0 {
            return Err(MctsError::InvalidConfig {
                msg: "iterations must be > 0",
            });
        }
        if !(cfg.alignment_threshold.is_finite() && cfg.alignment_threshold >= 0.0) {
            return Err(MctsError::InvalidConfig {
                msg: "alignment_threshold must be finite and >= 0",
            });
        }
        if !(cfg.shift_reward.is_finite() && cfg.alignment_bonus.is_finite()) {
            return Err(MctsError::InvalidConfig {
                msg: "shift_reward and alignment_bonus must be finite",
            });
        }
        if cfg.reference_object.is_empty() {
            return Err(MctsError::InvalidConfig {
                msg: "reference_object must be non-empty",
            });
        }
        if !problem.termination_threshold.is_finite() {
            return Err(MctsError::InvalidConfig {
                msg: "termination_threshold must be finite",
            });
        }

        let diagnostics = SymbolicState::new(&problem.initial, cfg.alignment_threshold);
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(cfg.seed),
            cfg,
            problem,
            arena: Arena::with_root(),
            history: Vec::new(),
            stats: SearchStats::default(),
            diagnostics,
        })
    }

    pub fn config(&self) -> &MctsConfig {
        &self.cfg
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// The tree of the most recent search.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Alignment of every tracked object against the reference in the initial state.
    pub fn initial_alignment(&self) -> Vec<AlignmentProbe> {
        alignment_report(
            &self.diagnostics,
            &self.cfg.reference_object,
            &self.cfg.tracked_objects,
        )
    }

    /// Search with the configured iteration budget.
    pub fn run(&mut self, sink: &mut impl TraceSink) -> SearchResult {
        self.search_resolution(self.cfg.iterations, sink)
    }

    /// Run up to `iterations` select/expand/rollout/backpropagate cycles on a fresh tree.
    pub fn search_resolution(&mut self, iterations: u32, sink: &mut impl TraceSink) -> SearchResult {
        self.reset_tree();
        self.ensure_untried(ROOT);

        sink.record(&TraceEvent::SearchStarted {
            root_actions: self.arena.get(ROOT).untried.len(),
            termination_threshold: self.problem.termination_threshold,
        });

        for i in 0..iterations {
            let leaf = self.select(ROOT);
            self.trace_phase(sink, i, Phase::Select, leaf, None);

            let node = match self.expand(leaf) {
                Expansion::Created(id) => {
                    self.trace_phase(sink, i, Phase::Expand, id, None);
                    id
                }
                Expansion::Exhausted(id) if id == ROOT => {
                    self.stats.skipped += 1;
                    sink.record(&TraceEvent::Skipped { iteration: i });
                    continue;
                }
                // Dead end below the root: sample it again.
                Expansion::Exhausted(id) => id,
            };

            let reward = self.rollout(node, sink);
            self.trace_phase(sink, i, Phase::Rollout, node, Some(reward));

            self.backpropagate(node, reward, sink);
            self.trace_phase(sink, i, Phase::Backpropagate, node, Some(reward));

            if reward >= self.problem.termination_threshold {
                sink.record(&TraceEvent::Finished {
                    iteration: i,
                    termination: Termination::Success,
                    best_reward: Some(reward),
                });
                return SearchResult {
                    interventions: self.arena.get(node).interventions.clone(),
                    iterations: i,
                    termination: Termination::Success,
                    best_reward: Some(reward),
                    history: std::mem::take(&mut self.history),
                    stats: self.stats.clone(),
                };
            }
        }

        let best = self.best_root_child();
        let (interventions, best_reward) = match best {
            Some(id) => {
                let n = self.arena.get(id);
                (n.interventions.clone(), Some(n.mean_reward()))
            }
            None => (Vec::new(), None),
        };
        sink.record(&TraceEvent::Finished {
            iteration: iterations,
            termination: Termination::BudgetExhausted,
            best_reward,
        });
        SearchResult {
            interventions,
            iterations,
            termination: Termination::BudgetExhausted,
            best_reward,
            history: std::mem::take(&mut self.history),
            stats: self.stats.clone(),
        }
    }

    /// Descend from `from` until a node with untried actions or a leaf.
    pub fn select(&mut self, from: NodeId) -> NodeId {
        let mut id = from;
        loop {
            let node = self.arena.get(id);
            if node.untried.has_any() || node.children.is_empty() {
                return id;
            }
            let Some(next) = select_child(&self.arena, id, self.cfg.exploration_constant) else {
                return id;
            };
            self.ensure_untried(next);
            id = next;
        }
    }

    /// Attach a child for the first untried action of `id`.
    pub fn expand(&mut self, id: NodeId) -> Expansion {
        self.ensure_untried(id);
        let next = match &mut self.arena.get_mut(id).untried {
            UntriedActions::Populated(q) => q.pop_front(),
            UntriedActions::Uninitialized => None,
        };
        let Some(action) = next else {
            return Expansion::Exhausted(id);
        };

        let mut seq = self.arena.get(id).interventions.clone();
        seq.push(action);
        let child = self.arena.attach(Node::new(seq, Some(id)));
        self.stats.expansions += 1;
        self.stats.node_count = self.arena.len();
        Expansion::Created(child)
    }

    /// Evaluate `id`: replay its sequence on a fresh state, then (unless the prefix alone
    /// reaches the threshold) extend it with uniformly random legal actions.
    pub fn rollout(&mut self, id: NodeId, sink: &mut impl TraceSink) -> f64 {
        let mut applier = InterventionApplier::from_initial(
            &self.problem.initial,
            self.cfg.shift_reward,
            self.cfg.alignment_threshold,
        );
        let node = self.arena.get(id);
        let prefix = node.interventions.clone();
        let violations = node.local_violations.clone();

        let mut prev: BTreeSet<String> = self.problem.initial.relationships.iter().cloned().collect();
        let mut shaped = 0.0;

        for intv in &prefix {
            shaped += self.step(&mut applier, intv, &mut prev, id, sink);
        }

        let current = applier.state().current_relationships();
        shaped += self.problem.reward.final_reward(&current, &prefix);
        shaped += self.alignment_bonus(applier.state(), id, prefix.len(), sink);

        if shaped >= self.problem.termination_threshold {
            self.record_rollout(prefix, shaped);
            return shaped;
        }

        let budget = (self.problem.max_rollout_depth as usize).saturating_sub(prefix.len());
        let mut history = prefix;
        for _ in 0..budget {
            let valid = legal_actions(&self.problem.space, &history, &violations);
            if valid.is_empty() {
                break;
            }
            let pick = valid[self.rng.gen_range(0..valid.len())].clone();
            shaped += self.step(&mut applier, &pick, &mut prev, id, sink);
            history.push(pick);
        }

        let final_rels = applier.state().current_relationships();
        shaped += self.problem.reward.final_reward(&final_rels, &history);
        self.record_rollout(history, shaped);
        shaped
    }

    /// Add `reward` to every node from `id` up to the root, merging local violations
    /// into each parent on the way. Each updated node is recorded as a `Backup` event.
    pub fn backpropagate(&mut self, id: NodeId, reward: f64, sink: &mut impl TraceSink) {
        let mut cur = Some(id);
        while let Some(nid) = cur {
            let node = self.arena.get_mut(nid);
            node.visits += 1;
            node.total_reward += reward;
            sink.record(&TraceEvent::Backup {
                node: nid,
                depth: node.depth(),
                visits: node.visits,
                mean_reward: node.mean_reward(),
                reward,
            });
            let parent = node.parent;
            let violations: Vec<Intervention> = node.local_violations.iter().cloned().collect();
            if let Some(p) = parent {
                self.arena.get_mut(p).local_violations.extend(violations);
            }
            cur = parent;
        }
    }

    /// Legal next interventions after `history`, pruned by `node`'s violations.
    pub fn legal_actions_at(&self, history: &[Intervention], node: NodeId) -> Vec<Intervention> {
        legal_actions(
            &self.problem.space,
            history,
            &self.arena.get(node).local_violations,
        )
    }

    /// Exclude `intervention` from future expansion at `node` (and, after the next
    /// backup through it, at its ancestors).
    pub fn mark_violation(&mut self, node: NodeId, intervention: Intervention) {
        self.arena.get_mut(node).local_violations.insert(intervention);
    }

    fn reset_tree(&mut self) {
        self.arena = Arena::with_root();
        self.history.clear();
        self.stats = SearchStats {
            node_count: self.arena.len(),
            ..SearchStats::default()
        };
        self.rng = ChaCha8Rng::seed_from_u64(self.cfg.seed);
    }

    fn ensure_untried(&mut self, id: NodeId) {
        if self.arena.get(id).untried.is_initialized() {
            return;
        }
        let node = self.arena.get(id);
        let actions = self.legal_actions_at(&node.interventions, id);
        self.arena.get_mut(id).untried = UntriedActions::Populated(VecDeque::from(actions));
    }

    fn step(
        &mut self,
        applier: &mut InterventionApplier,
        intv: &Intervention,
        prev: &mut BTreeSet<String>,
        node: NodeId,
        sink: &mut impl TraceSink,
    ) -> f64 {
        let delta = match applier.apply(&intv.object, &intv.action) {
            Ok(d) => d,
            Err(e) => {
                self.stats.failed_applications += 1;
                sink.record(&TraceEvent::ApplyFailed {
                    node,
                    object: intv.object.clone(),
                    action: intv.action.clone(),
                    reason: e.tag(),
                });
                0.0
            }
        };
        let curr = applier.state().current_relationships();
        let r = self.problem.reward.step_reward(prev, &curr, &intv.action);
        *prev = curr;
        r + delta
    }

    fn alignment_bonus(
        &self,
        state: &SymbolicState,
        node: NodeId,
        depth: usize,
        sink: &mut impl TraceSink,
    ) -> f64 {
        let probes = alignment_report(state, &self.cfg.reference_object, &self.cfg.tracked_objects);
        if self.cfg.verbose && depth <= 1 {
            for p in &probes {
                sink.record(&TraceEvent::AlignmentProbe {
                    node,
                    object: p.object.clone(),
                    dx: p.dx,
                    dy: p.dy,
                    aligned: p.aligned,
                });
            }
        }
        probes.iter().filter(|p| p.aligned).count() as f64 * self.cfg.alignment_bonus
    }

    fn record_rollout(&mut self, interventions: Vec<Intervention>, reward: f64) {
        self.stats.rollouts += 1;
        self.history.push(RolloutRecord {
            interventions,
            reward,
        });
    }

    fn best_root_child(&self) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for &cid in &self.arena.get(ROOT).children {
            let avg = self.arena.get(cid).mean_reward();
            match best {
                Some((_, b)) if avg <= b => {}
                _ => best = Some((cid, avg)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn trace_phase(
        &self,
        sink: &mut impl TraceSink,
        iteration: u32,
        phase: Phase,
        node: NodeId,
        reward: Option<f64>,
    ) {
        sink.record(&TraceEvent::Phase {
            iteration,
            phase,
            node,
            depth: self.arena.get(node).depth(),
            reward,
        });
    }
}

