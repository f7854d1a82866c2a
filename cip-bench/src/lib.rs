//! Shared fixtures for the planner benchmarks.

use cip_core::{InitialState, Intervention, InterventionSpace, RewardModel};
use cip_mcts::{Arena, Node, NodeId, Problem, ROOT};

/// Five-block stack (0 at the bottom) with blocks 1-4 pushed off-centre by 10-25mm.
pub fn stack_initial() -> InitialState {
    let objects = [
        ("0", [0.5, 0.0, 0.02]),
        ("1", [0.515, 0.0, 0.06]),
        ("2", [0.5, -0.02, 0.10]),
        ("3", [0.475, 0.0, 0.14]),
        ("4", [0.5, 0.01, 0.18]),
    ];
    InitialState {
        objects: objects
            .iter()
            .map(|(k, p)| (k.to_string(), *p))
            .collect(),
        relationships: ["On(1,0)", "On(2,1)", "On(3,2)", "On(4,3)", "On(0,Table)", "Clear(4)"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

/// Four directional shifts per block, magnitudes matching each block's offset.
pub fn stack_space() -> InterventionSpace {
    [("1", "0.015"), ("2", "0.02"), ("3", "0.025"), ("4", "0.01")]
        .iter()
        .map(|(obj, mag)| {
            let actions = ["left", "right", "forward", "back"]
                .iter()
                .map(|d| format!("{d},{mag}"))
                .collect();
            (obj.to_string(), actions)
        })
        .collect()
}

pub fn stack_problem(max_rollout_depth: u32, termination_threshold: f64) -> Problem {
    let goal = ["On(1,0)", "On(2,1)", "On(3,2)", "On(4,3)"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Problem {
        initial: stack_initial(),
        space: stack_space(),
        reward: RewardModel::new(goal, 0.0, 0.05),
        max_rollout_depth,
        termination_threshold,
    }
}

/// Root with `n` visited children and a spread of visit counts/rewards.
pub fn wide_arena(n: usize) -> Arena {
    let mut arena = Arena::with_root();
    let mut total_visits = 0u32;
    for i in 0..n {
        let id: NodeId = arena.attach(Node::new(
            vec![Intervention::new(i.to_string(), "left,0.01")],
            Some(ROOT),
        ));
        let node = arena.get_mut(id);
        node.visits = (i as u32 % 17) + 1;
        node.total_reward = (i as f64).sin() * node.visits as f64;
        total_visits += node.visits;
    }
    arena.get_mut(ROOT).visits = total_visits;
    arena
}
