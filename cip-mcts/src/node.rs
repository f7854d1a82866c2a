//! Search tree nodes.

use std::collections::VecDeque;

use cip_core::Intervention;
use rustc_hash::FxHashSet;

pub type NodeId = u32;

/// Lazily computed expansion frontier of a node.
///
/// `Populated(empty)` is a real dead end, distinct from "not computed yet".
#[derive(Debug, Clone, PartialEq)]
pub enum UntriedActions {
    Uninitialized,
    Populated(VecDeque<Intervention>),
}

impl UntriedActions {
    pub fn is_initialized(&self) -> bool {
        matches!(self, UntriedActions::Populated(_))
    }

    /// True only if populated with at least one action.
    pub fn has_any(&self) -> bool {
        matches!(self, UntriedActions::Populated(q) if !q.is_empty())
    }

    pub fn len(&self) -> usize {
        match self {
            UntriedActions::Uninitialized => 0,
            UntriedActions::Populated(q) => q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    /// Full intervention sequence from the root.
    pub interventions: Vec<Intervention>,
    /// Non-owning back-reference; `None` for the root.
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub visits: u32,
    pub total_reward: f64,
    pub untried: UntriedActions,
    /// Interventions pruned from expansion here; merged into the parent on backup.
    pub local_violations: FxHashSet<Intervention>,
}

impl Node {
    pub fn root() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn new(interventions: Vec<Intervention>, parent: Option<NodeId>) -> Self {
        Self {
            interventions,
            parent,
            children: Vec::new(),
            visits: 0,
            total_reward: 0.0,
            untried: UntriedActions::Uninitialized,
            local_violations: FxHashSet::default(),
        }
    }

    pub fn depth(&self) -> usize {
        self.interventions.len()
    }

    /// Mean reward; 0 for an unvisited node.
    pub fn mean_reward(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.total_reward / (self.visits as f64)
        }
    }
}
