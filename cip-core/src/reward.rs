//! Reward model: step rewards and the terminal score of an intervention sequence.

use std::collections::BTreeSet;

use crate::action::{mentions_direction, Intervention};

#[derive(Debug, Clone, PartialEq)]
pub struct RewardModel {
    goal: BTreeSet<String>,
    shift_bonus: f64,
    depth_penalty: f64,
}

impl RewardModel {
    pub fn new(goal: BTreeSet<String>, shift_bonus: f64, depth_penalty: f64) -> Self {
        Self {
            goal,
            shift_bonus,
            depth_penalty,
        }
    }

    pub fn goal(&self) -> &BTreeSet<String> {
        &self.goal
    }

    pub fn shift_bonus(&self) -> f64 {
        self.shift_bonus
    }

    pub fn depth_penalty(&self) -> f64 {
        self.depth_penalty
    }

    /// Immediate reward after one intervention.
    ///
    /// Only the action kind is scored today; the relationship sets are part of the
    /// signature so relationship-change terms can be added without touching callers.
    pub fn step_reward(
        &self,
        _prev: &BTreeSet<String>,
        _curr: &BTreeSet<String>,
        action: &str,
    ) -> f64 {
        if mentions_direction(action) {
            self.shift_bonus
        } else {
            0.0
        }
    }

    /// Fraction of goal predicates present in `relationships` (1.0 for an empty goal).
    pub fn achieved_fraction(&self, relationships: &BTreeSet<String>) -> f64 {
        if self.goal.is_empty() {
            return 1.0;
        }
        relationships.intersection(&self.goal).count() as f64 / self.goal.len() as f64
    }

    /// `achieved_fraction - depth_penalty * len(interventions)`. Unclamped.
    pub fn final_reward(
        &self,
        relationships: &BTreeSet<String>,
        interventions: &[Intervention],
    ) -> f64 {
        self.achieved_fraction(relationships) - self.depth_penalty * interventions.len() as f64
    }
}
