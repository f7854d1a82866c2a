//! Configuration and scenario records.
//!
//! - `Config` is the planner's own YAML settings file (search + rollout knobs).
//! - `InitialState` / `Scenario` are the JSON records produced by the perception and
//!   scenario tooling; the planner only parses and validates them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::Position;

/// Object id -> allowed action descriptors. Declaration order is kept; it is also the
/// expansion order.
pub type InterventionSpace = IndexMap<String, Vec<String>>;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Scenario / initial-state record errors.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid scenario: {msg}")]
    Invalid { msg: &'static str },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Search loop settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Rollout evaluation settings.
    #[serde(default)]
    pub rollout: RolloutConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Iteration budget for one search.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// UCT exploration constant `C`.
    #[serde(default)]
    pub exploration_constant: f64,
    /// Seed for the rollout-suffix PRNG.
    #[serde(default)]
    pub seed: u64,
}

fn default_iterations() -> u32 {
    30_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            exploration_constant: 0.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RolloutConfig {
    /// Alignment threshold (metres) for the per-rollout state copies.
    ///
    /// Misalignments of interest are 10-25mm; the perception default of 5cm would hide them.
    #[serde(default = "default_alignment_threshold")]
    pub alignment_threshold: f64,
    /// Action-level reward returned by the applier for a successful shift.
    #[serde(default)]
    pub shift_reward: f64,
    /// Object every tracked object should end up aligned with.
    #[serde(default = "default_reference_object")]
    pub reference_object: String,
    /// Objects checked for the alignment bonus.
    #[serde(default = "default_tracked_objects")]
    pub tracked_objects: Vec<String>,
    /// Bonus per tracked object aligned with the reference.
    #[serde(default = "default_alignment_bonus")]
    pub alignment_bonus: f64,
    /// Emit per-object alignment probes for shallow rollouts.
    #[serde(default)]
    pub verbose: bool,
}

fn default_alignment_threshold() -> f64 {
    0.005
}

fn default_reference_object() -> String {
    "0".to_string()
}

fn default_tracked_objects() -> Vec<String> {
    ["1", "2", "3", "4"].iter().map(|s| s.to_string()).collect()
}

fn default_alignment_bonus() -> f64 {
    0.25
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            alignment_threshold: default_alignment_threshold(),
            shift_reward: 0.0,
            reference_object: default_reference_object(),
            tracked_objects: default_tracked_objects(),
            alignment_bonus: default_alignment_bonus(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

/// Perceived arrangement: object positions plus the declared predicates.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InitialState {
    #[serde(default)]
    pub objects: BTreeMap<String, Position>,
    #[serde(default)]
    pub relationships: Vec<String>,
}

impl InitialState {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RewardShaping {
    pub shift_bonus: f64,
    pub depth_penalty: f64,
}

/// Goal and search envelope for one planning problem.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Scenario {
    pub symbolic_goal: Vec<String>,
    pub intv_space: InterventionSpace,
    pub max_rollout_depth: u32,
    pub termination_threshold: f64,
    pub reward_shaping: RewardShaping,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn goal_set(&self) -> BTreeSet<String> {
        self.symbolic_goal.iter().cloned().collect()
    }

    /// Structural checks. These are programming/config errors, not search outcomes.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if !self.termination_threshold.is_finite() {
            return Err(ScenarioError::Invalid {
                msg: "termination_threshold must be finite",
            });
        }
        if !self.reward_shaping.shift_bonus.is_finite() {
            return Err(ScenarioError::Invalid {
                msg: "reward_shaping.shift_bonus must be finite",
            });
        }
        if !(self.reward_shaping.depth_penalty.is_finite()
            && self.reward_shaping.depth_penalty >= 0.0)
        {
            return Err(ScenarioError::Invalid {
                msg: "reward_shaping.depth_penalty must be finite and >= 0",
            });
        }
        if self.intv_space.keys().any(|k| k.is_empty()) {
            return Err(ScenarioError::Invalid {
                msg: "intv_space object ids must be non-empty",
            });
        }
        Ok(())
    }
}
