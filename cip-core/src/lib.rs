//! cip-core: symbolic world state, interventions, reward model, and scenario configuration.

pub mod action;
pub mod applier;
pub mod config;
pub mod legal;
pub mod reward;
pub mod state;

pub use action::{
    classify, mentions_direction, parse_shift, ActionKind, Direction, Intervention,
    UnsupportedKind, DIRECTIONS, SWAP_SENTINEL,
};
pub use applier::{ApplyError, InterventionApplier};
pub use config::{
    Config, ConfigError, InitialState, InterventionSpace, RewardShaping, RolloutConfig, Scenario,
    ScenarioError, SearchConfig,
};
pub use legal::legal_actions;
pub use reward::RewardModel;
pub use state::{
    alignment_report, parse_on, AlignmentProbe, Position, StateSnapshot, SymbolicState,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!VERSION.is_empty());
    }
}
