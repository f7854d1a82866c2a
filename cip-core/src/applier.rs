//! Intervention applier: the single place that mutates `SymbolicState` via actions.
//!
//! Failures are ordinary values. The search absorbs every `ApplyError` into a zero reward
//! delta; the variants only exist so callers can tell the failure classes apart.

use thiserror::Error;

use crate::action::{classify, ActionKind, UnsupportedKind};
use crate::config::InitialState;
use crate::state::SymbolicState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    #[error("malformed action descriptor {action:?}")]
    Malformed { action: String },
    #[error("unknown object {object:?}")]
    UnknownObject { object: String },
    #[error("{} interventions are not implemented", .kind.as_str())]
    NotImplemented { kind: UnsupportedKind },
    #[error("unrecognized action kind {action:?}")]
    Unrecognized { action: String },
}

impl ApplyError {
    /// Declared-but-unimplemented action kind (swap, pick/place).
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ApplyError::NotImplemented { .. })
    }

    /// Short machine-readable tag for trace records.
    pub fn tag(&self) -> &'static str {
        match self {
            ApplyError::Malformed { .. } => "malformed",
            ApplyError::UnknownObject { .. } => "unknown_object",
            ApplyError::NotImplemented { kind } => kind.as_str(),
            ApplyError::Unrecognized { .. } => "unrecognized",
        }
    }
}

pub struct InterventionApplier {
    state: SymbolicState,
    shift_reward: f64,
}

impl InterventionApplier {
    pub fn new(state: SymbolicState, shift_reward: f64) -> Self {
        Self {
            state,
            shift_reward,
        }
    }

    /// Build an applier over a fresh state copied from `initial`.
    pub fn from_initial(initial: &InitialState, shift_reward: f64, alignment_threshold: f64) -> Self {
        Self::new(SymbolicState::new(initial, alignment_threshold), shift_reward)
    }

    pub fn state(&self) -> &SymbolicState {
        &self.state
    }

    pub fn into_state(self) -> SymbolicState {
        self.state
    }

    /// Apply `action` to `object`, returning the immediate reward delta on success.
    pub fn apply(&mut self, object: &str, action: &str) -> Result<f64, ApplyError> {
        match classify(object, action) {
            ActionKind::Shift {
                direction,
                magnitude,
            } => {
                if self.state.apply_shift(object, direction, magnitude) {
                    Ok(self.shift_reward)
                } else {
                    Err(ApplyError::UnknownObject {
                        object: object.to_string(),
                    })
                }
            }
            ActionKind::MalformedShift => Err(ApplyError::Malformed {
                action: action.to_string(),
            }),
            // TODO: multi-object swap once scenarios with reordering are modelled.
            ActionKind::Swap { .. } => Err(ApplyError::NotImplemented {
                kind: UnsupportedKind::Swap,
            }),
            ActionKind::PickPlace { .. } => Err(ApplyError::NotImplemented {
                kind: UnsupportedKind::PickPlace,
            }),
            ActionKind::Unknown => Err(ApplyError::Unrecognized {
                action: action.to_string(),
            }),
        }
    }
}
