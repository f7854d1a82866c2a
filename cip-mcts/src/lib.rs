//! UCT Monte Carlo Tree Search for causal intervention planning.
//!
//! The design uses:
//! - Arena-backed node storage with id-based parent links
//! - Deterministic expansion order (intervention space order), random rollout suffixes
//!   from a seeded ChaCha PRNG
//! - A fresh `SymbolicState` per rollout
//! - Structured trace events instead of printing

pub mod arena;
pub mod mcts;
pub mod node;
pub mod trace;

pub use arena::{Arena, ROOT};
pub use mcts::{
    select_child, uct_score, CausalMcts, Expansion, MctsConfig, MctsError, Problem,
    RolloutRecord, SearchResult, SearchStats,
};
pub use node::{Node, NodeId, UntriedActions};
pub use trace::{NdjsonSink, NullSink, Phase, Termination, TraceEvent, TraceSink, VecSink};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod mcts_tests;
