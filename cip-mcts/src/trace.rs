//! Structured search trace.
//!
//! The engine never prints. Every observable step is handed to a `TraceSink` as a
//! `TraceEvent`; tests collect them with `VecSink`, runs persist them with `NdjsonSink`.

use cip_logging::{NdjsonError, NdjsonWriter, SearchTraceEventV1};

use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Select,
    Expand,
    Rollout,
    Backpropagate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Select => "select",
            Phase::Expand => "expand",
            Phase::Rollout => "rollout",
            Phase::Backpropagate => "backpropagate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A rollout reached the termination threshold.
    Success,
    /// The iteration budget ran out first.
    BudgetExhausted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Success => "success",
            Termination::BudgetExhausted => "budget_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    SearchStarted {
        root_actions: usize,
        termination_threshold: f64,
    },
    Phase {
        iteration: u32,
        phase: Phase,
        node: NodeId,
        depth: usize,
        reward: Option<f64>,
    },
    /// One node updated during backpropagation, leaf first, root last.
    Backup {
        node: NodeId,
        depth: usize,
        visits: u32,
        mean_reward: f64,
        reward: f64,
    },
    /// Expansion produced nothing at the root; no rollout this iteration.
    Skipped { iteration: u32 },
    ApplyFailed {
        node: NodeId,
        object: String,
        action: String,
        reason: &'static str,
    },
    AlignmentProbe {
        node: NodeId,
        object: String,
        dx: f64,
        dy: f64,
        aligned: bool,
    },
    Finished {
        iteration: u32,
        termination: Termination,
        best_reward: Option<f64>,
    },
}

pub trait TraceSink {
    fn record(&mut self, event: &TraceEvent);
}

/// Discards everything.
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&mut self, _event: &TraceEvent) {}
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct VecSink {
    pub events: Vec<TraceEvent>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self, phase: Phase) -> impl Iterator<Item = &TraceEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| matches!(e, TraceEvent::Phase { phase: p, .. } if *p == phase))
    }
}

impl TraceSink for VecSink {
    fn record(&mut self, event: &TraceEvent) {
        self.events.push(event.clone());
    }
}

/// Writes events as `SearchTraceEventV1` NDJSON lines.
///
/// Recording cannot fail the search; the first write error is kept in `error` and
/// later events are dropped.
pub struct NdjsonSink {
    writer: NdjsonWriter,
    config_hash: Option<String>,
    pub error: Option<NdjsonError>,
}

impl NdjsonSink {
    pub fn new(writer: NdjsonWriter) -> Self {
        Self {
            writer,
            config_hash: None,
            error: None,
        }
    }

    /// Stamp `search_started` records with the hash of the config the run used.
    pub fn with_config_hash(mut self, hash: String) -> Self {
        self.config_hash = Some(hash);
        self
    }

    pub fn flush(&mut self) -> Result<(), NdjsonError> {
        self.writer.flush()
    }

    fn to_record(&self, event: &TraceEvent) -> SearchTraceEventV1 {
        match event {
            TraceEvent::SearchStarted {
                root_actions,
                termination_threshold,
            } => {
                let mut r = SearchTraceEventV1::new("search_started");
                r.root_actions = Some(*root_actions as u32);
                r.termination_threshold = Some(*termination_threshold);
                r.config_hash = self.config_hash.clone();
                r
            }
            TraceEvent::Phase {
                iteration,
                phase,
                node,
                depth,
                reward,
            } => {
                let mut r = SearchTraceEventV1::new("phase");
                r.iteration = Some(*iteration);
                r.phase = Some(phase.as_str().to_string());
                r.node_id = Some(*node);
                r.depth = Some(*depth as u32);
                r.reward = *reward;
                r
            }
            TraceEvent::Backup {
                node,
                depth,
                visits,
                mean_reward,
                reward,
            } => {
                let mut r = SearchTraceEventV1::new("backup");
                r.node_id = Some(*node);
                r.depth = Some(*depth as u32);
                r.visits = Some(*visits);
                r.mean_reward = Some(*mean_reward);
                r.reward = Some(*reward);
                r
            }
            TraceEvent::Skipped { iteration } => {
                let mut r = SearchTraceEventV1::new("skipped");
                r.iteration = Some(*iteration);
                r
            }
            TraceEvent::ApplyFailed {
                node,
                object,
                action,
                reason,
            } => {
                let mut r = SearchTraceEventV1::new("apply_failed");
                r.node_id = Some(*node);
                r.object = Some(object.clone());
                r.action = Some(action.clone());
                r.reason = Some(reason.to_string());
                r
            }
            TraceEvent::AlignmentProbe {
                node,
                object,
                dx,
                dy,
                aligned,
            } => {
                let mut r = SearchTraceEventV1::new("alignment_probe");
                r.node_id = Some(*node);
                r.object = Some(object.clone());
                r.dx = Some(*dx);
                r.dy = Some(*dy);
                r.aligned = Some(*aligned);
                r
            }
            TraceEvent::Finished {
                iteration,
                termination,
                best_reward,
            } => {
                let mut r = SearchTraceEventV1::new("finished");
                r.iteration = Some(*iteration);
                r.termination = Some(termination.as_str().to_string());
                r.reward = *best_reward;
                r
            }
        }
    }
}

impl TraceSink for NdjsonSink {
    fn record(&mut self, event: &TraceEvent) {
        if self.error.is_some() {
            return;
        }
        let rec = self.to_record(event);
        if let Err(e) = self.writer.write_event(&rec) {
            self.error = Some(e);
        }
    }
}
