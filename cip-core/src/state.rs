//! Symbolic world state: object positions plus the declared relationship predicates.
//!
//! The declared predicate set is fixed at construction. What "currently holds" is derived
//! on every query from object positions, so the only mutation path is `apply_shift`.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::action::Direction;
use crate::config::InitialState;

/// World-frame (x, y, z) position in metres.
pub type Position = [f64; 3];

/// Split `On(U,L)` into `(U, L)`. Anything else (other predicate names, wrong arity,
/// missing parenthesis) yields `None`.
pub fn parse_on(predicate: &str) -> Option<(&str, &str)> {
    let inner = predicate.strip_prefix("On(")?.strip_suffix(')')?;
    let mut parts = inner.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(upper), Some(lower), None) => Some((upper.trim(), lower.trim())),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub objects: BTreeMap<String, Position>,
    pub relationships: BTreeSet<String>,
    pub intervened_objects: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct SymbolicState {
    objects: FxHashMap<String, Position>,
    initial_objects: FxHashMap<String, Position>,
    relationships: BTreeSet<String>,
    alignment_threshold: f64,
    intervened: BTreeSet<String>,
}

impl SymbolicState {
    pub fn new(initial: &InitialState, alignment_threshold: f64) -> Self {
        let objects: FxHashMap<String, Position> = initial
            .objects
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Self {
            initial_objects: objects.clone(),
            objects,
            relationships: initial.relationships.iter().cloned().collect(),
            alignment_threshold,
            intervened: BTreeSet::new(),
        }
    }

    pub fn alignment_threshold(&self) -> f64 {
        self.alignment_threshold
    }

    /// Move `object` by `magnitude` metres along `direction`.
    ///
    /// Returns false (and mutates nothing) if the object is not tracked.
    pub fn apply_shift(&mut self, object: &str, direction: Direction, magnitude: f64) -> bool {
        let Some(pos) = self.objects.get_mut(object) else {
            return false;
        };
        let [dx, dy, dz] = direction.offset(magnitude);
        pos[0] += dx;
        pos[1] += dy;
        pos[2] += dz;
        self.intervened.insert(object.to_string());
        true
    }

    /// Token-level variant of [`apply_shift`](Self::apply_shift) for callers holding raw
    /// direction strings. Unknown tokens fail without mutation.
    pub fn apply_shift_token(&mut self, object: &str, direction: &str, magnitude: f64) -> bool {
        match Direction::parse(direction) {
            Some(d) => self.apply_shift(object, d, magnitude),
            None => false,
        }
    }

    /// The subset of declared predicates that currently hold.
    ///
    /// `On(U,L)` holds iff U and L are (x, y)-aligned. Every other predicate, and any
    /// `On` naming an untracked object, is kept unconditionally.
    pub fn current_relationships(&self) -> BTreeSet<String> {
        self.relationships
            .iter()
            .filter(|rel| self.relationship_holds(rel))
            .cloned()
            .collect()
    }

    fn relationship_holds(&self, predicate: &str) -> bool {
        let Some((upper, lower)) = parse_on(predicate) else {
            return true;
        };
        if !self.objects.contains_key(upper) || !self.objects.contains_key(lower) {
            return true;
        }
        self.is_aligned(upper, lower)
    }

    /// The fixed predicate set this state was built with.
    pub fn declared_relationships(&self) -> &BTreeSet<String> {
        &self.relationships
    }

    /// Declared `On(U,L)` predicates between numbered blocks (the stack relations).
    pub fn critical_relationships(&self) -> BTreeSet<String> {
        let numbered = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        self.relationships
            .iter()
            .filter(|rel| matches!(parse_on(rel), Some((u, l)) if numbered(u) && numbered(l)))
            .cloned()
            .collect()
    }

    /// Fraction of `goal` currently holding; 1.0 for an empty goal.
    pub fn alignment_score(&self, goal: &BTreeSet<String>) -> f64 {
        if goal.is_empty() {
            return 1.0;
        }
        let held = self.current_relationships();
        held.intersection(goal).count() as f64 / goal.len() as f64
    }

    /// (x, y) alignment within the threshold. False if either object is untracked.
    pub fn is_aligned(&self, a: &str, b: &str) -> bool {
        match (self.objects.get(a), self.objects.get(b)) {
            (Some(pa), Some(pb)) => {
                (pa[0] - pb[0]).abs() < self.alignment_threshold
                    && (pa[1] - pb[1]).abs() < self.alignment_threshold
            }
            _ => false,
        }
    }

    pub fn is_misaligned(&self, a: &str, b: &str) -> bool {
        !self.is_aligned(a, b)
    }

    pub fn position(&self, object: &str) -> Option<Position> {
        self.objects.get(object).copied()
    }

    /// Euclidean distance from the position recorded at construction (0 if unknown).
    pub fn displacement(&self, object: &str) -> f64 {
        match (self.objects.get(object), self.initial_objects.get(object)) {
            (Some(cur), Some(init)) => {
                let dx = cur[0] - init[0];
                let dy = cur[1] - init[1];
                let dz = cur[2] - init[2];
                (dx * dx + dy * dy + dz * dz).sqrt()
            }
            _ => 0.0,
        }
    }

    pub fn intervened_objects(&self) -> &BTreeSet<String> {
        &self.intervened
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            objects: self
                .objects
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            relationships: self.current_relationships(),
            intervened_objects: self.intervened.clone(),
        }
    }

    /// Restore initial positions and forget which objects were touched.
    pub fn reset(&mut self) {
        self.objects = self.initial_objects.clone();
        self.intervened.clear();
    }
}

/// Per-object alignment against a reference object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentProbe {
    pub object: String,
    pub dx: f64,
    pub dy: f64,
    pub aligned: bool,
}

/// Probe each tracked object against `reference`. Objects missing from the state (or a
/// missing reference) produce no probe.
pub fn alignment_report(
    state: &SymbolicState,
    reference: &str,
    tracked: &[String],
) -> Vec<AlignmentProbe> {
    let Some(ref_pos) = state.position(reference) else {
        return Vec::new();
    };
    tracked
        .iter()
        .filter_map(|obj| {
            let pos = state.position(obj)?;
            Some(AlignmentProbe {
                object: obj.clone(),
                dx: (pos[0] - ref_pos[0]).abs(),
                dy: (pos[1] - ref_pos[1]).abs(),
                aligned: state.is_aligned(obj, reference),
            })
        })
        .collect()
}
