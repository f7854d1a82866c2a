//! Interventions and action-descriptor classification.
//!
//! An action descriptor is the textual half of an intervention, e.g. `"left,0.005"`.
//! Before anything touches a `SymbolicState` the descriptor is classified into an
//! [`ActionKind`]. Precedence is fixed:
//!
//! 1. shift-shaped (`<direction>,<number>`), parsed strictly
//! 2. swap (sentinel object + `,`-separated operands)
//! 3. pick/place
//! 4. unknown
//!
//! A shift-shaped descriptor that fails to parse stays a shift (`MalformedShift`);
//! it is never reinterpreted as one of the later kinds.

use serde::{Deserialize, Serialize};

/// Reserved object id for multi-object swap interventions.
///
/// Unlike ordinary objects, the sentinel may appear more than once in a sequence.
pub const SWAP_SENTINEL: &str = "Swap";

/// All shift direction tokens, in canonical order.
pub const DIRECTIONS: [Direction; 4] = [
    Direction::Left,
    Direction::Right,
    Direction::Forward,
    Direction::Back,
];

/// World-frame shift direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// -x
    Left,
    /// +x
    Right,
    /// +y
    Forward,
    /// -y
    Back,
}

impl Direction {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "forward" => Some(Direction::Forward),
            "back" => Some(Direction::Back),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Forward => "forward",
            Direction::Back => "back",
        }
    }

    /// Signed (dx, dy, dz) offset for a shift of `magnitude` metres. z is never touched.
    pub fn offset(&self, magnitude: f64) -> [f64; 3] {
        match self {
            Direction::Left => [-magnitude, 0.0, 0.0],
            Direction::Right => [magnitude, 0.0, 0.0],
            Direction::Forward => [0.0, magnitude, 0.0],
            Direction::Back => [0.0, -magnitude, 0.0],
        }
    }
}

/// True if `descriptor` textually mentions any shift direction token.
pub fn mentions_direction(descriptor: &str) -> bool {
    DIRECTIONS.iter().any(|d| descriptor.contains(d.as_str()))
}

/// One atomic intervention: an action descriptor applied to one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Intervention {
    pub object: String,
    pub action: String,
}

impl Intervention {
    pub fn new(object: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            action: action.into(),
        }
    }
}

/// Unsupported (declared but not implemented) action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedKind {
    Swap,
    PickPlace,
}

impl UnsupportedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnsupportedKind::Swap => "swap",
            UnsupportedKind::PickPlace => "pick_place",
        }
    }
}

/// Classified action descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Shift { direction: Direction, magnitude: f64 },
    /// Looked like a shift but did not parse.
    MalformedShift,
    Swap { operands: Vec<String> },
    PickPlace { verb: String },
    Unknown,
}

/// Strict shift parser: exactly two comma-separated fields, a known direction token and
/// a finite, non-negative magnitude.
pub fn parse_shift(descriptor: &str) -> Option<(Direction, f64)> {
    let mut parts = descriptor.split(',');
    let (Some(dir), Some(mag), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    let direction = Direction::parse(dir.trim())?;
    let magnitude: f64 = mag.trim().parse().ok()?;
    if !magnitude.is_finite() || magnitude < 0.0 {
        return None;
    }
    Some((direction, magnitude))
}

/// Classify `(object, descriptor)` into an [`ActionKind`], preserving dispatch precedence.
pub fn classify(object: &str, descriptor: &str) -> ActionKind {
    if descriptor.contains(',') && mentions_direction(descriptor) {
        return match parse_shift(descriptor) {
            Some((direction, magnitude)) => ActionKind::Shift {
                direction,
                magnitude,
            },
            None => ActionKind::MalformedShift,
        };
    }

    if object == SWAP_SENTINEL && descriptor.contains(',') {
        let operands = descriptor
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
        return ActionKind::Swap { operands };
    }

    if descriptor.contains("pick") || descriptor.contains("place") {
        return ActionKind::PickPlace {
            verb: descriptor.trim().to_string(),
        };
    }

    ActionKind::Unknown
}
