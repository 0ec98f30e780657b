//! Core types for the Pacekeeper engine
//!
//! This module defines the value types produced by the synthesizers (trajectories,
//! typing plans, scroll plans, attention plans) and the geometry they operate on.
//! Plans are produced once per request, owned by the caller and discarded after
//! playback.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serialize `std::time::Duration` as milliseconds, fractional below 1 ms
pub mod duration_ms {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    const NANOS_PER_MILLI: f64 = 1_000_000.0;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_nanos() as f64 / NANOS_PER_MILLI)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(D::Error::custom(format!(
                "duration must be a non-negative number of milliseconds, got {millis}"
            )));
        }
        Ok(Duration::from_nanos((millis * NANOS_PER_MILLI).round() as u64))
    }
}

/// A 2-D screen coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Visible area of the page, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

/// On-screen box of an element located by the caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

// ============================================================================
// Pointer trajectories
// ============================================================================

/// Role of a point within a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Sample on the Bézier path
    Path,
    /// Micro-correction offset inserted after a path sample
    Jitter,
    /// Point past the target
    Overshoot,
    /// Final corrective move onto the exact target
    Correction,
}

/// One playback point and how long to hold before the next one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub point: Point,
    #[serde(with = "duration_ms")]
    pub hold: Duration,
    pub kind: StepKind,
}

/// Timed sequence of pointer positions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub steps: Vec<TrajectoryStep>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first_point(&self) -> Option<Point> {
        self.steps.first().map(|s| s.point)
    }

    pub fn last_point(&self) -> Option<Point> {
        self.steps.last().map(|s| s.point)
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.steps.iter().map(|s| s.point)
    }

    /// Number of samples on the curve itself (excludes jitter and overshoot)
    pub fn path_samples(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Path)
            .count()
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.hold).sum()
    }
}

// ============================================================================
// Keystrokes
// ============================================================================

/// What a single keystroke does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "char")]
pub enum KeyAction {
    /// Insert a character
    Emit(char),
    /// Remove the previous character
    DeleteBackward,
}

/// One keystroke followed by a delay before the next action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keystroke {
    pub action: KeyAction,
    #[serde(with = "duration_ms")]
    pub delay: Duration,
    /// Part of an injected typo or its correction
    #[serde(default)]
    pub correction: bool,
}

/// Ordered keystroke schedule for a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPlan {
    pub wpm: u32,
    pub keystrokes: Vec<Keystroke>,
}

impl TypingPlan {
    /// Text left in the field after replaying every keystroke
    pub fn resulting_text(&self) -> String {
        let mut out = String::new();
        for key in &self.keystrokes {
            match key.action {
                KeyAction::Emit(c) => out.push(c),
                KeyAction::DeleteBackward => {
                    out.pop();
                }
            }
        }
        out
    }

    /// Number of injected wrong characters
    pub fn typo_count(&self) -> usize {
        self.keystrokes
            .iter()
            .filter(|k| k.correction && matches!(k.action, KeyAction::Emit(_)))
            .count()
    }

    pub fn total_duration(&self) -> Duration {
        self.keystrokes.iter().map(|k| k.delay).sum()
    }
}

// ============================================================================
// Scrolling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollKind {
    /// Pause before scrolling starts
    Think,
    /// Forward wheel step
    Step,
    /// Small reverse correction
    BackScroll,
    /// Extended pause with no movement
    Pause,
}

/// One scroll delta (vertical, positive = down) and the delay after it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollStep {
    pub delta: i32,
    #[serde(with = "duration_ms")]
    pub delay: Duration,
    pub kind: ScrollKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPlan {
    pub steps: Vec<ScrollStep>,
}

impl ScrollPlan {
    /// Sum of all deltas, including back-scrolls
    pub fn net_distance(&self) -> i64 {
        self.steps.iter().map(|s| s.delta as i64).sum()
    }

    /// Count of forward wheel steps
    pub fn forward_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.kind == ScrollKind::Step)
            .count()
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.delay).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ============================================================================
// Attention
// ============================================================================

/// Non-task-directed behaviors interleaved between real actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionKind {
    Hover,
    IdleWander,
    Reading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AttentionAction {
    Move { trajectory: Trajectory },
    Dwell {
        #[serde(with = "duration_ms")]
        duration: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionPlan {
    pub kind: AttentionKind,
    pub actions: Vec<AttentionAction>,
}

impl AttentionPlan {
    /// Where the pointer rests once the plan has played out
    pub fn final_point(&self) -> Option<Point> {
        self.actions.iter().rev().find_map(|a| match a {
            AttentionAction::Move { trajectory } => trajectory.last_point(),
            AttentionAction::Dwell { .. } => None,
        })
    }

    pub fn total_duration(&self) -> Duration {
        self.actions
            .iter()
            .map(|a| match a {
                AttentionAction::Move { trajectory } => trajectory.total_duration(),
                AttentionAction::Dwell { duration } => *duration,
            })
            .sum()
    }
}
