//! Integration event types.
//!
//! Lightweight value types carrying just enough data for monitoring and
//! debugging; nothing here borrows simulation state.

use serde::{Deserialize, Serialize};

/// An event emitted by the integration core, tagged with the step it
/// belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct StepEvent {
    /// Step number (0-indexed).
    pub step: u64,
    /// Event payload.
    pub kind: EventKind,
}

impl StepEvent {
    /// Creates a new event for the given step.
    pub fn new(step: u64, kind: EventKind) -> Self {
        Self { step, kind }
    }
}

/// What bounded the selected step size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepSizeLimit {
    /// The raw error-derived candidate was used as-is.
    Unlimited,
    /// Clamped to the growth cap over the previous step.
    GrowthCap,
    /// Candidate was within the hysteresis band; previous size kept.
    Hysteresis,
    /// Clamped to the configured maximum step size.
    Ceiling,
}

/// Event payload variants.
#[derive(Debug, Clone, Serialize)]
pub enum EventKind {
    /// A step began.
    StepBegin {
        /// Step size the step will attempt.
        step_size: f64,
        /// Simulation time at the start of the step.
        sim_time: f64,
    },

    /// A step finished.
    StepEnd {
        /// Wall-clock duration of the step (seconds).
        wall_time: f64,
    },

    /// A constraint projection finished.
    ConstraintProjection {
        /// "positions" or "velocities".
        target: &'static str,
        /// Iterations spent in the iterative solver.
        iterations: u32,
        /// Largest remaining violation.
        max_violation: f64,
        /// Whether the iterative solver reached tolerance.
        converged: bool,
    },

    /// The adaptive controller selected a step size.
    StepSizeSelected {
        /// Size actually adopted.
        selected: f64,
        /// Error-derived candidate before clamping.
        raw_candidate: f64,
        /// Which rule bounded the candidate.
        limited_by: StepSizeLimit,
    },
}
