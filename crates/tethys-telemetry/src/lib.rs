//! # tethys-telemetry
//!
//! Event bus for integration telemetry. The integrator emits structured
//! events (step boundaries, constraint residuals, step-size decisions)
//! that pluggable sinks consume — log output, in-memory collection for
//! tests, or anything implementing [`sinks::EventSink`].

pub mod bus;
pub mod events;
pub mod sinks;

pub use bus::EventBus;
pub use events::{EventKind, StepEvent, StepSizeLimit};
