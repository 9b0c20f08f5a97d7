//! # tethys-integrate
//!
//! The stepping core: particle and step state, the two-phase
//! velocity-Verlet update, the adaptive step-size controller, and the
//! orchestrator that sequences them with constraint projection and
//! virtual-site maintenance.

pub mod config;
pub mod integrator;
pub mod state;
pub mod stepsize;
pub mod verlet;

pub use config::{IntegratorConfig, StepMode};
pub use integrator::{Integrator, StepPhase};
pub use state::{ParticleState, StepState};
pub use stepsize::{select_step_size, StepChoice};
