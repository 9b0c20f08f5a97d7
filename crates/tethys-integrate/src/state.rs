//! Particle and step state.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tethys_types::{TethysError, TethysResult};

/// Per-particle simulation state.
///
/// Owned by the simulation context; the integrator and solvers borrow it
/// for the duration of each call. `pos_delta` holds the uncommitted
/// displacement between the two phases of a step, so constraint
/// projection acts on the delta rather than on committed positions.
#[derive(Debug, Clone)]
pub struct ParticleState {
    pub positions: Vec<DVec3>,
    pub velocities: Vec<DVec3>,
    pub forces: Vec<DVec3>,
    pub masses: Vec<f64>,
    /// Zero for immobile particles and virtual sites.
    pub inv_masses: Vec<f64>,
    /// Uncommitted displacement for the step in flight.
    pub pos_delta: Vec<DVec3>,
}

impl ParticleState {
    /// Creates a state at rest. Mass zero marks a particle immobile (or a
    /// virtual site); negative masses are rejected.
    pub fn new(masses: Vec<f64>, positions: Vec<DVec3>) -> TethysResult<Self> {
        if masses.len() != positions.len() {
            return Err(TethysError::InvalidConfig(format!(
                "{} masses but {} positions",
                masses.len(),
                positions.len()
            )));
        }
        if let Some(m) = masses.iter().find(|&&m| m < 0.0 || !m.is_finite()) {
            return Err(TethysError::InvalidConfig(format!(
                "particle mass must be finite and non-negative, got {m}"
            )));
        }
        let n = masses.len();
        let inv_masses = masses
            .iter()
            .map(|&m| if m > 0.0 { 1.0 / m } else { 0.0 })
            .collect();
        Ok(Self {
            positions,
            velocities: vec![DVec3::ZERO; n],
            forces: vec![DVec3::ZERO; n],
            masses,
            inv_masses,
            pos_delta: vec![DVec3::ZERO; n],
        })
    }

    /// Number of particles.
    pub fn particle_count(&self) -> usize {
        self.masses.len()
    }
}

/// Step bookkeeping, serializable for checkpoint/restart.
///
/// The previous step size feeds both the velocity half-step width and
/// the step-size controller's hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    /// Completed steps.
    pub step_index: u64,
    /// Accumulated simulation time.
    pub time: f64,
    /// Step size the next step will use.
    pub step_size: f64,
    /// Step size the last committed step used (zero before the first).
    pub previous_step_size: f64,
}

impl StepState {
    /// Fresh state starting at time zero with the given step size.
    pub fn new(step_size: f64) -> Self {
        Self {
            step_index: 0,
            time: 0.0,
            step_size,
            previous_step_size: 0.0,
        }
    }
}
