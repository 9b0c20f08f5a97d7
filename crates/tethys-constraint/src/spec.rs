//! Constraint specifications.
//!
//! A [`ConstraintSpec`] fixes the distance between two particles to a
//! constant value. Specs are immutable after construction and collected
//! into a flat ordered sequence at initialization.

use serde::{Deserialize, Serialize};

/// A holonomic bond-length constraint between two particles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    /// First particle index.
    pub particle_a: u32,
    /// Second particle index.
    pub particle_b: u32,
    /// Target separation distance.
    pub distance: f64,
}

impl ConstraintSpec {
    /// Creates a constraint fixing the distance between two particles.
    pub fn new(particle_a: u32, particle_b: u32, distance: f64) -> Self {
        Self {
            particle_a,
            particle_b,
            distance,
        }
    }

    /// Returns the constraint endpoints as a canonical `(min, max)` pair.
    pub fn canonical_pair(&self) -> (u32, u32) {
        if self.particle_a < self.particle_b {
            (self.particle_a, self.particle_b)
        } else {
            (self.particle_b, self.particle_a)
        }
    }
}
