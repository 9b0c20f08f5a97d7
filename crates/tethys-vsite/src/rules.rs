//! Site construction rules and their force Jacobians.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// How a virtual site's position is derived from its parents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VirtualSiteRule {
    /// Weighted average of two parents.
    TwoParticleAverage { parents: [u32; 2], weights: [f64; 2] },
    /// Weighted average of three parents.
    ThreeParticleAverage { parents: [u32; 3], weights: [f64; 3] },
    /// In-plane combination plus a component along the plane normal:
    /// `p1 + w12·r12 + w13·r13 + wc·(r12 × r13)`.
    OutOfPlane {
        parents: [u32; 3],
        weight12: f64,
        weight13: f64,
        weight_cross: f64,
    },
}

/// A virtual site: the particle it positions and its rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirtualSite {
    pub site: u32,
    pub rule: VirtualSiteRule,
}

impl VirtualSiteRule {
    /// Parent particle indices, in rule order.
    pub fn parents(&self) -> &[u32] {
        match self {
            Self::TwoParticleAverage { parents, .. } => parents,
            Self::ThreeParticleAverage { parents, .. } => parents,
            Self::OutOfPlane { parents, .. } => parents,
        }
    }

    /// Evaluates the site position from current parent positions.
    pub fn position(&self, positions: &[DVec3]) -> DVec3 {
        match *self {
            Self::TwoParticleAverage { parents, weights } => {
                positions[parents[0] as usize] * weights[0]
                    + positions[parents[1] as usize] * weights[1]
            }
            Self::ThreeParticleAverage { parents, weights } => {
                positions[parents[0] as usize] * weights[0]
                    + positions[parents[1] as usize] * weights[1]
                    + positions[parents[2] as usize] * weights[2]
            }
            Self::OutOfPlane {
                parents,
                weight12,
                weight13,
                weight_cross,
            } => {
                let p1 = positions[parents[0] as usize];
                let r12 = positions[parents[1] as usize] - p1;
                let r13 = positions[parents[2] as usize] - p1;
                p1 + r12 * weight12 + r13 * weight13 + r12.cross(r13) * weight_cross
            }
        }
    }

    /// Pushes the force accumulated on the site onto its parents through
    /// the transpose of the position Jacobian.
    pub fn redistribute(&self, positions: &[DVec3], force: DVec3, forces: &mut [DVec3]) {
        match *self {
            Self::TwoParticleAverage { parents, weights } => {
                forces[parents[0] as usize] += force * weights[0];
                forces[parents[1] as usize] += force * weights[1];
            }
            Self::ThreeParticleAverage { parents, weights } => {
                forces[parents[0] as usize] += force * weights[0];
                forces[parents[1] as usize] += force * weights[1];
                forces[parents[2] as usize] += force * weights[2];
            }
            Self::OutOfPlane {
                parents,
                weight12,
                weight13,
                weight_cross,
            } => {
                let p1 = positions[parents[0] as usize];
                let r12 = positions[parents[1] as usize] - p1;
                let r13 = positions[parents[2] as usize] - p1;
                let f2 = force * weight12 + r13.cross(force) * weight_cross;
                let f3 = force * weight13 + force.cross(r12) * weight_cross;
                forces[parents[1] as usize] += f2;
                forces[parents[2] as usize] += f3;
                forces[parents[0] as usize] += force - f2 - f3;
            }
        }
    }
}
