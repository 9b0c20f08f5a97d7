//! Direct solver for small star clusters.
//!
//! A star cluster couples a handful of constraints only through their
//! shared central particle, and all peripheral particles carry the same
//! mass. Under those restrictions a Gauss-Seidel sweep over the arms
//! contracts fast enough that a fixed iteration bound always suffices;
//! the solver runs to tolerance and is treated as exact by callers.

use glam::DVec3;
use tethys_types::constants::{DEGENERATE_EPSILON, DIRECT_SOLVER_ITERATIONS};

/// One arm of a star cluster.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StarArm {
    pub particle: u32,
    pub distance: f64,
}

/// A star cluster: every constraint joins the center to one arm particle.
#[derive(Debug, Clone)]
pub(crate) struct StarCluster {
    pub center: u32,
    pub arms: Vec<StarArm>,
    pub inv_mass_center: f64,
    pub inv_mass_arm: f64,
}

/// Corrects a proposed move so every arm distance is restored.
///
/// Constraint directions are linearized around the committed positions,
/// the standard choice that keeps each single-arm update exact to first
/// order while the sweep absorbs the coupling through the center.
pub(crate) fn project_positions(
    cluster: &StarCluster,
    positions: &[DVec3],
    deltas: &mut [DVec3],
    tolerance: f64,
) {
    let center = cluster.center as usize;
    let inv_sum = cluster.inv_mass_center + cluster.inv_mass_arm;
    let lower = 1.0 - 2.0 * tolerance + tolerance * tolerance;
    let upper = 1.0 + 2.0 * tolerance + tolerance * tolerance;
    for _ in 0..DIRECT_SOLVER_ITERATIONS {
        let mut converged = true;
        for arm in &cluster.arms {
            let particle = arm.particle as usize;
            let reference = positions[center] - positions[particle];
            let proposed = reference + deltas[center] - deltas[particle];
            let d2 = arm.distance * arm.distance;
            let rp2 = proposed.length_squared();
            if rp2 < lower * d2 || rp2 > upper * d2 {
                converged = false;
                let denom = 2.0 * inv_sum * proposed.dot(reference);
                if denom.abs() < DEGENERATE_EPSILON {
                    continue;
                }
                let g = (d2 - rp2) / denom;
                deltas[center] += reference * (g * cluster.inv_mass_center);
                deltas[particle] -= reference * (g * cluster.inv_mass_arm);
            }
        }
        if converged {
            break;
        }
    }
}

/// Removes bond-direction relative velocity on every arm.
pub(crate) fn project_velocities(
    cluster: &StarCluster,
    positions: &[DVec3],
    velocities: &mut [DVec3],
    tolerance: f64,
) {
    let center = cluster.center as usize;
    let inv_sum = cluster.inv_mass_center + cluster.inv_mass_arm;
    for _ in 0..DIRECT_SOLVER_ITERATIONS {
        let mut converged = true;
        for arm in &cluster.arms {
            let particle = arm.particle as usize;
            let bond = positions[center] - positions[particle];
            let length_sq = bond.length_squared();
            if length_sq < DEGENERATE_EPSILON {
                continue;
            }
            let direction = bond / length_sq.sqrt();
            let rate = direction.dot(velocities[center] - velocities[particle]);
            if rate.abs() > tolerance {
                converged = false;
                let lambda = -rate / inv_sum;
                velocities[center] += direction * (lambda * cluster.inv_mass_center);
                velocities[particle] -= direction * (lambda * cluster.inv_mass_arm);
            }
        }
        if converged {
            break;
        }
    }
}
