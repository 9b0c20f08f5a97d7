//! Iterative coupled solver for general constraint clusters.
//!
//! Clusters that fit neither the analytic-triple nor the direct-star
//! shape are handled by constraint-coupling-matrix iteration: each sweep
//! computes a raw multiplier per constraint, resolves the coupling
//! between constraints sharing a particle through a precomputed sparse
//! inverse, and applies the resolved corrections. The coupling matrix is
//! assembled once from reference geometry; per-step work is a few
//! data-parallel passes per iteration.
//!
//! Two dispatch strategies cover the size range. Small groups run the
//! whole loop as one bounded work unit that observes convergence every
//! sweep. Large groups run staged: each iteration is its own set of
//! dispatches, and the host reads a convergence word published every
//! fourth iteration without stalling the dispatch stream in between.

use glam::DVec3;
use tethys_compute::{AsyncFlag, BufferArena};
use tethys_math::DenseLu;
use tethys_types::constants::{
    BOUNDED_STRATEGY_LIMIT, CCMA_CHECK_INTERVAL, CCMA_MAX_ITERATIONS, DEGENERATE_EPSILON,
    INVERSE_MATRIX_CUTOFF,
};
use tethys_types::{TethysError, TethysResult};

use crate::spec::ConstraintSpec;

/// Dispatch strategy for the iterative solver, chosen once at
/// initialization from the total constrained-particle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcmaStrategy {
    /// Whole iteration loop in a single work unit; convergence observed
    /// every sweep.
    Bounded,
    /// One dispatch set per iteration; convergence word read back
    /// asynchronously every fourth iteration.
    Staged,
}

/// Picks the strategy from the number of particles touched by iterative
/// constraints.
pub fn choose_strategy(constrained_particles: usize) -> CcmaStrategy {
    if constrained_particles <= BOUNDED_STRATEGY_LIMIT {
        CcmaStrategy::Bounded
    } else {
        CcmaStrategy::Staged
    }
}

/// One constraint in an iterative group, with cached inverse masses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CcmaBond {
    pub a: u32,
    pub b: u32,
    pub distance: f64,
    pub inv_mass_a: f64,
    pub inv_mass_b: f64,
}

/// An iterative cluster group: its bonds, the pruned sparse rows of the
/// inverse coupling matrix, and per-step direction scratch.
#[derive(Debug)]
pub(crate) struct CcmaGroup {
    pub bonds: Vec<CcmaBond>,
    /// Row `j` holds `(k, weight)` entries of the inverse coupling matrix
    /// that survived the magnitude cutoff.
    inverse_rows: Vec<Vec<(u32, f64)>>,
    /// Linearized constraint directions, refreshed from committed
    /// positions at the start of each projection.
    directions: Vec<DVec3>,
}

impl CcmaGroup {
    /// Assembles the coupling matrix from reference geometry, inverts it,
    /// and prunes the inverse to sparse rows.
    pub(crate) fn build(
        constraint_indices: &[u32],
        specs: &[ConstraintSpec],
        inv_masses: &[f64],
        reference_positions: &[DVec3],
    ) -> TethysResult<Self> {
        let bonds: Vec<CcmaBond> = constraint_indices
            .iter()
            .map(|&c| {
                let s = &specs[c as usize];
                CcmaBond {
                    a: s.particle_a,
                    b: s.particle_b,
                    distance: s.distance,
                    inv_mass_a: inv_masses[s.particle_a as usize],
                    inv_mass_b: inv_masses[s.particle_b as usize],
                }
            })
            .collect();
        let n = bonds.len();

        let mut reference_dirs = Vec::with_capacity(n);
        for bond in &bonds {
            let dir = reference_positions[bond.a as usize] - reference_positions[bond.b as usize];
            if dir.length_squared() < DEGENERATE_EPSILON {
                return Err(TethysError::InvalidTopology(format!(
                    "constrained particles {} and {} coincide in the reference geometry",
                    bond.a, bond.b
                )));
            }
            reference_dirs.push(dir.normalize());
        }

        // Coupling matrix: row j measures how much the correction of
        // constraint k leaks into constraint j through a shared particle.
        let mut incident: std::collections::HashMap<u32, Vec<u32>> =
            std::collections::HashMap::new();
        for (j, bond) in bonds.iter().enumerate() {
            incident.entry(bond.a).or_default().push(j as u32);
            incident.entry(bond.b).or_default().push(j as u32);
        }
        let mut matrix = vec![0.0; n * n];
        for (j, bond_j) in bonds.iter().enumerate() {
            matrix[j * n + j] = 1.0;
            let inv_sum_j = bond_j.inv_mass_a + bond_j.inv_mass_b;
            for shared in [bond_j.a, bond_j.b] {
                for &k in &incident[&shared] {
                    let k = k as usize;
                    if k == j {
                        continue;
                    }
                    let bond_k = &bonds[k];
                    // Same-end sharing keeps the sign of the projected
                    // correction; opposite-end sharing flips it.
                    let sign = if bond_j.a == bond_k.a || bond_j.b == bond_k.b {
                        1.0
                    } else {
                        -1.0
                    };
                    let coupling = sign
                        * reference_dirs[j].dot(reference_dirs[k])
                        * inv_masses[shared as usize]
                        / inv_sum_j;
                    // Accumulate: a pair sharing both endpoints couples
                    // through each of them.
                    matrix[j * n + k] += coupling;
                }
            }
        }

        let lu = DenseLu::factorize(n, &matrix).ok_or_else(|| {
            TethysError::InvalidTopology("empty iterative cluster group".into())
        })?;
        let inverse = lu.inverse_row_major();
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(TethysError::InvalidTopology(
                "iterative cluster coupling matrix is singular; check for redundant constraints"
                    .into(),
            ));
        }
        let inverse_rows = (0..n)
            .map(|j| {
                (0..n)
                    .filter(|&k| inverse[j * n + k].abs() >= INVERSE_MATRIX_CUTOFF)
                    .map(|k| (k as u32, inverse[j * n + k]))
                    .collect()
            })
            .collect();

        Ok(Self {
            bonds,
            inverse_rows,
            directions: vec![DVec3::ZERO; n],
        })
    }

    fn refresh_directions(&mut self, positions: &[DVec3]) {
        for (dir, bond) in self.directions.iter_mut().zip(&self.bonds) {
            let d = positions[bond.a as usize] - positions[bond.b as usize];
            *dir = if d.length_squared() < DEGENERATE_EPSILON {
                DVec3::ZERO
            } else {
                d.normalize()
            };
        }
    }
}

/// What the iterative sweep adjusts.
pub(crate) enum IterationTarget<'a> {
    /// Proposed position displacements; violation is relative distance error.
    Deltas(&'a mut [DVec3]),
    /// Velocities; violation is absolute bond-direction rate.
    Velocities(&'a mut [DVec3]),
}

/// Result of one iterative projection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CcmaOutcome {
    pub iterations: u32,
    pub max_violation: f64,
    pub converged: bool,
}

/// Runs the coupled iteration over every group in lockstep.
///
/// Non-convergence within the iteration cap is not an error: the last
/// iterate is left in place and reported through the outcome, matching
/// the solver's role as a best-effort projection inside a larger step.
pub(crate) fn project(
    groups: &mut [CcmaGroup],
    positions: &[DVec3],
    mut target: IterationTarget<'_>,
    tolerance: f64,
    strategy: CcmaStrategy,
    flag: &AsyncFlag,
    raw: &mut BufferArena,
    resolved: &mut BufferArena,
) -> CcmaOutcome {
    if groups.is_empty() {
        return CcmaOutcome {
            iterations: 0,
            max_violation: 0.0,
            converged: true,
        };
    }
    for group in groups.iter_mut() {
        group.refresh_directions(positions);
    }
    flag.reset(0);

    let mut iterations = 0;
    let mut converged = false;
    for iter in 0..CCMA_MAX_ITERATIONS {
        // Multiplier pass: raw per-constraint estimates plus the residual
        // of the current iterate.
        let mut violation: f64 = 0.0;
        for (g, group) in groups.iter().enumerate() {
            let out = raw.get_mut(g);
            measure_group(group, positions, &target, out.as_mut_slice(), &mut violation);
        }
        let satisfied = violation <= tolerance;
        let at_checkpoint = (iter + 1) % CCMA_CHECK_INTERVAL == 0;

        match strategy {
            CcmaStrategy::Bounded => {
                // Single work unit: the loop sees the residual directly.
                if satisfied {
                    converged = true;
                    break;
                }
            }
            CcmaStrategy::Staged => {
                if at_checkpoint {
                    flag.publish(u32::from(satisfied));
                }
            }
        }

        // Resolve coupling, then apply.
        for (g, group) in groups.iter().enumerate() {
            let raw_values = raw.get(g).as_slice();
            let out = resolved.get_mut(g).as_mut_slice();
            for (j, row) in group.inverse_rows.iter().enumerate() {
                let mut sum = 0.0;
                for &(k, weight) in row {
                    sum += weight * raw_values[k as usize];
                }
                out[j] = sum;
            }
        }
        for (g, group) in groups.iter().enumerate() {
            apply_group(group, resolved.get(g).as_slice(), &mut target);
        }
        iterations = iter + 1;

        if strategy == CcmaStrategy::Staged && at_checkpoint {
            // Non-blocking readback; if the word isn't visible yet the
            // host just keeps issuing iterations.
            if flag.try_read() == Some(1) {
                converged = true;
                break;
            }
        }
    }

    // Residual of the final iterate, for reporting.
    let mut final_violation: f64 = 0.0;
    let mut scratch = vec![0.0; groups.iter().map(|g| g.bonds.len()).max().unwrap_or(0)];
    for group in groups.iter() {
        let len = group.bonds.len();
        measure_group(
            group,
            positions,
            &target,
            &mut scratch[..len],
            &mut final_violation,
        );
    }
    if final_violation <= tolerance {
        converged = true;
    }
    CcmaOutcome {
        iterations,
        max_violation: final_violation,
        converged,
    }
}

/// Computes raw multipliers for one group and folds its residual into
/// `violation`.
fn measure_group(
    group: &CcmaGroup,
    positions: &[DVec3],
    target: &IterationTarget<'_>,
    raw_out: &mut [f64],
    violation: &mut f64,
) {
    for (j, bond) in group.bonds.iter().enumerate() {
        let inv_sum = bond.inv_mass_a + bond.inv_mass_b;
        let dir = group.directions[j];
        match target {
            IterationTarget::Deltas(deltas) => {
                let rp = positions[bond.a as usize] + deltas[bond.a as usize]
                    - positions[bond.b as usize]
                    - deltas[bond.b as usize];
                let rp2 = rp.length_squared();
                let d2 = bond.distance * bond.distance;
                *violation = violation.max((rp2.sqrt() / bond.distance - 1.0).abs());
                let denom = 2.0 * inv_sum * rp.dot(dir);
                raw_out[j] = if denom.abs() < DEGENERATE_EPSILON {
                    0.0
                } else {
                    (d2 - rp2) / denom
                };
            }
            IterationTarget::Velocities(velocities) => {
                let rate = dir.dot(velocities[bond.a as usize] - velocities[bond.b as usize]);
                *violation = violation.max(rate.abs());
                raw_out[j] = -rate / inv_sum;
            }
        }
    }
}

fn apply_group(group: &CcmaGroup, resolved: &[f64], target: &mut IterationTarget<'_>) {
    let adjust = match target {
        IterationTarget::Deltas(deltas) => &mut **deltas,
        IterationTarget::Velocities(velocities) => &mut **velocities,
    };
    for (j, bond) in group.bonds.iter().enumerate() {
        let step = group.directions[j] * resolved[j];
        adjust[bond.a as usize] += step * bond.inv_mass_a;
        adjust[bond.b as usize] -= step * bond.inv_mass_b;
    }
}
