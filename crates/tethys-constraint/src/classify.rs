//! Constraint cluster classification.
//!
//! The classifier partitions the constraint list into connected components
//! over shared particles and assigns each component to exactly one solver
//! family. The assignment happens once, before any projection runs; every
//! structural error is surfaced here rather than mid-step.

use std::collections::HashMap;

use tethys_types::{constants, TethysError, TethysResult};

use crate::spec::ConstraintSpec;

/// Solver family a cluster is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterKind {
    /// Rigid isoceles triple solved in closed form (zero iterations).
    AnalyticTriple,
    /// Small star of constraints around one central particle, solved by
    /// a bounded direct sweep.
    DirectSmall,
    /// Everything else: handled by the iterative coupled solver.
    IterativeGeneral,
}

/// One connected component of the constraint graph, tagged with the
/// solver family that will handle it.
#[derive(Debug, Clone)]
pub struct ConstraintCluster {
    pub kind: ClusterKind,
    /// Particle indices in the component, sorted ascending.
    pub particles: Vec<u32>,
    /// Indices into the flat constraint list, sorted ascending.
    pub constraints: Vec<u32>,
}

/// Validate the constraint list and partition it into tagged clusters.
///
/// Every constraint lands in exactly one cluster. Malformed topology —
/// out-of-range particles, self-constraints, non-positive distances,
/// duplicate pairs, constraints touching a massless (immobile) particle,
/// or an analytic-triple candidate whose distances violate the triangle
/// condition — is rejected up front.
pub fn classify_constraints(
    specs: &[ConstraintSpec],
    masses: &[f64],
) -> TethysResult<Vec<ConstraintCluster>> {
    validate_specs(specs, masses)?;

    // Particle -> incident constraint indices.
    let mut incident: HashMap<u32, Vec<u32>> = HashMap::new();
    for (idx, spec) in specs.iter().enumerate() {
        incident.entry(spec.particle_a).or_default().push(idx as u32);
        incident.entry(spec.particle_b).or_default().push(idx as u32);
    }

    let mut visited = vec![false; specs.len()];
    let mut clusters = Vec::new();
    for seed in 0..specs.len() {
        if visited[seed] {
            continue;
        }
        let component = collect_component(seed, specs, &incident, &mut visited);
        let kind = classify_component(&component, specs, masses)?;
        clusters.push(ConstraintCluster {
            kind,
            particles: component.particles,
            constraints: component.constraints,
        });
    }
    Ok(clusters)
}

pub(crate) struct Component {
    pub(crate) particles: Vec<u32>,
    pub(crate) constraints: Vec<u32>,
}

fn validate_specs(specs: &[ConstraintSpec], masses: &[f64]) -> TethysResult<()> {
    let particle_count = masses.len() as u32;
    let mut pairs = std::collections::HashSet::new();
    for (idx, spec) in specs.iter().enumerate() {
        if spec.particle_a >= particle_count || spec.particle_b >= particle_count {
            return Err(TethysError::InvalidTopology(format!(
                "constraint {idx} references a particle outside the system"
            )));
        }
        if spec.particle_a == spec.particle_b {
            return Err(TethysError::InvalidTopology(format!(
                "constraint {idx} connects particle {} to itself",
                spec.particle_a
            )));
        }
        if !(spec.distance > 0.0) {
            return Err(TethysError::InvalidTopology(format!(
                "constraint {idx} has non-positive distance {}",
                spec.distance
            )));
        }
        if masses[spec.particle_a as usize] <= 0.0 || masses[spec.particle_b as usize] <= 0.0 {
            return Err(TethysError::InvalidTopology(format!(
                "constraint {idx} involves a massless particle"
            )));
        }
        if !pairs.insert(spec.canonical_pair()) {
            let (a, b) = spec.canonical_pair();
            return Err(TethysError::InvalidTopology(format!(
                "particles {a} and {b} are constrained more than once"
            )));
        }
    }
    Ok(())
}

/// Breadth-first walk over constraints sharing particles, starting from
/// `seed`. Marks every reached constraint visited.
fn collect_component(
    seed: usize,
    specs: &[ConstraintSpec],
    incident: &HashMap<u32, Vec<u32>>,
    visited: &mut [bool],
) -> Component {
    let mut queue = vec![seed as u32];
    visited[seed] = true;
    let mut constraints = Vec::new();
    let mut particles = Vec::new();
    while let Some(cidx) = queue.pop() {
        constraints.push(cidx);
        let spec = &specs[cidx as usize];
        for particle in [spec.particle_a, spec.particle_b] {
            if !particles.contains(&particle) {
                particles.push(particle);
                for &next in &incident[&particle] {
                    if !visited[next as usize] {
                        visited[next as usize] = true;
                        queue.push(next);
                    }
                }
            }
        }
    }
    constraints.sort_unstable();
    particles.sort_unstable();
    Component {
        particles,
        constraints,
    }
}

fn classify_component(
    component: &Component,
    specs: &[ConstraintSpec],
    masses: &[f64],
) -> TethysResult<ClusterKind> {
    if match_analytic_triple(component, specs, masses)? {
        return Ok(ClusterKind::AnalyticTriple);
    }
    if match_direct_star(component, specs, masses) {
        return Ok(ClusterKind::DirectSmall);
    }
    Ok(ClusterKind::IterativeGeneral)
}

/// An analytic triple is a fully-constrained triangle with an apex particle
/// whose two bonds have equal length and whose two neighbours have equal
/// mass. Degenerate geometry is a topology error, not a runtime fallback.
fn match_analytic_triple(
    component: &Component,
    specs: &[ConstraintSpec],
    masses: &[f64],
) -> TethysResult<bool> {
    if component.particles.len() != 3 || component.constraints.len() != 3 {
        return Ok(false);
    }
    let Some(geometry) =
        triple_geometry(&component.particles, &component.constraints, specs, masses)
    else {
        return Ok(false);
    };
    let half_base = 0.5 * geometry.base_distance;
    if geometry.leg_distance * geometry.leg_distance - half_base * half_base
        <= constants::DEGENERATE_EPSILON
    {
        return Err(TethysError::InvalidTopology(format!(
            "rigid triple ({}, {}, {}) has degenerate geometry: legs {} cannot span base {}",
            geometry.apex, geometry.wing_a, geometry.wing_b,
            geometry.leg_distance, geometry.base_distance
        )));
    }
    Ok(true)
}

/// Geometry of a matched analytic triple.
pub(crate) struct TripleGeometry {
    pub apex: u32,
    pub wing_a: u32,
    pub wing_b: u32,
    /// Length of the two apex bonds (equal by the matching rule).
    pub leg_distance: f64,
    /// Length of the wing-wing bond.
    pub base_distance: f64,
}

/// Finds the apex particle: both its incident constraints have the same
/// distance, and the two remaining particles carry equal masses.
fn find_triple_apex(
    particles: &[u32],
    constraints: &[u32],
    specs: &[ConstraintSpec],
    masses: &[f64],
) -> Option<u32> {
    for &candidate in particles {
        let legs: Vec<u32> = constraints
            .iter()
            .copied()
            .filter(|&c| {
                let s = &specs[c as usize];
                s.particle_a == candidate || s.particle_b == candidate
            })
            .collect();
        if legs.len() != 2 {
            continue;
        }
        let d0 = specs[legs[0] as usize].distance;
        let d1 = specs[legs[1] as usize].distance;
        if !nearly_equal(d0, d1) {
            continue;
        }
        let wings: Vec<u32> = particles
            .iter()
            .copied()
            .filter(|&p| p != candidate)
            .collect();
        if nearly_equal(masses[wings[0] as usize], masses[wings[1] as usize]) {
            return Some(candidate);
        }
    }
    None
}

pub(crate) fn triple_geometry(
    particles: &[u32],
    constraints: &[u32],
    specs: &[ConstraintSpec],
    masses: &[f64],
) -> Option<TripleGeometry> {
    let apex = find_triple_apex(particles, constraints, specs, masses)?;
    let mut leg_distance = 0.0;
    let mut base_distance = 0.0;
    let mut wings = [0u32; 2];
    let mut wing_count = 0;
    for &c in constraints {
        let s = &specs[c as usize];
        if s.particle_a == apex || s.particle_b == apex {
            leg_distance = s.distance;
        } else {
            base_distance = s.distance;
            wings = [s.particle_a, s.particle_b];
            wing_count += 1;
        }
    }
    if wing_count != 1 {
        return None;
    }
    Some(TripleGeometry {
        apex,
        wing_a: wings[0],
        wing_b: wings[1],
        leg_distance,
        base_distance,
    })
}

/// Finds the particle incident to every constraint of a star component.
pub(crate) fn star_center(
    particles: &[u32],
    constraints: &[u32],
    specs: &[ConstraintSpec],
) -> Option<u32> {
    particles.iter().copied().find(|&p| {
        constraints.iter().all(|&c| {
            let s = &specs[c as usize];
            s.particle_a == p || s.particle_b == p
        })
    })
}

/// A direct star is a component where every constraint shares one central
/// particle, the star is small, and the peripheral particles all carry
/// the same mass. The equal-mass restriction is what bounds the direct
/// sweep's iteration count.
fn match_direct_star(component: &Component, specs: &[ConstraintSpec], masses: &[f64]) -> bool {
    if component.constraints.len() > constants::DIRECT_CLUSTER_LIMIT {
        return false;
    }
    let Some(center) = star_center(&component.particles, &component.constraints, specs) else {
        return false;
    };
    let mut peripheral_mass = None;
    for &c in &component.constraints {
        let s = &specs[c as usize];
        let other = if s.particle_a == center {
            s.particle_b
        } else {
            s.particle_a
        };
        let mass = masses[other as usize];
        match peripheral_mass {
            None => peripheral_mass = Some(mass),
            Some(expected) if nearly_equal(expected, mass) => {}
            Some(_) => return false,
        }
    }
    true
}

fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-10 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water(offset: u32) -> Vec<ConstraintSpec> {
        vec![
            ConstraintSpec::new(offset, offset + 1, 0.09572),
            ConstraintSpec::new(offset, offset + 2, 0.09572),
            ConstraintSpec::new(offset + 1, offset + 2, 0.15139),
        ]
    }

    #[test]
    fn water_molecule_is_analytic_triple() {
        let masses = vec![15.999, 1.008, 1.008];
        let clusters = classify_constraints(&water(0), &masses).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].kind, ClusterKind::AnalyticTriple);
        assert_eq!(clusters[0].particles, vec![0, 1, 2]);
    }

    #[test]
    fn unequal_wing_masses_fall_back_to_iterative() {
        let masses = vec![15.999, 1.008, 2.014];
        let clusters = classify_constraints(&water(0), &masses).unwrap();
        assert_eq!(clusters[0].kind, ClusterKind::IterativeGeneral);
    }

    #[test]
    fn degenerate_triple_is_rejected() {
        // Base longer than both legs combined: no triangle exists.
        let specs = vec![
            ConstraintSpec::new(0, 1, 0.1),
            ConstraintSpec::new(0, 2, 0.1),
            ConstraintSpec::new(1, 2, 0.5),
        ];
        let masses = vec![15.999, 1.008, 1.008];
        let err = classify_constraints(&specs, &masses).unwrap_err();
        assert!(err.to_string().contains("degenerate"));
    }

    #[test]
    fn methyl_star_is_direct_small() {
        let specs = vec![
            ConstraintSpec::new(0, 1, 0.109),
            ConstraintSpec::new(0, 2, 0.109),
            ConstraintSpec::new(0, 3, 0.109),
        ];
        let masses = vec![12.011, 1.008, 1.008, 1.008];
        let clusters = classify_constraints(&specs, &masses).unwrap();
        assert_eq!(clusters[0].kind, ClusterKind::DirectSmall);
    }

    #[test]
    fn single_bond_is_direct_small() {
        let specs = vec![ConstraintSpec::new(0, 1, 0.1)];
        let masses = vec![12.011, 1.008];
        let clusters = classify_constraints(&specs, &masses).unwrap();
        assert_eq!(clusters[0].kind, ClusterKind::DirectSmall);
    }

    #[test]
    fn chain_is_iterative_general() {
        let specs = vec![
            ConstraintSpec::new(0, 1, 0.15),
            ConstraintSpec::new(1, 2, 0.15),
            ConstraintSpec::new(2, 3, 0.15),
            ConstraintSpec::new(3, 4, 0.15),
            ConstraintSpec::new(4, 5, 0.15),
        ];
        let masses = vec![12.0; 6];
        let clusters = classify_constraints(&specs, &masses).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].kind, ClusterKind::IterativeGeneral);
    }

    #[test]
    fn every_constraint_lands_in_exactly_one_cluster() {
        let mut specs = water(0);
        specs.extend(water(3));
        specs.push(ConstraintSpec::new(6, 7, 0.12));
        let masses = vec![
            15.999, 1.008, 1.008, 15.999, 1.008, 1.008, 12.011, 1.008,
        ];
        let clusters = classify_constraints(&specs, &masses).unwrap();
        let mut seen = vec![0usize; specs.len()];
        for cluster in &clusters {
            for &c in &cluster.constraints {
                seen[c as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn rejects_self_constraint() {
        let specs = vec![ConstraintSpec::new(1, 1, 0.1)];
        let masses = vec![1.0, 1.0];
        assert!(classify_constraints(&specs, &masses).is_err());
    }

    #[test]
    fn rejects_massless_endpoint() {
        let specs = vec![ConstraintSpec::new(0, 1, 0.1)];
        let masses = vec![1.0, 0.0];
        assert!(classify_constraints(&specs, &masses).is_err());
    }

    #[test]
    fn rejects_duplicate_pair() {
        let specs = vec![
            ConstraintSpec::new(0, 1, 0.1),
            ConstraintSpec::new(1, 0, 0.12),
        ];
        let masses = vec![1.0, 1.0];
        let err = classify_constraints(&specs, &masses).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_out_of_range_particle() {
        let specs = vec![ConstraintSpec::new(0, 9, 0.1)];
        let masses = vec![1.0, 1.0];
        assert!(classify_constraints(&specs, &masses).is_err());
    }
}
