//! Solver workspace: per-cluster data and scratch storage.
//!
//! Built once from the classified clusters. All scratch the iterative
//! solver needs lives in buffer arenas sized at build time; nothing is
//! allocated per step.

use glam::DVec3;
use tethys_compute::{AsyncFlag, BufferArena};
use tethys_types::{TethysError, TethysResult};

use crate::ccma::{choose_strategy, CcmaGroup, CcmaStrategy};
use crate::classify::{star_center, triple_geometry, ClusterKind, ConstraintCluster};
use crate::settle::TripleCluster;
use crate::shake::{StarArm, StarCluster};
use crate::spec::ConstraintSpec;

pub(crate) struct SolverWorkspace {
    pub triples: Vec<TripleCluster>,
    pub stars: Vec<StarCluster>,
    pub groups: Vec<CcmaGroup>,
    pub strategy: CcmaStrategy,
    pub flag: AsyncFlag,
    pub raw: BufferArena,
    pub resolved: BufferArena,
}

impl SolverWorkspace {
    pub(crate) fn build(
        clusters: &[ConstraintCluster],
        specs: &[ConstraintSpec],
        masses: &[f64],
        inv_masses: &[f64],
        reference_positions: &[DVec3],
    ) -> TethysResult<Self> {
        let mut triples = Vec::new();
        let mut stars = Vec::new();
        let mut groups = Vec::new();
        let mut iterative_particles = 0usize;

        for cluster in clusters {
            match cluster.kind {
                ClusterKind::AnalyticTriple => {
                    let geometry =
                        triple_geometry(&cluster.particles, &cluster.constraints, specs, masses)
                            .ok_or_else(|| {
                                TethysError::InvalidTopology(
                                    "cluster tagged analytic-triple lost its triple shape".into(),
                                )
                            })?;
                    triples.push(TripleCluster::new(
                        geometry.apex,
                        geometry.wing_a,
                        geometry.wing_b,
                        masses[geometry.apex as usize],
                        masses[geometry.wing_a as usize],
                        geometry.leg_distance,
                        geometry.base_distance,
                    ));
                }
                ClusterKind::DirectSmall => {
                    let center = star_center(&cluster.particles, &cluster.constraints, specs)
                        .ok_or_else(|| {
                            TethysError::InvalidTopology(
                                "cluster tagged direct-small lost its star shape".into(),
                            )
                        })?;
                    let arms = cluster
                        .constraints
                        .iter()
                        .map(|&c| {
                            let s = &specs[c as usize];
                            let particle = if s.particle_a == center {
                                s.particle_b
                            } else {
                                s.particle_a
                            };
                            StarArm {
                                particle,
                                distance: s.distance,
                            }
                        })
                        .collect::<Vec<_>>();
                    let inv_mass_arm = inv_masses[arms[0].particle as usize];
                    stars.push(StarCluster {
                        center,
                        arms,
                        inv_mass_center: inv_masses[center as usize],
                        inv_mass_arm,
                    });
                }
                ClusterKind::IterativeGeneral => {
                    iterative_particles += cluster.particles.len();
                    groups.push(CcmaGroup::build(
                        &cluster.constraints,
                        specs,
                        inv_masses,
                        reference_positions,
                    )?);
                }
            }
        }

        let shapes: Vec<usize> = groups.iter().map(|g| g.bonds.len()).collect();
        Ok(Self {
            triples,
            stars,
            groups,
            strategy: choose_strategy(iterative_particles),
            flag: AsyncFlag::new(),
            raw: BufferArena::with_shapes(&shapes),
            resolved: BufferArena::with_shapes(&shapes),
        })
    }

    pub(crate) fn has_iterative_work(&self) -> bool {
        !self.groups.is_empty()
    }
}
