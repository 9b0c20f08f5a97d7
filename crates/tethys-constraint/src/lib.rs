//! Constraint classification and projection for the Tethys dynamics core.
//!
//! The [`ConstraintSolver`] takes a flat list of distance constraints,
//! partitions it into clusters, routes each cluster to the cheapest solver
//! family that handles its shape, and projects proposed moves (or
//! velocities) back onto the constraint manifold:
//!
//! - rigid isoceles triples → closed-form solve, zero iterations
//! - small equal-mass stars → bounded direct sweep
//! - everything else → coupled iteration with a precomputed inverse
//!
//! Classification happens once at construction; per-step projection does
//! no allocation and no topology work.

pub mod ccma;
pub mod classify;
mod settle;
mod shake;
pub mod spec;
mod workspace;

use glam::DVec3;
use tethys_types::{TethysError, TethysResult};

pub use ccma::{choose_strategy, CcmaStrategy};
pub use classify::{classify_constraints, ClusterKind, ConstraintCluster};
pub use spec::ConstraintSpec;

use workspace::SolverWorkspace;

/// What a projection call adjusts.
pub enum Projection<'a> {
    /// Project proposed displacements so `positions + deltas` satisfies
    /// every constraint. `positions` must already satisfy them.
    Positions {
        positions: &'a [DVec3],
        deltas: &'a mut [DVec3],
    },
    /// Remove constraint-violating components from velocities.
    Velocities {
        positions: &'a [DVec3],
        velocities: &'a mut [DVec3],
    },
}

/// Which quantity a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Positions,
    Velocities,
}

/// Outcome of one projection call.
///
/// The analytic and direct families always succeed; `iterations`,
/// `max_violation` and `converged` describe the iterative part. A
/// non-converged projection leaves the last iterate applied — the
/// projection API itself never fails on residual error, callers that
/// care inspect the report.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionReport {
    pub kind: ProjectionKind,
    /// Strategy used for the iterative part, if any iterative clusters exist.
    pub strategy: Option<CcmaStrategy>,
    /// Iterations spent in the iterative solver.
    pub iterations: u32,
    /// Largest remaining violation among iterative constraints: relative
    /// distance error for positions, absolute bond rate for velocities.
    pub max_violation: f64,
    /// Whether the iterative part reached tolerance within the cap.
    pub converged: bool,
}

/// Classified constraint system with prebuilt per-cluster solver data.
pub struct ConstraintSolver {
    specs: Vec<ConstraintSpec>,
    masses: Vec<f64>,
    inv_masses: Vec<f64>,
    clusters: Vec<ConstraintCluster>,
    workspace: SolverWorkspace,
}

impl ConstraintSolver {
    /// Classifies the constraints and builds all solver data.
    ///
    /// `reference_positions` supplies the geometry the iterative coupling
    /// matrix is linearized around; it must satisfy the constraints to
    /// reasonable accuracy (equilibrium geometry is the usual choice).
    pub fn new(
        specs: Vec<ConstraintSpec>,
        masses: &[f64],
        reference_positions: &[DVec3],
    ) -> TethysResult<Self> {
        if reference_positions.len() != masses.len() {
            return Err(TethysError::InvalidConfig(format!(
                "{} masses but {} reference positions",
                masses.len(),
                reference_positions.len()
            )));
        }
        let clusters = classify_constraints(&specs, masses)?;
        let inv_masses: Vec<f64> = masses
            .iter()
            .map(|&m| if m > 0.0 { 1.0 / m } else { 0.0 })
            .collect();
        let workspace =
            SolverWorkspace::build(&clusters, &specs, masses, &inv_masses, reference_positions)?;
        Ok(Self {
            specs,
            masses: masses.to_vec(),
            inv_masses,
            clusters,
            workspace,
        })
    }

    /// Replaces the constraint topology, rebuilding classification and
    /// cluster data.
    pub fn rebuild(
        &mut self,
        specs: Vec<ConstraintSpec>,
        reference_positions: &[DVec3],
    ) -> TethysResult<()> {
        let rebuilt = Self::new(specs, &self.masses, reference_positions)?;
        *self = rebuilt;
        Ok(())
    }

    /// The classified clusters, in classification order.
    pub fn clusters(&self) -> &[ConstraintCluster] {
        &self.clusters
    }

    /// Number of constraints.
    pub fn constraint_count(&self) -> usize {
        self.specs.len()
    }

    /// Strategy the iterative solver will use, if any iterative clusters
    /// exist.
    pub fn strategy(&self) -> Option<CcmaStrategy> {
        self.workspace
            .has_iterative_work()
            .then_some(self.workspace.strategy)
    }

    /// Per-particle inverse masses (zero for immobile particles).
    pub fn inverse_masses(&self) -> &[f64] {
        &self.inv_masses
    }

    /// Projects positions or velocities onto the constraint manifold.
    pub fn project(
        &mut self,
        projection: Projection<'_>,
        tolerance: f64,
    ) -> TethysResult<ProjectionReport> {
        if !(tolerance > 0.0) {
            return Err(TethysError::InvalidConfig(format!(
                "constraint tolerance must be positive, got {tolerance}"
            )));
        }
        let kind;
        let outcome;
        match projection {
            Projection::Positions { positions, deltas } => {
                self.check_lengths(positions.len(), deltas.len())?;
                kind = ProjectionKind::Positions;
                for triple in &self.workspace.triples {
                    settle::project_positions(triple, positions, deltas);
                }
                for star in &self.workspace.stars {
                    shake::project_positions(star, positions, deltas, tolerance);
                }
                outcome = ccma::project(
                    &mut self.workspace.groups,
                    positions,
                    ccma::IterationTarget::Deltas(deltas),
                    tolerance,
                    self.workspace.strategy,
                    &self.workspace.flag,
                    &mut self.workspace.raw,
                    &mut self.workspace.resolved,
                );
            }
            Projection::Velocities {
                positions,
                velocities,
            } => {
                self.check_lengths(positions.len(), velocities.len())?;
                kind = ProjectionKind::Velocities;
                for triple in &self.workspace.triples {
                    settle::project_velocities(triple, positions, velocities);
                }
                for star in &self.workspace.stars {
                    shake::project_velocities(star, positions, velocities, tolerance);
                }
                outcome = ccma::project(
                    &mut self.workspace.groups,
                    positions,
                    ccma::IterationTarget::Velocities(velocities),
                    tolerance,
                    self.workspace.strategy,
                    &self.workspace.flag,
                    &mut self.workspace.raw,
                    &mut self.workspace.resolved,
                );
            }
        }
        Ok(ProjectionReport {
            kind,
            strategy: self
                .workspace
                .has_iterative_work()
                .then_some(self.workspace.strategy),
            iterations: outcome.iterations,
            max_violation: outcome.max_violation,
            converged: outcome.converged,
        })
    }

    fn check_lengths(&self, positions: usize, adjusted: usize) -> TethysResult<()> {
        let expected = self.masses.len();
        if positions != expected || adjusted != expected {
            return Err(TethysError::InvalidConfig(format!(
                "projection arrays must hold {expected} particles, got {positions} and {adjusted}"
            )));
        }
        Ok(())
    }
}
