//! Solver constants and simulation defaults.

/// Hard iteration cap for the iterative general constraint solver.
pub const CCMA_MAX_ITERATIONS: u32 = 150;

/// The staged strategy reads the convergence flag every this many iterations.
pub const CCMA_CHECK_INTERVAL: u32 = 4;

/// Constrained-particle count at or below which the iterative solver runs
/// its whole loop as a single work unit.
pub const BOUNDED_STRATEGY_LIMIT: usize = 1024;

/// Entries of the inverse coupling matrix smaller than this in magnitude
/// are pruned from the sparse preconditioner rows.
pub const INVERSE_MATRIX_CUTOFF: f64 = 0.02;

/// Maximum constraints in a star cluster handled by the direct solver.
pub const DIRECT_CLUSTER_LIMIT: usize = 4;

/// Iteration bound for the direct cluster solver. Convergence within this
/// bound is guaranteed by the cluster-size restriction.
pub const DIRECT_SOLVER_ITERATIONS: u32 = 25;

/// Default relative tolerance for constraint projection.
pub const DEFAULT_CONSTRAINT_TOLERANCE: f64 = 1.0e-8;

/// The step-size candidate may not exceed this multiple of the previous step.
pub const STEP_GROWTH_LIMIT: f64 = 2.0;

/// Candidates within this multiple of the previous step size keep the
/// previous size unchanged (avoids step-size chatter).
pub const STEP_HYSTERESIS_BAND: f64 = 1.1;

/// Epsilon for degenerate-geometry detection.
pub const DEGENERATE_EPSILON: f64 = 1.0e-12;
