//! # tethys-math
//!
//! Linear algebra primitives for the Tethys dynamics core.
//!
//! Provides:
//! - Re-exports of `glam` f64 types (`DVec3`, `DMat3`) as the canonical
//!   vector/matrix types
//! - Dense LU factorization and explicit inverse (via `faer`) used to
//!   build the iterative constraint solver's preconditioner

pub mod linsolve;

// Re-export glam types as the canonical math types for Tethys.
pub use glam::{DMat3, DVec3};
pub use linsolve::DenseLu;
