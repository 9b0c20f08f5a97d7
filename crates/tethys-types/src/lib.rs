//! # tethys-types
//!
//! Shared types, error types, and solver constants for the Tethys
//! constrained-dynamics core.
//!
//! This crate has zero domain logic — it defines the vocabulary
//! that all other Tethys crates share.

pub mod constants;
pub mod error;
pub mod precision;

pub use error::{TethysError, TethysResult};
pub use precision::{PrecisionMode, ScalarArg, ScalarEncoder};
