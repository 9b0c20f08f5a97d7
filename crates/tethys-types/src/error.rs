//! Error types for the Tethys dynamics core.
//!
//! All crates return `TethysResult<T>` from fallible operations.

use thiserror::Error;

/// Unified error type for the Tethys dynamics core.
#[derive(Debug, Error)]
pub enum TethysError {
    /// Constraint or virtual-site topology is malformed. Raised at
    /// classification/staging time, before any kernel is launched.
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The compute backend reported a failure during kernel execution
    /// or memory transfer. Always fatal for the step.
    #[error("Device error in {context}: {status}")]
    Device {
        /// The originating call site (kernel or operation name).
        context: String,
        /// The backend's native status description.
        status: String,
    },

    /// I/O operation failed (checkpoint plumbing).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for `Result<T, TethysError>`.
pub type TethysResult<T> = Result<T, TethysError>;
