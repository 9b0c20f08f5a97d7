//! # tethys-compute
//!
//! Compute-dispatch abstraction for the Tethys dynamics core.
//!
//! The [`ComputeBackend`] trait defines the data-parallel primitives the
//! integration layer dispatches; [`CpuBackend`](backend::CpuBackend)
//! executes them sequentially and serves as the reference for correctness.
//! Kernels submitted to one backend execute in issue (FIFO) order.
//!
//! [`AsyncFlag`](flag::AsyncFlag) is the non-blocking scalar readback
//! primitive: a kernel publishes a host-visible word, and the host reads
//! it without stalling further kernel issuance.

pub mod backend;
pub mod buffers;
pub mod flag;

pub use backend::{ComputeBackend, CpuBackend};
pub use buffers::{BufferArena, ComputeBuffer};
pub use flag::AsyncFlag;
