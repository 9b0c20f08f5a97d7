//! Compute backend trait and CPU reference implementation.
//!
//! The [`ComputeBackend`] trait defines the interface for dispatching
//! the data-parallel primitives the integration layer needs. The
//! [`CpuBackend`] implementation executes sequentially on CPU, serving
//! as the reference for correctness; a device backend submits the same
//! operations as kernels into one FIFO queue per simulation context.

use glam::DVec3;
use tethys_types::{TethysError, TethysResult};

/// Trait for compute backends.
///
/// All operations on one backend execute in issue order; the host does
/// not block after an operation unless it consumes a scalar result.
///
/// # Implementations
/// - [`CpuBackend`] — sequential CPU reference (always available)
pub trait ComputeBackend: Send {
    /// Initialize the backend. Called once at context creation.
    fn init(&mut self) -> TethysResult<()>;

    /// Returns the backend name (e.g., "cpu").
    fn name(&self) -> &str;

    /// Returns true if the backend dispatches to a device.
    fn is_gpu(&self) -> bool;

    /// Parallel reduction of `Σ |f_i|² · w_i²` over all particles.
    ///
    /// This is the force-magnitude error sum behind adaptive step-size
    /// selection; `w` is the per-particle inverse mass.
    fn force_error_sq_sum(&self, forces: &[DVec3], inv_mass: &[f64]) -> TethysResult<f64>;
}

/// CPU backend — sequential reference implementation.
///
/// Always available, used for:
/// - Platforms without device support
/// - Correctness validation (device results should match CPU)
/// - Small systems where dispatch overhead isn't worthwhile
#[derive(Debug, Default)]
pub struct CpuBackend {
    initialized: bool,
}

impl CpuBackend {
    /// Creates a new CPU backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComputeBackend for CpuBackend {
    fn init(&mut self) -> TethysResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "cpu"
    }

    fn is_gpu(&self) -> bool {
        false
    }

    fn force_error_sq_sum(&self, forces: &[DVec3], inv_mass: &[f64]) -> TethysResult<f64> {
        if forces.len() != inv_mass.len() {
            return Err(TethysError::Device {
                context: "force_error_sq_sum".into(),
                status: "buffer length mismatch".into(),
            });
        }
        let mut sum = 0.0;
        for (f, &w) in forces.iter().zip(inv_mass) {
            sum += f.length_squared() * w * w;
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_length_mismatch_is_a_device_error() {
        let backend = CpuBackend::new();
        let forces = vec![DVec3::ZERO; 2];
        assert!(backend.force_error_sq_sum(&forces, &[1.0]).is_err());
    }

    #[test]
    fn force_error_reduction() {
        let backend = CpuBackend::new();
        let forces = vec![DVec3::new(3.0, 4.0, 0.0), DVec3::ZERO];
        let inv_mass = vec![2.0, 1.0];
        // |f0|² = 25, w0² = 4 → 100; second particle contributes 0.
        let sum = backend.force_error_sq_sum(&forces, &inv_mass).unwrap();
        assert!((sum - 100.0).abs() < 1e-12);
    }
}
