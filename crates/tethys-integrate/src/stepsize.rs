//! Adaptive step-size selection.
//!
//! The controller is a pure function of the current force state and the
//! previous step size: the per-particle force magnitudes (weighted by
//! inverse mass) give an acceleration RMS, the candidate step is the one
//! that would keep the induced position error at the configured
//! tolerance, and three clamps keep the sequence stable.

use glam::DVec3;
use tethys_compute::ComputeBackend;
use tethys_telemetry::StepSizeLimit;
use tethys_types::constants::{STEP_GROWTH_LIMIT, STEP_HYSTERESIS_BAND};
use tethys_types::TethysResult;

/// A step-size decision, with enough detail for telemetry.
#[derive(Debug, Clone, Copy)]
pub struct StepChoice {
    /// Step size adopted for the next step.
    pub selected: f64,
    /// Error-derived candidate before any clamping.
    pub raw_candidate: f64,
    /// Which rule bounded the candidate.
    pub limited_by: StepSizeLimit,
}

/// Selects the next step size from the current forces.
///
/// The error reduction runs through the backend so a device build uses
/// the same parallel reduction kernel as everything else. Clamps, in
/// order: growth cap at twice the previous size, hysteresis (candidates
/// less than 10% above the previous size keep it), hard ceiling.
pub fn select_step_size(
    backend: &dyn ComputeBackend,
    forces: &[DVec3],
    inv_masses: &[f64],
    previous: f64,
    error_tolerance: f64,
    max_step_size: f64,
) -> TethysResult<StepChoice> {
    let total = backend.force_error_sq_sum(forces, inv_masses)?;
    let rms = (total / (3.0 * forces.len() as f64)).sqrt();
    let raw_candidate = if rms > 0.0 {
        (error_tolerance / rms).sqrt()
    } else {
        f64::INFINITY
    };

    let mut selected = raw_candidate;
    let mut limited_by = StepSizeLimit::Unlimited;
    if previous > 0.0 && selected > STEP_GROWTH_LIMIT * previous {
        selected = STEP_GROWTH_LIMIT * previous;
        limited_by = StepSizeLimit::GrowthCap;
    }
    if previous > 0.0 && selected > previous && selected < STEP_HYSTERESIS_BAND * previous {
        selected = previous;
        limited_by = StepSizeLimit::Hysteresis;
    }
    if selected > max_step_size {
        selected = max_step_size;
        limited_by = StepSizeLimit::Ceiling;
    }
    Ok(StepChoice {
        selected,
        raw_candidate,
        limited_by,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tethys_compute::CpuBackend;

    const TOL: f64 = 1.0e-8;

    /// Builds a one-particle force vector whose error RMS produces
    /// exactly the requested raw candidate.
    fn forces_for_candidate(candidate: f64) -> Vec<DVec3> {
        // candidate = sqrt(tol / rms), rms = |f| / sqrt(3) for unit inverse
        // mass and one particle.
        let rms = TOL / (candidate * candidate);
        vec![DVec3::new(rms * 3.0_f64.sqrt(), 0.0, 0.0)]
    }

    #[test]
    fn candidate_matches_error_formula() {
        let backend = CpuBackend::new();
        let forces = forces_for_candidate(0.004);
        let choice =
            select_step_size(&backend, &forces, &[1.0], 0.01, TOL, 1.0).unwrap();
        assert!((choice.raw_candidate - 0.004).abs() < 1e-12);
        assert_eq!(choice.selected, choice.raw_candidate);
        assert_eq!(choice.limited_by, StepSizeLimit::Unlimited);
    }

    #[test]
    fn hysteresis_keeps_previous_size() {
        let backend = CpuBackend::new();
        // Candidate 5% above the previous size stays within the band.
        let forces = forces_for_candidate(0.00105);
        let choice =
            select_step_size(&backend, &forces, &[1.0], 0.001, TOL, 1.0).unwrap();
        assert_eq!(choice.selected, 0.001);
        assert_eq!(choice.limited_by, StepSizeLimit::Hysteresis);
    }

    #[test]
    fn growth_is_capped_at_twice_previous() {
        let backend = CpuBackend::new();
        let forces = forces_for_candidate(0.003);
        let choice =
            select_step_size(&backend, &forces, &[1.0], 0.001, TOL, 1.0).unwrap();
        assert!((choice.selected - 0.002).abs() < 1e-15);
        assert_eq!(choice.limited_by, StepSizeLimit::GrowthCap);
    }

    #[test]
    fn ceiling_binds_last() {
        let backend = CpuBackend::new();
        let forces = forces_for_candidate(10.0);
        let choice =
            select_step_size(&backend, &forces, &[1.0], 0.5, TOL, 0.004).unwrap();
        assert_eq!(choice.selected, 0.004);
        assert_eq!(choice.limited_by, StepSizeLimit::Ceiling);
    }

    #[test]
    fn zero_forces_select_the_ceiling() {
        let backend = CpuBackend::new();
        let forces = vec![DVec3::ZERO; 4];
        let choice = select_step_size(
            &backend,
            &forces,
            &[1.0, 1.0, 1.0, 1.0],
            0.0,
            TOL,
            0.01,
        )
        .unwrap();
        assert_eq!(choice.selected, 0.01);
        assert_eq!(choice.limited_by, StepSizeLimit::Ceiling);
    }

    #[test]
    fn shrinking_candidate_is_taken_directly() {
        let backend = CpuBackend::new();
        let forces = forces_for_candidate(0.0004);
        let choice =
            select_step_size(&backend, &forces, &[1.0], 0.001, TOL, 1.0).unwrap();
        assert!((choice.selected - 0.0004).abs() < 1e-12);
        assert_eq!(choice.limited_by, StepSizeLimit::Unlimited);
    }
}
