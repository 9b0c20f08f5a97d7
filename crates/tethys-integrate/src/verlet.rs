//! Two-phase velocity-Verlet update.
//!
//! The position update is split so constraint projection can run between
//! the phases: phase 1 advances velocities a half step and stores the
//! proposed displacement without touching positions; phase 2 commits the
//! (possibly corrected) displacement and recomputes the velocity from
//! what was actually applied, so constraint corrections are exactly
//! reflected in the reported velocity.

use tethys_types::ScalarEncoder;

use crate::state::ParticleState;

/// Phase 1: half-step velocity kick and proposed displacement.
///
/// `dt_prev` is the size of the last committed step (zero before the
/// first), `dt_pos` the size of this one; the velocity half-step spans
/// their average, which is what keeps the scheme time-symmetric across a
/// step-size change.
pub fn predict(state: &mut ParticleState, dt_prev: f64, dt_pos: f64) {
    let dt_vel = 0.5 * (dt_prev + dt_pos);
    for i in 0..state.particle_count() {
        let inv_m = state.inv_masses[i];
        if inv_m == 0.0 {
            state.pos_delta[i] = glam::DVec3::ZERO;
            continue;
        }
        state.velocities[i] += state.forces[i] * (dt_vel * inv_m);
        state.pos_delta[i] = state.velocities[i] * dt_pos;
    }
}

/// Phase 2: apply the displacement and derive the velocity from it.
///
/// When positions are stored narrower than f64, the reciprocal `1/dt`
/// the device multiplies by is itself narrowed; a first-order term
/// `(1 - dt·inv_dt)/dt` compensates that round-off so the recovered
/// velocity stays consistent with the applied displacement.
pub fn commit(state: &mut ParticleState, dt_pos: f64, encoder: &ScalarEncoder) {
    let inv_dt = if encoder.mode().needs_reciprocal_correction() {
        encoder.narrow(1.0 / dt_pos)
    } else {
        1.0 / dt_pos
    };
    let correction = if encoder.mode().needs_reciprocal_correction() {
        (1.0 - dt_pos * inv_dt) / dt_pos
    } else {
        0.0
    };
    for i in 0..state.particle_count() {
        if state.inv_masses[i] == 0.0 {
            continue;
        }
        let delta = state.pos_delta[i];
        state.positions[i] += delta;
        state.velocities[i] = delta * inv_dt + delta * correction;
        state.pos_delta[i] = glam::DVec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use tethys_types::PrecisionMode;

    #[test]
    fn predict_stores_delta_without_moving() {
        let mut state =
            ParticleState::new(vec![2.0], vec![DVec3::new(1.0, 0.0, 0.0)]).unwrap();
        state.velocities[0] = DVec3::new(0.0, 3.0, 0.0);
        state.forces[0] = DVec3::new(4.0, 0.0, 0.0);
        predict(&mut state, 0.0, 0.1);

        // Half-step kick over 0.5*(0+0.1) with inv_m = 0.5.
        assert!((state.velocities[0].x - 0.1).abs() < 1e-12);
        assert_eq!(state.positions[0], DVec3::new(1.0, 0.0, 0.0));
        assert!((state.pos_delta[0].y - 0.3).abs() < 1e-12);
    }

    #[test]
    fn commit_reflects_projected_delta_in_velocity() {
        let mut state = ParticleState::new(vec![1.0], vec![DVec3::ZERO]).unwrap();
        // Pretend a projection replaced the proposed delta.
        state.pos_delta[0] = DVec3::new(0.05, -0.02, 0.0);
        let encoder = PrecisionMode::Double.encoder();
        commit(&mut state, 0.1, &encoder);
        assert!(state.positions[0].distance(DVec3::new(0.05, -0.02, 0.0)) < 1e-15);
        assert!(state.velocities[0].distance(DVec3::new(0.5, -0.2, 0.0)) < 1e-12);
        assert_eq!(state.pos_delta[0], DVec3::ZERO);
    }

    #[test]
    fn immobile_particles_never_move() {
        let mut state = ParticleState::new(vec![0.0], vec![DVec3::X]).unwrap();
        state.forces[0] = DVec3::new(100.0, 0.0, 0.0);
        predict(&mut state, 0.1, 0.1);
        let encoder = PrecisionMode::Double.encoder();
        commit(&mut state, 0.1, &encoder);
        assert_eq!(state.positions[0], DVec3::X);
        assert_eq!(state.velocities[0], DVec3::ZERO);
    }

    #[test]
    fn narrow_reciprocal_correction_recovers_velocity() {
        let dt = 0.002_f64; // 1/dt not representable in f32
        let delta = DVec3::new(0.01, 0.0, 0.0);
        let mut narrow_state = ParticleState::new(vec![1.0], vec![DVec3::ZERO]).unwrap();
        narrow_state.pos_delta[0] = delta;
        let encoder = PrecisionMode::Single.encoder();
        commit(&mut narrow_state, dt, &encoder);

        let exact = delta / dt;
        // First-order correction leaves only a second-order residue.
        assert!(
            (narrow_state.velocities[0].x - exact.x).abs() / exact.x < 1e-10,
            "recovered {} vs exact {}",
            narrow_state.velocities[0].x,
            exact.x
        );
    }
}
