//! Closed-form solver for rigid isoceles triples.
//!
//! A triple cluster (one apex bonded to two equal-mass wings, wings bonded
//! to each other) admits an analytic projection: the corrected positions
//! are a rigid placement of the reference triangle sharing the proposed
//! center of mass, found through three rotation angles. No iteration, no
//! tolerance — the result satisfies the three distances to roundoff.

use glam::{DMat3, DVec3};
use tethys_types::constants::DEGENERATE_EPSILON;

/// Precomputed data for one analytic triple.
///
/// `ra`/`rb`/`rc` are the canonical triangle coordinates: the apex sits at
/// height `ra` above the center of mass, the wings at depth `rb` below it
/// and `±rc` to the side.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TripleCluster {
    pub apex: u32,
    pub wing_a: u32,
    pub wing_b: u32,
    pub mass_apex: f64,
    pub mass_wing: f64,
    pub ra: f64,
    pub rb: f64,
    pub rc: f64,
}

impl TripleCluster {
    /// Builds the canonical-frame geometry from bond lengths and masses.
    /// `leg` is the apex-wing distance, `base` the wing-wing distance.
    pub(crate) fn new(
        apex: u32,
        wing_a: u32,
        wing_b: u32,
        mass_apex: f64,
        mass_wing: f64,
        leg: f64,
        base: f64,
    ) -> Self {
        let rc = 0.5 * base;
        let height = (leg * leg - rc * rc).sqrt();
        let total = mass_apex + 2.0 * mass_wing;
        let ra = height * 2.0 * mass_wing / total;
        Self {
            apex,
            wing_a,
            wing_b,
            mass_apex,
            mass_wing,
            ra,
            rb: height - ra,
            rc,
        }
    }
}

/// Projects a proposed move of the triple back onto the constraint
/// manifold. `positions` holds the committed (constraint-satisfying)
/// positions; `deltas` the proposed displacements, corrected in place.
pub(crate) fn project_positions(cluster: &TripleCluster, positions: &[DVec3], deltas: &mut [DVec3]) {
    let (ia, ib, ic) = (
        cluster.apex as usize,
        cluster.wing_a as usize,
        cluster.wing_b as usize,
    );
    let apos0 = positions[ia];
    let apos1 = positions[ib];
    let apos2 = positions[ic];
    let xp0 = apos0 + deltas[ia];
    let xp1 = apos1 + deltas[ib];
    let xp2 = apos2 + deltas[ic];

    let (ma, mw) = (cluster.mass_apex, cluster.mass_wing);
    let inv_total = 1.0 / (ma + 2.0 * mw);
    let com = (xp0 * ma + xp1 * mw + xp2 * mw) * inv_total;

    // Old wing positions relative to the old apex; proposed positions
    // relative to the proposed center of mass.
    let xb0 = apos1 - apos0;
    let xc0 = apos2 - apos0;
    let xa1 = xp0 - com;
    let xb1 = xp1 - com;
    let xc1 = xp2 - com;

    // Frame: z along the old plane normal, x perpendicular to the
    // proposed apex offset so the apex lies in the yz-plane.
    let mut n0 = xb0.cross(xc0);
    let mut n1 = xa1.cross(n0);
    if n0.length_squared() < DEGENERATE_EPSILON || n1.length_squared() < DEGENERATE_EPSILON {
        // Collinear old triangle or apex moving along the normal; nothing
        // meaningful to rotate, leave the move untouched.
        return;
    }
    n0 = n0.normalize();
    n1 = n1.normalize();
    let n2 = n0.cross(n1);

    let frame = |v: DVec3| DVec3::new(n1.dot(v), n2.dot(v), n0.dot(v));
    let b0 = frame(xb0);
    let c0 = frame(xc0);
    let a1 = frame(xa1);
    let b1 = frame(xb1);
    let c1 = frame(xc1);

    let (ra, rb, rc) = (cluster.ra, cluster.rb, cluster.rc);

    // First two rotations tilt the canonical triangle so its out-of-plane
    // coordinates match the proposed ones.
    let sinphi = (a1.z / ra).clamp(-1.0, 1.0);
    let cosphi = (1.0 - sinphi * sinphi).sqrt();
    let sinpsi = ((b1.z - c1.z) / (2.0 * rc * cosphi)).clamp(-1.0, 1.0);
    let cospsi = (1.0 - sinpsi * sinpsi).sqrt();

    let ya2 = ra * cosphi;
    let xb2 = -rc * cospsi;
    let yb2 = -rb * cosphi - rc * sinpsi * sinphi;
    let yc2 = -rb * cosphi + rc * sinpsi * sinphi;

    // Third rotation, about the normal, restores the in-plane agreement
    // with the old triangle.
    let alpha = xb2 * (b0.x - c0.x) + b0.y * yb2 + c0.y * yc2;
    let beta = xb2 * (c0.y - b0.y) + b0.x * yb2 + c0.x * yc2;
    let gamma = b0.x * b1.y - b1.x * b0.y + c0.x * c1.y - c1.x * c0.y;
    let al2be2 = alpha * alpha + beta * beta;
    if al2be2 < DEGENERATE_EPSILON {
        return;
    }
    let under = (al2be2 - gamma * gamma).max(0.0);
    let sintheta = ((alpha * gamma - beta * under.sqrt()) / al2be2).clamp(-1.0, 1.0);
    let costheta = (1.0 - sintheta * sintheta).sqrt();

    let a3 = DVec3::new(-ya2 * sintheta, ya2 * costheta, a1.z);
    let b3 = DVec3::new(
        xb2 * costheta - yb2 * sintheta,
        xb2 * sintheta + yb2 * costheta,
        b1.z,
    );
    let c3 = DVec3::new(
        -xb2 * costheta - yc2 * sintheta,
        -xb2 * sintheta + yc2 * costheta,
        c1.z,
    );

    let unframe = |v: DVec3| com + n1 * v.x + n2 * v.y + n0 * v.z;
    deltas[ia] = unframe(a3) - apos0;
    deltas[ib] = unframe(b3) - apos1;
    deltas[ic] = unframe(c3) - apos2;
}

/// Removes the bond-direction components of the relative velocities with
/// a single 3×3 solve for the three constraint impulses.
pub(crate) fn project_velocities(
    cluster: &TripleCluster,
    positions: &[DVec3],
    velocities: &mut [DVec3],
) {
    let (ia, ib, ic) = (
        cluster.apex as usize,
        cluster.wing_a as usize,
        cluster.wing_b as usize,
    );
    let e_ab = positions[ib] - positions[ia];
    let e_bc = positions[ic] - positions[ib];
    let e_ca = positions[ia] - positions[ic];
    if e_ab.length_squared() < DEGENERATE_EPSILON
        || e_bc.length_squared() < DEGENERATE_EPSILON
        || e_ca.length_squared() < DEGENERATE_EPSILON
    {
        return;
    }
    let e_ab = e_ab.normalize();
    let e_bc = e_bc.normalize();
    let e_ca = e_ca.normalize();

    let inv_ma = 1.0 / cluster.mass_apex;
    let inv_mw = 1.0 / cluster.mass_wing;

    let vab = e_ab.dot(velocities[ib] - velocities[ia]);
    let vbc = e_bc.dot(velocities[ic] - velocities[ib]);
    let vca = e_ca.dot(velocities[ia] - velocities[ic]);

    // Impulses τ along each bond; rows demand zero relative velocity
    // along the bond after the correction is applied.
    let matrix = DMat3::from_cols(
        DVec3::new(
            inv_ma + inv_mw,
            -e_bc.dot(e_ab) * inv_mw,
            -e_ca.dot(e_ab) * inv_ma,
        ),
        DVec3::new(
            -e_ab.dot(e_bc) * inv_mw,
            inv_mw + inv_mw,
            -e_ca.dot(e_bc) * inv_mw,
        ),
        DVec3::new(
            -e_ab.dot(e_ca) * inv_ma,
            -e_bc.dot(e_ca) * inv_mw,
            inv_ma + inv_mw,
        ),
    );
    if matrix.determinant().abs() < DEGENERATE_EPSILON {
        return;
    }
    let tau = matrix.inverse() * DVec3::new(vab, vbc, vca);

    velocities[ia] += (e_ab * tau.x - e_ca * tau.z) * inv_ma;
    velocities[ib] += (e_bc * tau.y - e_ab * tau.x) * inv_mw;
    velocities[ic] += (e_ca * tau.z - e_bc * tau.y) * inv_mw;
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEG: f64 = 0.09572;
    const BASE: f64 = 0.15139;
    const M_APEX: f64 = 15.999;
    const M_WING: f64 = 1.008;

    fn cluster() -> TripleCluster {
        TripleCluster::new(0, 1, 2, M_APEX, M_WING, LEG, BASE)
    }

    fn reference_positions() -> Vec<DVec3> {
        let rc = 0.5 * BASE;
        let h = (LEG * LEG - rc * rc).sqrt();
        vec![
            DVec3::new(0.3, 0.2, -0.1),
            DVec3::new(0.3 - rc, 0.2 - h, -0.1),
            DVec3::new(0.3 + rc, 0.2 - h, -0.1),
        ]
    }

    fn distances(points: &[DVec3]) -> (f64, f64, f64) {
        (
            points[0].distance(points[1]),
            points[0].distance(points[2]),
            points[1].distance(points[2]),
        )
    }

    #[test]
    fn canonical_geometry_balances_masses() {
        let c = cluster();
        // Apex and wings balance about the center of mass.
        assert!((c.mass_apex * c.ra - 2.0 * c.mass_wing * c.rb).abs() < 1e-12);
        let leg = (c.rc * c.rc + (c.ra + c.rb) * (c.ra + c.rb)).sqrt();
        assert!((leg - LEG).abs() < 1e-12);
    }

    #[test]
    fn projection_restores_all_three_distances() {
        let positions = reference_positions();
        let mut deltas = vec![
            DVec3::new(0.004, -0.002, 0.003),
            DVec3::new(-0.003, 0.005, -0.001),
            DVec3::new(0.001, 0.002, 0.004),
        ];
        project_positions(&cluster(), &positions, &mut deltas);
        let corrected: Vec<DVec3> = positions
            .iter()
            .zip(&deltas)
            .map(|(p, d)| *p + *d)
            .collect();
        let (dab, dac, dbc) = distances(&corrected);
        assert!((dab - LEG).abs() < 1e-9, "apex-wing-a distance {dab}");
        assert!((dac - LEG).abs() < 1e-9, "apex-wing-b distance {dac}");
        assert!((dbc - BASE).abs() < 1e-9, "wing-wing distance {dbc}");
    }

    #[test]
    fn projection_preserves_center_of_mass() {
        let positions = reference_positions();
        let mut deltas = vec![
            DVec3::new(0.002, 0.001, -0.003),
            DVec3::new(-0.001, 0.004, 0.002),
            DVec3::new(0.003, -0.002, 0.001),
        ];
        let com_before = (positions[0] + deltas[0]) * M_APEX
            + (positions[1] + deltas[1]) * M_WING
            + (positions[2] + deltas[2]) * M_WING;
        project_positions(&cluster(), &positions, &mut deltas);
        let com_after = (positions[0] + deltas[0]) * M_APEX
            + (positions[1] + deltas[1]) * M_WING
            + (positions[2] + deltas[2]) * M_WING;
        assert!(com_before.distance(com_after) < 1e-10);
    }

    #[test]
    fn zero_move_is_a_fixed_point() {
        let positions = reference_positions();
        let mut deltas = vec![DVec3::ZERO; 3];
        project_positions(&cluster(), &positions, &mut deltas);
        for d in &deltas {
            assert!(d.length() < 1e-10, "residual correction {d}");
        }
    }

    #[test]
    fn velocity_projection_zeroes_bond_rates() {
        let positions = reference_positions();
        let mut velocities = vec![
            DVec3::new(0.5, -0.3, 0.2),
            DVec3::new(-0.4, 0.6, -0.1),
            DVec3::new(0.2, 0.1, 0.7),
        ];
        project_velocities(&cluster(), &positions, &mut velocities);
        for (i, j) in [(0usize, 1usize), (0, 2), (1, 2)] {
            let e = (positions[j] - positions[i]).normalize();
            let rate = e.dot(velocities[j] - velocities[i]);
            assert!(rate.abs() < 1e-10, "bond ({i},{j}) rate {rate}");
        }
    }

    #[test]
    fn velocity_projection_preserves_momentum() {
        let positions = reference_positions();
        let mut velocities = vec![
            DVec3::new(0.5, -0.3, 0.2),
            DVec3::new(-0.4, 0.6, -0.1),
            DVec3::new(0.2, 0.1, 0.7),
        ];
        let p_before =
            velocities[0] * M_APEX + velocities[1] * M_WING + velocities[2] * M_WING;
        project_velocities(&cluster(), &positions, &mut velocities);
        let p_after =
            velocities[0] * M_APEX + velocities[1] * M_WING + velocities[2] * M_WING;
        assert!(p_before.distance(p_after) < 1e-10);
    }
}
