//! Dense LU factorization backed by `faer`.
//!
//! The iterative constraint solver needs the explicit inverse of its
//! coupling matrix so each iteration is a sparse matrix-vector product
//! rather than a triangular solve. The matrix is small (one row per
//! constraint in the largest irregular cluster group) and dense, so a
//! partial-pivot LU applied to identity columns is the whole job.

use faer::linalg::solvers::PartialPivLu;
use faer::prelude::SpSolver;
use faer::Mat;

/// Dense partial-pivot LU wrapper.
///
/// Factorizes once, then applies the inverse to as many right-hand sides
/// as needed. Row-major input to match the caller's matrix assembly.
pub struct DenseLu {
    factorization: PartialPivLu<f64>,
    dimension: usize,
}

impl DenseLu {
    /// Factorize an `n`×`n` matrix given in row-major order.
    ///
    /// Returns `None` for an empty matrix or a length mismatch; the
    /// factorization itself cannot fail (pivoting handles singularity by
    /// producing non-finite entries, which callers detect in the output).
    pub fn factorize(n: usize, row_major: &[f64]) -> Option<Self> {
        if n == 0 || row_major.len() != n * n {
            return None;
        }
        let mat = Mat::from_fn(n, n, |i, j| row_major[i * n + j]);
        Some(Self {
            factorization: PartialPivLu::new(mat.as_ref()),
            dimension: n,
        })
    }

    /// Matrix dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Solve `A x = b` using the cached factorization.
    pub fn solve(&self, rhs: &[f64], solution: &mut [f64]) {
        debug_assert_eq!(rhs.len(), self.dimension);
        debug_assert_eq!(solution.len(), self.dimension);
        let b = Mat::from_fn(self.dimension, 1, |i, _| rhs[i]);
        let x = self.factorization.solve(&b);
        for i in 0..self.dimension {
            solution[i] = x[(i, 0)];
        }
    }

    /// Compute the explicit inverse, row-major.
    ///
    /// Solves against identity columns; column `j` of the result is
    /// `A⁻¹ e_j`.
    pub fn inverse_row_major(&self) -> Vec<f64> {
        let n = self.dimension;
        let mut inverse = vec![0.0; n * n];
        let mut rhs = vec![0.0; n];
        let mut col = vec![0.0; n];
        for j in 0..n {
            rhs[j] = 1.0;
            self.solve(&rhs, &mut col);
            rhs[j] = 0.0;
            for i in 0..n {
                inverse[i * n + j] = col[i];
            }
        }
        inverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_identity() {
        let lu = DenseLu::factorize(3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        let mut x = [0.0; 3];
        lu.solve(&[3.0, -1.0, 2.0], &mut x);
        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!((x[1] + 1.0).abs() < 1e-12);
        assert!((x[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        let a = [2.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0];
        let lu = DenseLu::factorize(3, &a).unwrap();
        let inv = lu.inverse_row_major();
        for i in 0..3 {
            for j in 0..3 {
                let mut sum = 0.0;
                for k in 0..3 {
                    sum += inv[i * 3 + k] * a[k * 3 + j];
                }
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((sum - expected).abs() < 1e-10, "entry ({i},{j}) = {sum}");
            }
        }
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(DenseLu::factorize(0, &[]).is_none());
        assert!(DenseLu::factorize(2, &[1.0, 2.0, 3.0]).is_none());
    }
}
