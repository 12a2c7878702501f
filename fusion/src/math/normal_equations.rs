//! Point-to-plane normal equations for a 6-DOF rigid increment.

use glam::DVec3;
use nalgebra::{Matrix6, Vector6};

/// Degrees of freedom of a rigid increment: three rotations, three translations.
pub const DOF: usize = 6;

/// Floats in a packed system: the 21 upper-triangular entries of `A`
/// (row-major) followed by the 6 entries of `b`.
pub const PACKED_LEN: usize = 27;

/// Accumulator for `A x = b` over accepted correspondences.
///
/// Only the upper triangle of `A` is accumulated; it is mirrored on solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalEquations {
    a: Matrix6<f64>,
    b: Vector6<f64>,
    count: usize,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self {
            a: Matrix6::zeros(),
            b: Vector6::zeros(),
            count: 0,
        }
    }
}

impl NormalEquations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the linearised residual of `point` (global space) against the
    /// plane through `target` with unit `normal`.
    pub fn add(&mut self, point: DVec3, target: DVec3, normal: DVec3) {
        let c = point.cross(normal);
        let j = Vector6::new(c.x, c.y, c.z, normal.x, normal.y, normal.z);
        let residual = (point - target).dot(normal);

        for row in 0..DOF {
            for col in row..DOF {
                self.a[(row, col)] += j[row] * j[col];
            }
        }
        self.b -= j * residual;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &NormalEquations) {
        self.a += other.a;
        self.b += other.b;
        self.count += other.count;
    }

    /// Rebuilds a system from its packed form, e.g. a device reduction result.
    pub fn from_packed(packed: &[f32; PACKED_LEN], count: usize) -> Self {
        let mut system = Self {
            count,
            ..Self::default()
        };
        let mut index = 0;
        for row in 0..DOF {
            for col in row..DOF {
                system.a[(row, col)] = packed[index] as f64;
                index += 1;
            }
        }
        for (b, value) in system.b.iter_mut().zip(&packed[index..]) {
            *b = *value as f64;
        }
        system
    }

    pub fn to_packed(&self) -> [f32; PACKED_LEN] {
        let mut packed = [0.0f32; PACKED_LEN];
        let mut index = 0;
        for row in 0..DOF {
            for col in row..DOF {
                packed[index] = self.a[(row, col)] as f32;
                index += 1;
            }
        }
        for (dst, b) in packed[index..].iter_mut().zip(self.b.iter()) {
            *dst = *b as f32;
        }
        packed
    }

    /// Number of correspondences accumulated.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Full symmetric `A`.
    pub fn matrix(&self) -> Matrix6<f64> {
        Matrix6::from_fn(|row, col| {
            if row <= col {
                self.a[(row, col)]
            } else {
                self.a[(col, row)]
            }
        })
    }

    pub fn rhs(&self) -> Vector6<f64> {
        self.b
    }

    /// Solves for `x = (alpha, beta, gamma, tx, ty, tz)`.
    pub fn solve(&self) -> Vector6<f64> {
        solve_symmetric(&self.matrix(), &self.b)
    }
}

/// Solves a symmetric positive semi-definite 6x6 system.
///
/// Uses Cholesky when every pivot stays above `EPSILON` relative to the
/// largest diagonal entry, and an SVD pseudo-inverse with the same
/// tolerance otherwise. Directions the system does not constrain get a zero
/// update, so a rank-deficient system yields a finite solution.
pub fn solve_symmetric(a: &Matrix6<f64>, b: &Vector6<f64>) -> Vector6<f64> {
    let scale = a.diagonal().max();
    if !scale.is_finite() || scale <= 0.0 {
        return Vector6::zeros();
    }
    let tolerance = scale * common::EPSILON;

    if let Some(cholesky) = a.cholesky() {
        let smallest_pivot = cholesky.l_dirty().diagonal().min();
        if smallest_pivot * smallest_pivot > tolerance {
            return cholesky.solve(b);
        }
    }

    a.svd(true, true)
        .solve(b, tolerance)
        .unwrap_or_else(|_| Vector6::zeros())
}

/// True when `matrix` admits a Cholesky factorisation.
pub fn is_positive_definite(matrix: &Matrix6<f64>) -> bool {
    matrix.cholesky().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd() -> Matrix6<f64> {
        // M^T M + I for a fixed, well-mixed M
        let m = Matrix6::from_fn(|r, c| {
            ((r * 7 + c * 3) % 11) as f64 - 5.0 + if r == c { 4.0 } else { 0.0 }
        });
        m.transpose() * m + Matrix6::identity()
    }

    #[test]
    fn test_identity_system() {
        let b = Vector6::new(1.0, -2.0, 3.0, -4.0, 5.0, -6.0);
        assert_eq!(solve_symmetric(&Matrix6::identity(), &b), b);
    }

    #[test]
    fn test_spd_system_residual() {
        let a = spd();
        assert!(is_positive_definite(&a));
        let expected = Vector6::new(0.3, -0.1, 0.7, 2.0, -1.5, 0.25);
        let b = a * expected;

        let x = solve_symmetric(&a, &b);
        for (got, want) in x.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_rank_deficient_system_is_finite() {
        // Only x, y translation constrained
        let mut a = Matrix6::zeros();
        a[(3, 3)] = 2.0;
        a[(4, 4)] = 4.0;
        let b = Vector6::new(0.0, 0.0, 0.0, 1.0, 2.0, 0.0);
        assert!(!is_positive_definite(&a));

        let x = solve_symmetric(&a, &b);
        assert!(x.iter().all(|v| v.is_finite()));
        assert!((x[3] - 0.5).abs() < 1e-12);
        assert!((x[4] - 0.5).abs() < 1e-12);
        for i in [0, 1, 2, 5] {
            assert!(x[i].abs() < 1e-12, "x[{}] = {}", i, x[i]);
        }
    }

    #[test]
    fn test_near_singular_direction_gets_no_update() {
        // Cholesky succeeds, but the last pivot is far below tolerance.
        let a = Matrix6::from_diagonal(&Vector6::new(1.0, 1.0, 1.0, 1.0, 1.0, 1e-20));
        assert!(is_positive_definite(&a));
        let b = Vector6::new(1.0, 1.0, 1.0, 1.0, 1.0, 1.0);

        let x = solve_symmetric(&a, &b);
        for i in 0..5 {
            assert!((x[i] - 1.0).abs() < 1e-12);
        }
        assert!(x[5].abs() < 1e-12, "x[5] = {}", x[5]);
    }

    #[test]
    fn test_zero_system_gives_zero_update() {
        assert_eq!(
            solve_symmetric(&Matrix6::zeros(), &Vector6::repeat(1.0)),
            Vector6::zeros()
        );
    }

    #[test]
    fn test_accumulated_translation_offset() {
        // Three orthogonal planes, points displaced by +0.1 along every normal
        let normals = [DVec3::X, DVec3::Y, DVec3::Z];
        let mut system = NormalEquations::new();
        for normal in normals {
            for i in 0..4 {
                let offset = DVec3::new(i as f64, (i * i) as f64, 1.0 - i as f64) * 0.3;
                let target = offset - offset.dot(normal) * normal + normal;
                let point = target + normal * 0.1;
                system.add(point, target, normal);
            }
        }
        assert_eq!(system.count(), 12);

        let x = system.solve();
        for (i, value) in x.iter().enumerate() {
            let expected = if i >= 3 { -0.1 } else { 0.0 };
            assert!((value - expected).abs() < 1e-9, "x[{}] = {}", i, value);
        }
    }

    #[test]
    fn test_packed_layout_matches_accumulation() {
        let mut system = NormalEquations::new();
        system.add(
            DVec3::new(0.5, -0.25, 2.0),
            DVec3::new(0.5, -0.25, 1.75),
            DVec3::new(0.0, 0.0, -1.0),
        );
        let restored = NormalEquations::from_packed(&system.to_packed(), system.count());
        assert!((system.matrix() - restored.matrix()).abs().max() < 1e-6);
        assert!((system.rhs() - restored.rhs()).abs().max() < 1e-6);
        assert_eq!(restored.matrix(), restored.matrix().transpose());
        assert_eq!(restored.count(), 1);
    }

    #[test]
    fn test_merge_is_additive() {
        let mut left = NormalEquations::new();
        let mut right = NormalEquations::new();
        let mut both = NormalEquations::new();
        let samples = [
            (DVec3::new(0.1, 0.2, 1.0), DVec3::new(0.1, 0.2, 1.1), DVec3::Z),
            (DVec3::new(1.0, 0.3, 0.5), DVec3::new(0.9, 0.3, 0.5), DVec3::X),
        ];
        left.add(samples[0].0, samples[0].1, samples[0].2);
        right.add(samples[1].0, samples[1].1, samples[1].2);
        for (p, q, n) in samples {
            both.add(p, q, n);
        }
        left.merge(&right);
        assert_eq!(left, both);
    }
}
