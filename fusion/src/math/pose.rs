//! Rigid-transform helpers shared by the pose estimators.

use glam::{DMat3, DMat4, DVec3, DVec4, Mat4};
use nalgebra::Vector6;

/// Small-angle rigid increment for `x = (alpha, beta, gamma, tx, ty, tz)`:
///
/// ```text
/// |  1  -g   b  tx |
/// |  g   1  -a  ty |
/// | -b   a   1  tz |
/// |  0   0   0   1 |
/// ```
pub fn increment(x: &Vector6<f64>) -> DMat4 {
    let (alpha, beta, gamma) = (x[0], x[1], x[2]);
    let (tx, ty, tz) = (x[3], x[4], x[5]);
    DMat4::from_cols(
        DVec4::new(1.0, gamma, -beta, 0.0),
        DVec4::new(-gamma, 1.0, alpha, 0.0),
        DVec4::new(beta, -alpha, 1.0, 0.0),
        DVec4::new(tx, ty, tz, 1.0),
    )
}

/// Restores an orthonormal rotation block (Gram-Schmidt, x axis first),
/// keeping the translation.
pub fn orthonormalize(m: DMat4) -> DMat4 {
    let x = m.x_axis.truncate().normalize();
    let y = m.y_axis.truncate();
    let y = (y - x * x.dot(y)).normalize();
    let z = x.cross(y);
    DMat4::from_cols(
        x.extend(0.0),
        y.extend(0.0),
        z.extend(0.0),
        m.w_axis,
    )
}

/// Rotation part of a homogeneous transform.
pub fn rotation(m: &DMat4) -> DMat3 {
    DMat3::from_cols(
        m.x_axis.truncate(),
        m.y_axis.truncate(),
        m.z_axis.truncate(),
    )
}

/// Whether the rotation block of `m` is orthonormal with determinant +1 and
/// the last row is `[0, 0, 0, 1]`.
pub fn is_rigid(m: &Mat4, tolerance: f32) -> bool {
    let m = m.as_dmat4();
    let r = rotation(&m);
    let identity_error = (r.transpose() * r - DMat3::IDENTITY)
        .to_cols_array()
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let bottom = m.row(3);

    identity_error <= tolerance as f64
        && (r.determinant() - 1.0).abs() <= tolerance as f64
        && bottom.truncate().abs().max_element() <= tolerance as f64
        && (bottom.w - 1.0).abs() <= tolerance as f64
}

/// Projects a camera-space point through `k` to the nearest pixel of a
/// `width` x `height` frame, returning its row-major index.
///
/// Points on or behind the image plane and pixels outside the frame yield
/// `None`. Halves round up.
pub fn project(k: &DMat3, point: DVec3, width: usize, height: usize) -> Option<usize> {
    let h = *k * point;
    if !(h.z > 0.0) {
        return None;
    }

    let u = (h.x / h.z + 0.5).floor();
    let v = (h.y / h.z + 0.5).floor();
    if !(u >= 0.0 && v >= 0.0 && u < width as f64 && v < height as f64) {
        return None;
    }

    Some(v as usize * width + u as usize)
}

/// Largest absolute element-wise difference between two transforms.
pub fn max_difference(a: &Mat4, b: &Mat4) -> f32 {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .fold(0.0f32, |acc, (x, y)| acc.max((x - y).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_increment_layout() {
        let m = increment(&Vector6::new(0.1, 0.2, 0.3, 1.0, 2.0, 3.0));
        assert_eq!(m.row(0), DVec4::new(1.0, -0.3, 0.2, 1.0));
        assert_eq!(m.row(1), DVec4::new(0.3, 1.0, -0.1, 2.0));
        assert_eq!(m.row(2), DVec4::new(-0.2, 0.1, 1.0, 3.0));
        assert_eq!(m.row(3), DVec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_orthonormalize_restores_rotation() {
        let skewed = increment(&Vector6::new(0.05, -0.02, 0.03, 0.5, 0.0, -1.0))
            * DMat4::from_rotation_y(0.4);
        assert!(!is_rigid(&skewed.as_mat4(), 1e-6));

        let fixed = orthonormalize(skewed);
        assert!(is_rigid(&fixed.as_mat4(), 1e-6));
        assert_eq!(fixed.w_axis, skewed.w_axis);
    }

    #[test]
    fn test_orthonormalize_keeps_rigid_transform() {
        let rigid = DMat4::from_rotation_translation(
            glam::DQuat::from_euler(glam::EulerRot::XYZ, 0.3, -0.2, 1.1),
            DVec3::new(1.0, 2.0, 3.0),
        );
        let fixed = orthonormalize(rigid);
        assert!(max_difference(&fixed.as_mat4(), &rigid.as_mat4()) < 1e-6);
    }

    #[test]
    fn test_project() {
        let k = DMat3::from_cols(
            DVec3::new(100.0, 0.0, 0.0),
            DVec3::new(0.0, 100.0, 0.0),
            DVec3::new(32.0, 24.0, 1.0),
        );

        assert_eq!(project(&k, DVec3::new(0.0, 0.0, 1.0), 64, 48), Some(24 * 64 + 32));
        assert_eq!(project(&k, DVec3::new(0.0, 0.0, -1.0), 64, 48), None);
        assert_eq!(project(&k, DVec3::new(1.0, 0.0, 1.0), 64, 48), None);
        assert_eq!(project(&k, DVec3::new(f64::NAN, 0.0, 1.0), 64, 48), None);
        // 0.005 * 100 = 0.5 rounds up
        assert_eq!(
            project(&k, DVec3::new(0.005, 0.0, 1.0), 64, 48),
            Some(24 * 64 + 33)
        );
    }

    #[test]
    fn test_is_rigid_rejects_scale() {
        let scaled = Mat4::from_scale(Vec3::splat(1.01));
        assert!(!is_rigid(&scaled, 1e-4));
        assert!(is_rigid(&Mat4::IDENTITY, 1e-6));
    }
}
