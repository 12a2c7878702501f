//! Shared fixtures for unit tests.

use glam::{EulerRot, Mat4, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::compute::ComputeContext;
use crate::frame::CameraIntrinsics;

/// Small camera whose pixel count (4800) is divisible by 64.
pub(crate) fn camera() -> CameraIntrinsics {
    CameraIntrinsics::from_focal(80, 60, 60.0, 60.0, 39.5, 29.5)
}

pub(crate) fn compute_context() -> Option<ComputeContext> {
    match ComputeContext::new() {
        Ok(ctx) => Some(ctx),
        Err(_) => {
            eprintln!("Skipping GPU test: no GPU available");
            None
        }
    }
}

/// A generic pose inside the default synthetic room.
pub(crate) fn reference_pose() -> Mat4 {
    Mat4::from_rotation_translation(
        Quat::from_euler(EulerRot::XYZ, 0.02, 0.05, -0.01),
        Vec3::new(0.1, -0.05, 0.2),
    )
}

/// Applies a global-frame rotation (axis * angle) and translation to `pose`.
pub(crate) fn perturb(pose: &Mat4, rotation: Vec3, translation: Vec3) -> Mat4 {
    Mat4::from_translation(translation) * Mat4::from_quat(Quat::from_scaled_axis(rotation)) * *pose
}

/// Seeded small perturbations: rotation up to 0.02 rad, translation up to 0.01.
pub(crate) fn perturbations(seed: u64, count: usize) -> Vec<(Vec3, Vec3)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let axis = Vec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
            .normalize_or(Vec3::Y);
            let translation = Vec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
            .normalize_or(Vec3::X);
            (
                axis * rng.random_range(0.005..0.02),
                translation * rng.random_range(0.002..0.01),
            )
        })
        .collect()
}
