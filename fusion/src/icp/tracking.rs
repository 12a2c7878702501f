use glam::{DMat3, DMat4, DVec3, Mat4};
use log::{debug, warn};

use crate::common::{Error, RejectionCounts, Result, TrackingLost};
use crate::frame::{CameraIntrinsics, PointNormal};
use crate::icp::IcpConfig;
use crate::math::{pose, NormalEquations};

/// Correspondences needed to constrain all six degrees of freedom.
pub const MIN_CORRESPONDENCES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    Invalid,
    OutOfBounds,
    Distance,
    Angle,
}

pub(crate) fn record(counts: &mut RejectionCounts, rejection: Rejection) {
    match rejection {
        Rejection::Invalid => counts.invalid += 1,
        Rejection::OutOfBounds => counts.out_of_bounds += 1,
        Rejection::Distance => counts.distance += 1,
        Rejection::Angle => counts.angle += 1,
    }
}

/// An accepted correspondence, everything in global space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Correspondence {
    pub point: DVec3,
    pub target: DVec3,
    pub normal: DVec3,
}

/// Transforms and thresholds for one ICP iteration.
#[derive(Debug, Clone)]
pub(crate) struct IterationFrame {
    /// Current camera to previous camera.
    pub to_previous: DMat4,
    /// Current camera to global (the running estimate).
    pub to_global: DMat4,
    pub k: DMat3,
    pub width: usize,
    pub height: usize,
    pub epsilon_distance: f64,
    pub epsilon_angle: f64,
    rotation: DMat3,
}

impl IterationFrame {
    pub fn new(
        config: &IcpConfig,
        camera: &CameraIntrinsics,
        to_previous: DMat4,
        to_global: DMat4,
    ) -> Self {
        Self {
            to_previous,
            to_global,
            k: camera.k.as_dmat3(),
            width: camera.width,
            height: camera.height,
            epsilon_distance: config.epsilon_distance as f64,
            epsilon_angle: config.epsilon_angle as f64,
            rotation: pose::rotation(&to_global),
        }
    }

    /// Projective data association of one current-map pixel against the
    /// previous predicted map.
    pub fn associate(
        &self,
        current: &PointNormal,
        previous: &[PointNormal],
    ) -> std::result::Result<Correspondence, Rejection> {
        let vertex = current.vertex().as_dvec3();
        let normal = current.normal().as_dvec3();
        if !(vertex.is_finite() && normal.is_finite()) {
            return Err(Rejection::Invalid);
        }

        let index = pose::project(
            &self.k,
            self.to_previous.transform_point3(vertex),
            self.width,
            self.height,
        )
        .ok_or(Rejection::OutOfBounds)?;

        let predicted = &previous[index];
        let target = predicted.vertex().as_dvec3();
        let target_normal = predicted.normal().as_dvec3();
        if !(target.is_finite() && target_normal.is_finite()) {
            return Err(Rejection::Invalid);
        }

        let point = self.to_global.transform_point3(vertex);
        if point.distance(target) > self.epsilon_distance {
            return Err(Rejection::Distance);
        }

        let rotated = self.rotation * normal;
        if rotated.cross(target_normal).length() > self.epsilon_angle {
            return Err(Rejection::Angle);
        }

        Ok(Correspondence {
            point,
            target,
            normal: target_normal,
        })
    }
}

/// When an iteration has too few correspondences to continue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Acceptance {
    pub min_accepted: usize,
    pub max_rejected: Option<usize>,
}

impl Acceptance {
    pub fn host() -> Self {
        Self {
            min_accepted: MIN_CORRESPONDENCES,
            max_rejected: None,
        }
    }

    /// Ceiling of `ratio * pixel_count` rejected pixels on top of the DOF minimum.
    pub fn with_rejection_ratio(ratio: Option<f32>, pixel_count: usize) -> Self {
        Self {
            min_accepted: MIN_CORRESPONDENCES,
            max_rejected: ratio.map(|r| (r as f64 * pixel_count as f64).floor() as usize),
        }
    }

    pub fn check(
        &self,
        iteration: usize,
        accepted: usize,
        rejected: &RejectionCounts,
    ) -> Result<()> {
        let total = accepted + rejected.total();
        let required = match self.max_rejected {
            Some(max_rejected) => self
                .min_accepted
                .max(total.saturating_sub(max_rejected)),
            None => self.min_accepted,
        };

        if accepted < required {
            let info = TrackingLost {
                iteration,
                accepted,
                required,
                rejected: *rejected,
            };
            warn!("Tracking lost: {}", info);
            return Err(Error::TrackingLost(info));
        }
        Ok(())
    }
}

/// Runs the fixed ICP iteration count seeded from `previous_pose`.
///
/// `accumulate` builds the normal equations for one iteration; each
/// solution is composed on the left of the running estimate, which is then
/// re-orthonormalised.
pub(crate) fn iterate<F>(
    config: &IcpConfig,
    camera: &CameraIntrinsics,
    previous_pose: &Mat4,
    acceptance: &Acceptance,
    mut accumulate: F,
) -> Result<Mat4>
where
    F: FnMut(&IterationFrame) -> Result<(NormalEquations, RejectionCounts)>,
{
    let previous_pose = previous_pose.as_dmat4();
    let previous_inverse = previous_pose.inverse();
    let mut estimate = previous_pose;

    for iteration in 0..config.iterations {
        let frame = IterationFrame::new(config, camera, previous_inverse * estimate, estimate);
        let (system, rejected) = accumulate(&frame)?;
        acceptance.check(iteration, system.count(), &rejected)?;

        let x = system.solve();
        estimate = pose::orthonormalize(pose::increment(&x) * estimate);

        debug!(
            "ICP iteration {}: {} accepted, {} rejected, update {:?}",
            iteration,
            system.count(),
            rejected.total(),
            x
        );
    }

    Ok(estimate.as_mat4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat3, Vec3};

    fn frame(to_global: DMat4) -> IterationFrame {
        let camera = CameraIntrinsics::new(
            3,
            1,
            Mat3::from_cols(Vec3::X, Vec3::Y, Vec3::new(1.0, 0.0, 1.0)),
        );
        IterationFrame::new(&IcpConfig::default(), &camera, DMat4::IDENTITY, to_global)
    }

    #[test]
    fn test_rejection_reasons() {
        let f = frame(DMat4::IDENTITY);
        let previous = [
            PointNormal::INVALID,
            PointNormal::new(Vec3::new(0.0, 0.0, 1.0), Vec3::NEG_Z),
            PointNormal::new(Vec3::new(1.0, 0.0, 1.0), Vec3::NEG_X),
        ];

        let on_axis = PointNormal::new(Vec3::new(0.0, 0.0, 1.0), Vec3::NEG_Z);
        assert!(f.associate(&on_axis, &previous).is_ok());

        assert_eq!(
            f.associate(&PointNormal::INVALID, &previous).unwrap_err(),
            Rejection::Invalid
        );

        // projects onto the NaN pixel
        let left = PointNormal::new(Vec3::new(-1.0, 0.0, 1.0), Vec3::NEG_Z);
        assert_eq!(f.associate(&left, &previous).unwrap_err(), Rejection::Invalid);

        let behind = PointNormal::new(Vec3::new(0.0, 0.0, -1.0), Vec3::NEG_Z);
        assert_eq!(f.associate(&behind, &previous).unwrap_err(), Rejection::OutOfBounds);

        let far = PointNormal::new(Vec3::new(0.0, 0.0, 1.5), Vec3::NEG_Z);
        assert_eq!(f.associate(&far, &previous).unwrap_err(), Rejection::Distance);

        let tilted = PointNormal::new(Vec3::new(0.0, 0.0, 1.0), Vec3::NEG_X);
        assert_eq!(f.associate(&tilted, &previous).unwrap_err(), Rejection::Angle);
    }

    #[test]
    fn test_acceptance_thresholds() {
        let rejected = RejectionCounts {
            distance: 95,
            ..Default::default()
        };

        assert!(Acceptance::host().check(0, 5, &rejected).is_err());
        assert!(Acceptance::host().check(0, 6, &rejected).is_ok());

        let ceiling = Acceptance::with_rejection_ratio(Some(0.9), 101);
        match ceiling.check(2, 6, &rejected) {
            Err(Error::TrackingLost(info)) => {
                assert_eq!(info.iteration, 2);
                assert_eq!(info.required, 11);
                assert_eq!(info.rejected.distance, 95);
            }
            other => panic!("expected tracking lost, got {:?}", other),
        }
        let unlimited = Acceptance::with_rejection_ratio(None, 101);
        assert!(unlimited.check(0, 6, &rejected).is_ok());
    }
}
