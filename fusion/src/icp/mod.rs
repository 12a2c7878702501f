//! Sensor pose estimation by projective point-to-plane ICP.
//!
//! Both estimators share the state machine and per-iteration algorithm in
//! [`tracking`]; they differ only in how the normal equations are built:
//! on the host with rayon, or on the device with a parallel reduction.

mod config;
mod device;
mod host;
mod tracking;

use glam::Mat4;
use strum_macros::Display;

pub use self::config::{DeviceIcpConfig, IcpConfig, MAX_BLOCK_SIZE};
pub use self::device::{DevicePoseEstimator, ReductionPlan};
pub use self::host::HostPoseEstimator;
pub use self::tracking::MIN_CORRESPONDENCES;

use crate::common::Result;
use crate::frame::PointNormalMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum TrackingState {
    /// No pose has been produced yet.
    #[default]
    Uninitialized,
    Initialized,
}

/// Estimates the current camera pose from the current point-normal map
/// (camera space) and the previous frame's predicted map (global space).
pub trait PoseEstimator: Send {
    /// Returns the new camera-to-global pose.
    ///
    /// Without a previous map or pose this returns the configured initial
    /// pose. Fails with [`Error::TrackingLost`](crate::Error::TrackingLost)
    /// when too few correspondences survive an iteration.
    fn estimate(
        &mut self,
        current: &mut PointNormalMap,
        previous: Option<&mut PointNormalMap>,
        previous_pose: Option<&Mat4>,
    ) -> Result<Mat4>;

    fn state(&self) -> TrackingState;

    /// Returns to [`TrackingState::Uninitialized`].
    fn reset(&mut self);
}
