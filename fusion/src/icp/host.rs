use glam::Mat4;
use rayon::prelude::*;

use crate::common::{RejectionCounts, Result};
use crate::frame::{CameraIntrinsics, PointNormal, PointNormalMap};
use crate::icp::tracking::{self, Acceptance, IterationFrame};
use crate::icp::{IcpConfig, PoseEstimator, TrackingState};
use crate::math::NormalEquations;

/// Pose estimator that builds the normal equations on the host.
///
/// Rows are accumulated in parallel and combined in row order, so the
/// result does not depend on thread scheduling. Device-resident maps are
/// downloaded once per call.
#[derive(Debug)]
pub struct HostPoseEstimator {
    config: IcpConfig,
    camera: CameraIntrinsics,
    state: TrackingState,
}

impl HostPoseEstimator {
    pub fn new(config: IcpConfig, camera: CameraIntrinsics) -> Result<Self> {
        config.validate()?;
        camera.validate()?;
        Ok(Self {
            config,
            camera,
            state: TrackingState::Uninitialized,
        })
    }

    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraIntrinsics {
        &self.camera
    }
}

impl PoseEstimator for HostPoseEstimator {
    fn estimate(
        &mut self,
        current: &mut PointNormalMap,
        previous: Option<&mut PointNormalMap>,
        previous_pose: Option<&Mat4>,
    ) -> Result<Mat4> {
        let (Some(previous), Some(previous_pose)) = (previous, previous_pose) else {
            self.state = TrackingState::Initialized;
            return Ok(self.config.initial_pose);
        };

        self.camera.check_len("current point-normal map", current.len())?;
        self.camera.check_len("previous point-normal map", previous.len())?;

        let current = current.get()?;
        let previous = previous.get()?;

        let pose = tracking::iterate(
            &self.config,
            &self.camera,
            previous_pose,
            &Acceptance::host(),
            |frame| Ok(accumulate(current, previous, frame)),
        )?;

        self.state = TrackingState::Initialized;
        Ok(pose)
    }

    fn state(&self) -> TrackingState {
        self.state
    }

    fn reset(&mut self) {
        self.state = TrackingState::Uninitialized;
    }
}

fn accumulate(
    current: &[PointNormal],
    previous: &[PointNormal],
    frame: &IterationFrame,
) -> (NormalEquations, RejectionCounts) {
    let rows: Vec<(NormalEquations, RejectionCounts)> = current
        .par_chunks(frame.width)
        .map(|row| {
            let mut system = NormalEquations::new();
            let mut rejected = RejectionCounts::default();
            for pixel in row {
                match frame.associate(pixel, previous) {
                    Ok(c) => system.add(c.point, c.target, c.normal),
                    Err(rejection) => tracking::record(&mut rejected, rejection),
                }
            }
            (system, rejected)
        })
        .collect();

    rows.into_iter().fold(
        (NormalEquations::new(), RejectionCounts::default()),
        |(mut system, mut rejected), (row_system, row_rejected)| {
            system.merge(&row_system);
            rejected.merge(&row_rejected);
            (system, rejected)
        },
    )
}
