mod kernels;
mod reduction;

use glam::Mat4;
use log::debug;

pub use self::reduction::ReductionPlan;

use self::kernels::IcpKernels;
use crate::common::Result;
use crate::compute::ComputeQueue;
use crate::frame::{CameraIntrinsics, PointNormal, PointNormalMap};
use crate::icp::tracking::{self, Acceptance};
use crate::icp::{DeviceIcpConfig, PoseEstimator, TrackingState};
use crate::value::DeviceValueExtractor;

/// Pose estimator that associates and reduces on the device.
///
/// Association and the per-pixel terms run as one kernel over all pixels,
/// the 27-float sums come from a tree reduction, and only those sums plus
/// four rejection counters are read back per iteration. Solving and pose
/// composition stay on the host.
#[derive(Debug)]
pub struct DevicePoseEstimator {
    config: DeviceIcpConfig,
    camera: CameraIntrinsics,
    queue: ComputeQueue,
    kernels: IcpKernels,
    acceptance: Acceptance,
    current: DeviceValueExtractor<PointNormal>,
    previous: DeviceValueExtractor<PointNormal>,
    state: TrackingState,
}

impl DevicePoseEstimator {
    pub fn new(queue: &ComputeQueue, config: DeviceIcpConfig, camera: CameraIntrinsics) -> Result<Self> {
        camera.validate()?;
        config.validate(camera.pixel_count())?;

        let kernels = IcpKernels::new(queue, camera, config.block_size)?;
        debug!(
            "Device ICP for {}x{}: reduction passes {:?}, serial remainder {}",
            camera.width,
            camera.height,
            kernels.plan().passes(),
            kernels.plan().remainder()
        );

        Ok(Self {
            acceptance: Acceptance::with_rejection_ratio(
                config.max_rejection_ratio,
                camera.pixel_count(),
            ),
            config,
            camera,
            queue: queue.clone(),
            kernels,
            current: DeviceValueExtractor::new(queue),
            previous: DeviceValueExtractor::new(queue),
            state: TrackingState::Uninitialized,
        })
    }

    pub fn config(&self) -> &DeviceIcpConfig {
        &self.config
    }

    pub fn queue(&self) -> &ComputeQueue {
        &self.queue
    }

    pub fn plan(&self) -> &ReductionPlan {
        self.kernels.plan()
    }
}

impl PoseEstimator for DevicePoseEstimator {
    fn estimate(
        &mut self,
        current: &mut PointNormalMap,
        previous: Option<&mut PointNormalMap>,
        previous_pose: Option<&Mat4>,
    ) -> Result<Mat4> {
        let (Some(previous), Some(previous_pose)) = (previous, previous_pose) else {
            self.state = TrackingState::Initialized;
            return Ok(self.config.icp.initial_pose);
        };

        self.camera.check_len("current point-normal map", current.len())?;
        self.camera.check_len("previous point-normal map", previous.len())?;

        let maps = {
            let current = self.current.extract(current)?;
            let previous = self.previous.extract(previous)?;
            debug!(
                "Device ICP inputs: current {}, previous {}",
                current.transfer(),
                previous.transfer()
            );
            self.kernels
                .bind_maps(self.queue.device(), current.buffer(), previous.buffer())
        };

        let pose = tracking::iterate(
            &self.config.icp,
            &self.camera,
            previous_pose,
            &self.acceptance,
            |frame| self.kernels.run(&self.queue, &maps, frame),
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
