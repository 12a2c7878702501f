use glam::{Mat4, Quat, Vec3};

use crate::common::{Error, Result};
use crate::frame::{CameraIntrinsics, DepthFrame};
use crate::stage::DepthSource;
use crate::synthetic::SyntheticRoom;
use crate::value::HostValue;

/// Renders depth frames of a [`SyntheticRoom`] along a scripted trajectory.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    room: SyntheticRoom,
    camera: CameraIntrinsics,
    trajectory: Vec<Mat4>,
    next: usize,
}

impl SyntheticSource {
    pub fn new(room: SyntheticRoom, camera: CameraIntrinsics, trajectory: Vec<Mat4>) -> Self {
        Self {
            room,
            camera,
            trajectory,
            next: 0,
        }
    }

    /// A camera starting at the room centre that pans by `yaw_step` radians
    /// and drifts by `step` meters per frame.
    pub fn pan(
        room: SyntheticRoom,
        camera: CameraIntrinsics,
        frames: usize,
        yaw_step: f32,
        step: Vec3,
    ) -> Self {
        let trajectory = (0..frames)
            .map(|i| {
                let i = i as f32;
                Mat4::from_rotation_translation(Quat::from_rotation_y(yaw_step * i), step * i)
            })
            .collect();
        Self::new(room, camera, trajectory)
    }

    pub fn room(&self) -> &SyntheticRoom {
        &self.room
    }

    /// Ground-truth camera-to-global poses, one per frame.
    pub fn trajectory(&self) -> &[Mat4] {
        &self.trajectory
    }

    /// Index of the frame the next call renders.
    pub fn position(&self) -> usize {
        self.next
    }
}

impl DepthSource for SyntheticSource {
    fn camera(&self) -> CameraIntrinsics {
        self.camera
    }

    fn next_frame(&mut self, recycled: Option<DepthFrame>) -> Result<DepthFrame> {
        let pose = self.trajectory.get(self.next).ok_or(Error::EndOfStream)?;
        let view = self.room.render(&self.camera, pose);
        self.next += 1;

        let mut frame = HostValue::recycle(recycled);
        frame.get_mut().extend_from_slice(&view.depth);
        Ok(frame.into())
    }
}
