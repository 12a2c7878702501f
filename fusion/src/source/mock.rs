use std::collections::VecDeque;

use crate::common::{Error, Result};
use crate::frame::{CameraIntrinsics, DepthFrame};
use crate::stage::DepthSource;
use crate::value::HostValue;

/// Replays frames queued in memory, then reports end of stream.
#[derive(Debug, Clone)]
pub struct MockDepthSource {
    camera: CameraIntrinsics,
    frames: VecDeque<Vec<f32>>,
}

impl MockDepthSource {
    pub fn new(camera: CameraIntrinsics) -> Self {
        Self {
            camera,
            frames: VecDeque::new(),
        }
    }

    /// Queues a frame; it must hold exactly width x height samples.
    pub fn push(&mut self, frame: Vec<f32>) -> Result<()> {
        self.camera.check_len("depth frame", frame.len())?;
        self.frames.push_back(frame);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DepthSource for MockDepthSource {
    fn camera(&self) -> CameraIntrinsics {
        self.camera
    }

    fn next_frame(&mut self, recycled: Option<DepthFrame>) -> Result<DepthFrame> {
        let data = self.frames.pop_front().ok_or(Error::EndOfStream)?;

        let mut frame = HostValue::recycle(recycled);
        frame.get_mut().extend_from_slice(&data);
        Ok(frame.into())
    }
}
