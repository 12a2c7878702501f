//! Interfaces of the pipeline's stage collaborators.
//!
//! Every stage receives the value it produced on the previous cycle as
//! `recycled` so it can reuse allocations. Closures with the matching
//! signature implement the traits directly.

use glam::Mat4;

use crate::common::Result;
use crate::frame::{CameraIntrinsics, DepthFrame, PointNormalMap, Volume};

/// Yields depth frames of a fixed geometry.
pub trait DepthSource: Send {
    fn camera(&self) -> CameraIntrinsics;

    /// Next frame, or [`Error::EndOfStream`](crate::Error::EndOfStream) once
    /// exhausted.
    fn next_frame(&mut self, recycled: Option<DepthFrame>) -> Result<DepthFrame>;
}

/// Turns a depth frame into a camera-space point-normal map.
pub trait Measurement: Send {
    fn measure(
        &mut self,
        frame: &mut DepthFrame,
        camera: &CameraIntrinsics,
        recycled: Option<PointNormalMap>,
    ) -> Result<PointNormalMap>;
}

/// Fuses a depth frame taken at `pose` into the volumetric model.
pub trait VolumetricUpdate: Send {
    fn integrate(
        &mut self,
        frame: &mut DepthFrame,
        camera: &CameraIntrinsics,
        pose: &Mat4,
        recycled: Option<Volume>,
    ) -> Result<Volume>;
}

/// Renders the model from `pose` into a global-space point-normal map.
pub trait SurfacePrediction: Send {
    fn predict(
        &mut self,
        volume: &mut Volume,
        pose: &Mat4,
        camera: &CameraIntrinsics,
        recycled: Option<PointNormalMap>,
    ) -> Result<PointNormalMap>;
}

impl<S: DepthSource + ?Sized> DepthSource for Box<S> {
    fn camera(&self) -> CameraIntrinsics {
        (**self).camera()
    }

    fn next_frame(&mut self, recycled: Option<DepthFrame>) -> Result<DepthFrame> {
        (**self).next_frame(recycled)
    }
}

impl<F> Measurement for F
where
    F: FnMut(&mut DepthFrame, &CameraIntrinsics, Option<PointNormalMap>) -> Result<PointNormalMap>
        + Send,
{
    fn measure(
        &mut self,
        frame: &mut DepthFrame,
        camera: &CameraIntrinsics,
        recycled: Option<PointNormalMap>,
    ) -> Result<PointNormalMap> {
        self(frame, camera, recycled)
    }
}

impl<F> VolumetricUpdate for F
where
    F: FnMut(&mut DepthFrame, &CameraIntrinsics, &Mat4, Option<Volume>) -> Result<Volume> + Send,
{
    fn integrate(
        &mut self,
        frame: &mut DepthFrame,
        camera: &CameraIntrinsics,
        pose: &Mat4,
        recycled: Option<Volume>,
    ) -> Result<Volume> {
        self(frame, camera, pose, recycled)
    }
}

impl<F> SurfacePrediction for F
where
    F: FnMut(&mut Volume, &Mat4, &CameraIntrinsics, Option<PointNormalMap>) -> Result<PointNormalMap>
        + Send,
{
    fn predict(
        &mut self,
        volume: &mut Volume,
        pose: &Mat4,
        camera: &CameraIntrinsics,
        recycled: Option<PointNormalMap>,
    ) -> Result<PointNormalMap> {
        self(volume, pose, camera, recycled)
    }
}
