//! Data passed between pipeline stages.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::value::PipelineValue;

/// Depth frame in meters, row-major, NaN marks invalid pixels.
pub type DepthFrame = PipelineValue<f32>;

/// Row-major per-pixel vertices and normals.
pub type PointNormalMap = PipelineValue<PointNormal>;

/// One pixel of a point-normal map.
///
/// A normal is unit length or NaN; it is NaN exactly when the vertex is.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointNormal {
    pub vertex: [f32; 3],
    pub normal: [f32; 3],
}

impl PointNormal {
    pub const INVALID: PointNormal = PointNormal {
        vertex: [f32::NAN; 3],
        normal: [f32::NAN; 3],
    };

    pub fn new(vertex: Vec3, normal: Vec3) -> Self {
        Self {
            vertex: vertex.to_array(),
            normal: normal.to_array(),
        }
    }

    pub fn vertex(&self) -> Vec3 {
        Vec3::from_array(self.vertex)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn is_valid(&self) -> bool {
        self.vertex().is_finite() && self.normal().is_finite()
    }

    /// Applies a rigid transform to the vertex and its rotation to the normal.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        if !self.is_valid() {
            return PointNormal::INVALID;
        }
        Self::new(
            transform.transform_point3(self.vertex()),
            transform.transform_vector3(self.normal()),
        )
    }
}

/// Frame geometry and pinhole calibration, fixed for a source's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub width: usize,
    pub height: usize,
    /// Pinhole projection matrix, column-major as in glam.
    pub k: Mat3,
}

impl CameraIntrinsics {
    pub fn new(width: usize, height: usize, k: Mat3) -> Self {
        Self { width, height, k }
    }

    /// Builds K from focal lengths and principal point.
    pub fn from_focal(width: usize, height: usize, fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        let k = Mat3::from_cols(
            Vec3::new(fx, 0.0, 0.0),
            Vec3::new(0.0, fy, 0.0),
            Vec3::new(cx, cy, 1.0),
        );
        Self::new(width, height, k)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.k.is_finite() || self.k.determinant().abs() <= f32::EPSILON {
            return Err(Error::Config("calibration matrix must be invertible".into()));
        }
        Ok(())
    }

    /// Errors unless `len` matches the frame's pixel count.
    pub fn check_len(&self, what: &'static str, len: usize) -> Result<()> {
        if len != self.pixel_count() {
            return Err(Error::SizeMismatch {
                what,
                expected: self.pixel_count(),
                actual: len,
            });
        }
        Ok(())
    }
}

impl Default for CameraIntrinsics {
    /// Kinect-like 640x480 camera.
    fn default() -> Self {
        Self::from_focal(640, 480, 585.0, 585.0, 320.0, 240.0)
    }
}

/// Volumetric model produced by the update stage.
#[derive(Debug)]
pub struct Volume {
    pub buffer: PipelineValue<f32>,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Volume {
    pub fn voxel_count(&self) -> usize {
        self.width * self.height * self.depth
    }
}
