//! Host measurement stage: depth frame to camera-space point-normal map.

use glam::{Mat3, Vec3};
use rayon::prelude::*;

use crate::common::Result;
use crate::frame::{CameraIntrinsics, DepthFrame, PointNormal, PointNormalMap};
use crate::stage::Measurement;
use crate::value::HostValue;

/// Back-projects each pixel through K^-1 and estimates normals from forward
/// differences with the right and lower neighbours.
///
/// A pixel keeps its vertex only when it also gets a normal, so the last
/// row and column and every pixel next to a hole are invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackProjection;

impl BackProjection {
    pub fn new() -> Self {
        Self
    }
}

impl Measurement for BackProjection {
    fn measure(
        &mut self,
        frame: &mut DepthFrame,
        camera: &CameraIntrinsics,
        recycled: Option<PointNormalMap>,
    ) -> Result<PointNormalMap> {
        camera.check_len("depth frame", frame.len())?;
        let depth = frame.get()?;
        let width = camera.width;
        let k_inverse = camera.k.inverse();

        let mut vertices = vec![Vec3::NAN; depth.len()];
        vertices
            .par_chunks_mut(width)
            .zip(depth.par_chunks(width))
            .enumerate()
            .for_each(|(v, (row, depth_row))| {
                for (u, (vertex, &d)) in row.iter_mut().zip(depth_row).enumerate() {
                    if d.is_finite() && d > 0.0 {
                        *vertex = back_project(&k_inverse, u, v, d);
                    }
                }
            });

        let mut map = HostValue::recycle(recycled);
        let out = map.get_mut();
        out.resize(depth.len(), PointNormal::INVALID);
        out.par_chunks_mut(width).enumerate().for_each(|(v, row)| {
            for (u, pixel) in row.iter_mut().enumerate() {
                *pixel = estimate(&vertices, width, camera.height, u, v);
            }
        });

        Ok(map.into())
    }
}

fn back_project(k_inverse: &Mat3, u: usize, v: usize, depth: f32) -> Vec3 {
    *k_inverse * Vec3::new(u as f32, v as f32, 1.0) * depth
}

fn estimate(vertices: &[Vec3], width: usize, height: usize, u: usize, v: usize) -> PointNormal {
    if u + 1 >= width || v + 1 >= height {
        return PointNormal::INVALID;
    }

    let index = v * width + u;
    let center = vertices[index];
    let right = vertices[index + 1];
    let below = vertices[index + width];
    if !(center.is_finite() && right.is_finite() && below.is_finite()) {
        return PointNormal::INVALID;
    }

    let normal = (right - center).cross(below - center);
    let Some(normal) = normal.try_normalize() else {
        return PointNormal::INVALID;
    };
    // Face the camera at the origin.
    let normal = if normal.dot(center) > 0.0 { -normal } else { normal };

    PointNormal::new(center, normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::synthetic::SyntheticRoom;
    use crate::testing;

    #[test]
    fn test_matches_rendered_room() {
        let camera = testing::camera();
        let view = SyntheticRoom::default().render(&camera, &testing::reference_pose());

        let mut frame: DepthFrame = view.depth.clone().into();
        let mut map = BackProjection::new().measure(&mut frame, &camera, None).unwrap();
        let map = map.get().unwrap();
        assert_eq!(map.len(), camera.pixel_count());

        let mut matching_normals = 0;
        let mut valid = 0;
        for (index, (measured, expected)) in map.iter().zip(&view.camera_map).enumerate() {
            let (u, v) = (index % camera.width, index / camera.width);
            assert_eq!(measured.vertex().is_nan(), measured.normal().is_nan());
            if u + 1 == camera.width || v + 1 == camera.height {
                assert!(!measured.is_valid());
                continue;
            }

            assert!(measured.is_valid());
            valid += 1;
            assert!((measured.vertex() - expected.vertex()).length() < 1e-4);
            assert!((measured.normal().length() - 1.0).abs() < 1e-4);
            assert!(measured.normal().dot(measured.vertex()) < 0.0);
            if (measured.normal() - expected.normal()).length() < 1e-2 {
                matching_normals += 1;
            }
        }
        // Only pixels straddling a room edge see two walls.
        assert!(matching_normals * 5 >= valid * 4);
    }

    #[test]
    fn test_holes_invalidate_neighbours() {
        let camera = CameraIntrinsics::from_focal(4, 4, 2.0, 2.0, 1.5, 1.5);
        let mut depth = vec![1.0; 16];
        depth[5] = f32::NAN;
        depth[10] = 0.0;

        let mut frame: DepthFrame = depth.into();
        let mut map = BackProjection.measure(&mut frame, &camera, None).unwrap();
        let map = map.get().unwrap();

        let valid: Vec<usize> = (0..16).filter(|&i| map[i].is_valid()).collect();
        // 1 and 4 border the NaN pixel, 6 and 9 the zero-depth one.
        assert_eq!(valid, vec![0, 2, 8]);
        for pixel in map {
            assert_eq!(pixel.vertex().is_nan(), pixel.normal().is_nan());
        }
        assert_eq!(map[0].normal(), Vec3::NEG_Z);
    }

    #[test]
    fn test_reuses_recycled_map_and_checks_size() {
        let camera = CameraIntrinsics::from_focal(3, 3, 1.0, 1.0, 1.0, 1.0);
        let mut stage = BackProjection::new();

        let mut frame: DepthFrame = vec![2.0; 9].into();
        let first = stage.measure(&mut frame, &camera, None).unwrap();
        let mut second = stage.measure(&mut frame, &camera, Some(first)).unwrap();
        assert_eq!(second.len(), 9);
        let map = second.get().unwrap();
        assert!(map[4].is_valid());
        assert!(!map[5].is_valid());
        assert!(!map[8].is_valid());

        let mut short: DepthFrame = vec![2.0; 8].into();
        assert!(matches!(
            stage.measure(&mut short, &camera, None),
            Err(Error::SizeMismatch { expected: 9, actual: 8, .. })
        ));
    }
}
