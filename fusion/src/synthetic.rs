//! Analytic box room rendered from arbitrary poses.
//!
//! Produces exact depth frames and point-normal maps, which makes it the
//! reference scene for tracking tests and the demo.

use glam::{DVec3, Mat4, Vec3};

use crate::frame::{CameraIntrinsics, PointNormal};

/// Axis-aligned box viewed from inside; normals point into the room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticRoom {
    pub min: Vec3,
    pub max: Vec3,
}

/// One rendered view.
#[derive(Debug, Clone, Default)]
pub struct RenderedView {
    /// Camera-space z per pixel, NaN where nothing was hit.
    pub depth: Vec<f32>,
    /// Vertices and normals in camera space, as a measurement stage yields.
    pub camera_map: Vec<PointNormal>,
    /// Vertices and normals in global space, as surface prediction yields.
    pub global_map: Vec<PointNormal>,
}

impl Default for SyntheticRoom {
    fn default() -> Self {
        Self {
            min: Vec3::new(-1.0, -0.8, -1.0),
            max: Vec3::new(1.0, 0.8, 2.5),
        }
    }
}

impl SyntheticRoom {
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpgt(self.min).all() && point.cmplt(self.max).all()
    }

    /// Distance along `direction` (in units of its length) to the first wall
    /// and the wall's inward normal. `origin` must be inside the room.
    pub fn raycast(&self, origin: DVec3, direction: DVec3) -> Option<(f64, DVec3)> {
        let min = self.min.as_dvec3();
        let max = self.max.as_dvec3();

        let mut best: Option<(f64, DVec3)> = None;
        for axis in 0..3 {
            let d = direction[axis];
            let (wall, sign) = if d > 0.0 {
                (max[axis], -1.0)
            } else if d < 0.0 {
                (min[axis], 1.0)
            } else {
                continue;
            };

            let t = (wall - origin[axis]) / d;
            let closer = match best {
                Some((best_t, _)) => t < best_t,
                None => true,
            };
            if t > 0.0 && closer {
                let mut normal = DVec3::ZERO;
                normal[axis] = sign;
                best = Some((t, normal));
            }
        }
        best
    }

    /// Renders the room through `camera` placed at `pose` (camera to global).
    pub fn render(&self, camera: &CameraIntrinsics, pose: &Mat4) -> RenderedView {
        let pose = pose.as_dmat4();
        let rotation = crate::math::pose::rotation(&pose);
        let inverse_rotation = rotation.transpose();
        let origin = pose.w_axis.truncate();
        let k_inverse = camera.k.as_dmat3().inverse();

        let inside = self.contains(origin.as_vec3());
        let count = camera.pixel_count();
        let mut view = RenderedView {
            depth: Vec::with_capacity(count),
            camera_map: Vec::with_capacity(count),
            global_map: Vec::with_capacity(count),
        };

        for v in 0..camera.height {
            for u in 0..camera.width {
                let ray = k_inverse * DVec3::new(u as f64, v as f64, 1.0);
                let hit = if inside {
                    self.raycast(origin, rotation * ray)
                } else {
                    None
                };

                match hit {
                    Some((t, normal)) => {
                        let camera_point = ray * t;
                        let global_point = origin + rotation * camera_point;
                        view.depth.push(camera_point.z as f32);
                        view.camera_map.push(PointNormal::new(
                            camera_point.as_vec3(),
                            (inverse_rotation * normal).as_vec3(),
                        ));
                        view.global_map
                            .push(PointNormal::new(global_point.as_vec3(), normal.as_vec3()));
                    }
                    None => {
                        view.depth.push(f32::NAN);
                        view.camera_map.push(PointNormal::INVALID);
                        view.global_map.push(PointNormal::INVALID);
                    }
                }
            }
        }

        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::from_focal(40, 30, 30.0, 30.0, 19.5, 14.5)
    }

    #[test]
    fn test_raycast_hits_nearest_wall() {
        let room = SyntheticRoom::default();
        let (t, normal) = room.raycast(DVec3::ZERO, DVec3::Z).unwrap();
        assert!((t - 2.5).abs() < 1e-12);
        assert_eq!(normal, DVec3::NEG_Z);

        let (t, normal) = room.raycast(DVec3::ZERO, DVec3::new(-2.0, 0.0, 0.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-12);
        assert_eq!(normal, DVec3::X);
    }

    #[test]
    fn test_render_maps_agree() {
        let room = SyntheticRoom::default();
        let pose = Mat4::from_rotation_translation(
            glam::Quat::from_rotation_y(0.1),
            Vec3::new(0.1, -0.05, 0.2),
        );
        let view = room.render(&camera(), &pose);
        assert_eq!(view.depth.len(), 40 * 30);

        for ((depth, local), global) in view.depth.iter().zip(&view.camera_map).zip(&view.global_map) {
            assert!(local.is_valid());
            assert!((local.vertex().z - depth).abs() < 1e-5);
            assert!((local.normal().length() - 1.0).abs() < 1e-5);
            // Facing the camera
            assert!(local.vertex().dot(local.normal()) < 0.0);

            let moved = local.transformed(&pose);
            assert!((moved.vertex() - global.vertex()).length() < 1e-5);
            assert!((moved.normal() - global.normal()).length() < 1e-5);
        }
    }

    #[test]
    fn test_render_outside_room_is_invalid() {
        let room = SyntheticRoom::default();
        let view = room.render(&camera(), &Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert!(view.depth.iter().all(|d| d.is_nan()));
        assert!(view.camera_map.iter().all(|p| !p.is_valid()));
    }
}
