//! Configuration types for pose estimation.

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::math::pose;

// =============================================================================
// Shared ICP configuration
// =============================================================================

/// Parameters shared by the host and device pose estimators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum distance in meters between a transformed point and its
    /// corresponding predicted point.
    pub epsilon_distance: f32,
    /// Maximum sine of the angle between a transformed normal and its
    /// corresponding predicted normal (compared against the cross-product
    /// magnitude). Default is sin(20 deg).
    pub epsilon_angle: f32,
    /// Gauss-Newton iterations per frame. Always runs the full count.
    pub iterations: usize,
    /// Pose returned for the first frame, before any previous map exists.
    pub initial_pose: Mat4,
}

impl IcpConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::Config("ICP iteration count must be positive".into()));
        }
        if !(self.epsilon_distance.is_finite() && self.epsilon_distance > 0.0) {
            return Err(Error::Config(format!(
                "epsilon_distance must be positive, got {}",
                self.epsilon_distance
            )));
        }
        if !(self.epsilon_angle.is_finite() && self.epsilon_angle > 0.0) {
            return Err(Error::Config(format!(
                "epsilon_angle must be positive, got {}",
                self.epsilon_angle
            )));
        }
        if !pose::is_rigid(&self.initial_pose, 1e-4) {
            return Err(Error::Config("initial pose must be a rigid transform".into()));
        }
        Ok(())
    }
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            epsilon_distance: 0.10,
            epsilon_angle: 20f32.to_radians().sin(),
            iterations: 15,
            initial_pose: Mat4::IDENTITY,
        }
    }
}

// =============================================================================
// Device estimator configuration
// =============================================================================

/// Largest reduction block; the default per-workgroup invocation limit.
pub const MAX_BLOCK_SIZE: u32 = 256;

/// Parameters of the device pose estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIcpConfig {
    pub icp: IcpConfig,
    /// Elements summed per workgroup in each reduction pass. Power of two in
    /// `2..=256` that divides the frame's pixel count.
    pub block_size: u32,
    /// Fraction of pixels that may be rejected before tracking counts as
    /// lost. `None` disables the ceiling; six accepted correspondences are
    /// required regardless.
    pub max_rejection_ratio: Option<f32>,
}

impl DeviceIcpConfig {
    /// Validate configuration parameters against a frame of `pixel_count`.
    pub fn validate(&self, pixel_count: usize) -> Result<()> {
        self.icp.validate()?;

        if !self.block_size.is_power_of_two() || !(2..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(Error::Config(format!(
                "reduction block size must be a power of two in 2..={}, got {}",
                MAX_BLOCK_SIZE, self.block_size
            )));
        }
        if pixel_count % self.block_size as usize != 0 {
            return Err(Error::Config(format!(
                "reduction block size {} does not divide frame size {}",
                self.block_size, pixel_count
            )));
        }
        if let Some(ratio) = self.max_rejection_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config(format!(
                    "max_rejection_ratio must be within [0, 1], got {}",
                    ratio
                )));
            }
        }
        Ok(())
    }
}

impl Default for DeviceIcpConfig {
    fn default() -> Self {
        Self {
            icp: IcpConfig::default(),
            block_size: 64,
            max_rejection_ratio: Some(0.9),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IcpConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.epsilon_angle - 0.342_020_14).abs() < 1e-6);
        assert!(DeviceIcpConfig::default().validate(640 * 480).is_ok());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = IcpConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_block_size_must_divide_frame() {
        let config = DeviceIcpConfig::default();
        assert!(matches!(config.validate(100), Err(Error::Config(_))));

        let config = DeviceIcpConfig {
            block_size: 48,
            ..Default::default()
        };
        assert!(matches!(config.validate(48 * 100), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejection_ratio_range() {
        let config = DeviceIcpConfig {
            max_rejection_ratio: Some(1.5),
            ..Default::default()
        };
        assert!(config.validate(640 * 480).is_err());

        let config = DeviceIcpConfig {
            max_rejection_ratio: None,
            ..Default::default()
        };
        assert!(config.validate(640 * 480).is_ok());
    }
}
