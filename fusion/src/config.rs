//! Top-level configuration, loaded from YAML.

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::frame::CameraIntrinsics;
use crate::icp::{DeviceIcpConfig, IcpConfig};

/// Depth acquisition options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Frames acquired ahead on a worker thread. `None` acquires inline.
    pub buffer_capacity: Option<usize>,
    /// Upper bound on the delivered frame rate. `None` is unlimited.
    pub max_fps: Option<f64>,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == Some(0) {
            return Err(Error::Config("buffer_capacity must be positive".into()));
        }
        if let Some(fps) = self.max_fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(Error::Config(format!("max_fps must be positive, got {}", fps)));
            }
        }
        Ok(())
    }
}

/// Device-only tracking options. The thresholds and iteration count come
/// from [`FusionConfig::icp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTrackingConfig {
    pub block_size: u32,
    pub max_rejection_ratio: Option<f32>,
}

impl Default for DeviceTrackingConfig {
    fn default() -> Self {
        let defaults = DeviceIcpConfig::default();
        Self {
            block_size: defaults.block_size,
            max_rejection_ratio: defaults.max_rejection_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Log specification passed to `common::setup_logging`.
    pub log_level: String,
    pub camera: CameraIntrinsics,
    /// Shared by the host and device estimators.
    pub icp: IcpConfig,
    pub device: DeviceTrackingConfig,
    pub source: SourceConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            camera: CameraIntrinsics::default(),
            icp: IcpConfig::default(),
            device: DeviceTrackingConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl FusionConfig {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<FusionConfig> {
        let config: FusionConfig = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &str) -> Result<FusionConfig> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path, e)))?;
        Self::from_yaml(&yaml)
    }

    /// Device estimator parameters: `icp` plus the device-only options.
    pub fn device_icp(&self) -> DeviceIcpConfig {
        DeviceIcpConfig {
            icp: self.icp.clone(),
            block_size: self.device.block_size,
            max_rejection_ratio: self.device.max_rejection_ratio,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.camera.validate()?;
        self.icp.validate()?;
        self.device_icp().validate(self.camera.pixel_count())?;
        self.source.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_yaml() {
        let config = FusionConfig::default();
        assert!(config.validate().is_ok());

        let yaml = config.to_yaml().unwrap();
        assert_eq!(FusionConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = FusionConfig::from_yaml(
            "log_level: debug\n\
             icp:\n  iterations: 5\n\
             source:\n  buffer_capacity: 4\n",
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.icp.iterations, 5);
        assert_eq!(config.icp.epsilon_distance, IcpConfig::default().epsilon_distance);
        assert_eq!(config.source.buffer_capacity, Some(4));
        assert_eq!(config.source.max_fps, None);
        assert_eq!(config.camera, CameraIntrinsics::default());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(
            FusionConfig::from_yaml("icp:\n  iterations: 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FusionConfig::from_yaml("source:\n  buffer_capacity: 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FusionConfig::from_yaml("device:\n  block_size: 48\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FusionConfig::from_yaml("icp: [1, 2]\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_device_config_shares_icp_section() {
        let config = FusionConfig::from_yaml(
            "icp:\n  iterations: 7\n  epsilon_distance: 0.05\n\
             device:\n  block_size: 32\n  max_rejection_ratio: null\n",
        )
        .unwrap();

        let device = config.device_icp();
        assert_eq!(device.icp, config.icp);
        assert_eq!(device.icp.iterations, 7);
        assert_eq!(device.icp.epsilon_distance, 0.05);
        assert_eq!(device.block_size, 32);
        assert_eq!(device.max_rejection_ratio, None);

        // Thresholds are written once, under icp.
        let yaml = FusionConfig::default().to_yaml().unwrap();
        assert_eq!(yaml.matches("epsilon_distance").count(), 1);
    }

    #[test]
    fn test_bundled_config_is_valid() {
        let config = FusionConfig::from_yaml(include_str!("../config/fusion.yaml")).unwrap();
        assert_eq!(config.camera.width, 80);
        assert!(config.source.buffer_capacity.is_some());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(matches!(
            FusionConfig::from_yaml_file("does/not/exist.yaml"),
            Err(Error::Config(_))
        ));
    }
}
