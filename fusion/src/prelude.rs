// Error handling
pub use crate::common::{Error, RejectionCounts, Result, TrackingLost};

// Configuration
pub use crate::config::{DeviceTrackingConfig, FusionConfig, SourceConfig};

// Device model
pub use crate::compute::{Compatibility, ComputeContext, ComputeQueue, DeviceKey, Program, QueueIdentity};

// Pipeline values
pub use crate::value::{
    DeviceValue, DeviceValueExtractor, Extraction, HostValue, PipelineValue, Transfer,
};

// Frames and geometry
pub use crate::frame::{CameraIntrinsics, DepthFrame, PointNormal, PointNormalMap, Volume};
pub use crate::math::{pose, solve_symmetric, NormalEquations};

// Pose estimation
pub use crate::icp::{
    DeviceIcpConfig, DevicePoseEstimator, HostPoseEstimator, IcpConfig, PoseEstimator,
    ReductionPlan, TrackingState, MAX_BLOCK_SIZE, MIN_CORRESPONDENCES,
};

// Stages and orchestration
pub use crate::measurement::BackProjection;
pub use crate::pipeline::{Pipeline, Stage, StageTimings};
pub use crate::source::{BufferedSource, MockDepthSource, RateLimitedSource, SyntheticSource};
pub use crate::stage::{DepthSource, Measurement, SurfacePrediction, VolumetricUpdate};
pub use crate::synthetic::{RenderedView, SyntheticRoom};
