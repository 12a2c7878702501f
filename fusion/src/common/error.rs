use std::fmt;

/// Per-reason counts of correspondences discarded during data association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    /// Current or previous vertex/normal was the NaN sentinel.
    pub invalid: usize,
    /// Projected outside the frame or behind the camera.
    pub out_of_bounds: usize,
    /// Point distance exceeded `epsilon_d`.
    pub distance: usize,
    /// Normal deviation exceeded `epsilon_theta`.
    pub angle: usize,
}

impl RejectionCounts {
    pub fn total(&self) -> usize {
        self.invalid + self.out_of_bounds + self.distance + self.angle
    }

    pub fn merge(&mut self, other: &RejectionCounts) {
        self.invalid += other.invalid;
        self.out_of_bounds += other.out_of_bounds;
        self.distance += other.distance;
        self.angle += other.angle;
    }
}

/// Diagnostics attached to a lost-tracking failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingLost {
    /// Zero-based ICP iteration at which the check failed.
    pub iteration: usize,
    /// Correspondences that survived rejection.
    pub accepted: usize,
    /// Minimum number of accepted correspondences needed to continue.
    pub required: usize,
    pub rejected: RejectionCounts,
}

impl fmt::Display for TrackingLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iteration {}: {} correspondences accepted, {} required \
             (rejected: {} invalid, {} out of bounds, {} distance, {} angle)",
            self.iteration,
            self.accepted,
            self.required,
            self.rejected.invalid,
            self.rejected.out_of_bounds,
            self.rejected.distance,
            self.rejected.angle,
        )
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    Config(String),
    TrackingLost(TrackingLost),
    Build { log: String },
    Device(String),
    Acquisition(String),
    EndOfStream,
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::TrackingLost(info) => write!(f, "Tracking lost at {}", info),
            Error::Build { log } => write!(f, "Kernel build failed:\n{}", log),
            Error::Device(msg) => write!(f, "Device error: {}", msg),
            Error::Acquisition(msg) => write!(f, "Depth acquisition failed: {}", msg),
            Error::EndOfStream => write!(f, "Depth source exhausted"),
            Error::SizeMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Size mismatch for {}: expected {} elements, got {}",
                what, expected, actual
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_yml::Error> for Error {
    fn from(e: serde_yml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<wgpu::PollError> for Error {
    fn from(e: wgpu::PollError) -> Self {
        Error::Device(e.to_string())
    }
}

impl From<wgpu::BufferAsyncError> for Error {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        Error::Device(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
