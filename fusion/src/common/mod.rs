mod error;

pub use error::{Error, RejectionCounts, Result, TrackingLost};
