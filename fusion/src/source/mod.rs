//! Depth source implementations and decorators.

mod buffered;
mod mock;
mod rate_limited;
mod synthetic;

pub use self::buffered::BufferedSource;
pub use self::mock::MockDepthSource;
pub use self::rate_limited::RateLimitedSource;
pub use self::synthetic::SyntheticSource;
