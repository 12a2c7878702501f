use std::time::{Duration, Instant};

use crate::common::{Error, Result};
use crate::frame::{CameraIntrinsics, DepthFrame};
use crate::stage::DepthSource;

/// Delivers frames from the inner source no faster than a fixed rate.
#[derive(Debug)]
pub struct RateLimitedSource<S> {
    inner: S,
    period: Duration,
    last: Option<Instant>,
}

impl<S: DepthSource> RateLimitedSource<S> {
    pub fn new(inner: S, fps: f64) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(Error::Config(format!("frame rate must be positive, got {}", fps)));
        }
        Ok(Self {
            inner,
            period: Duration::from_secs_f64(1.0 / fps),
            last: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: DepthSource> DepthSource for RateLimitedSource<S> {
    fn camera(&self) -> CameraIntrinsics {
        self.inner.camera()
    }

    fn next_frame(&mut self, recycled: Option<DepthFrame>) -> Result<DepthFrame> {
        if let Some(last) = self.last {
            let due = last + self.period;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        let frame = self.inner.next_frame(recycled);
        self.last = Some(Instant::now());
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockDepthSource;

    #[test]
    fn test_spaces_frames_by_period() {
        let camera = CameraIntrinsics::from_focal(2, 2, 1.0, 1.0, 0.5, 0.5);
        let mut inner = MockDepthSource::new(camera);
        for i in 0..3 {
            inner.push(vec![i as f32; 4]).unwrap();
        }

        let mut source = RateLimitedSource::new(inner, 50.0).unwrap();
        assert_eq!(source.camera(), camera);

        let start = Instant::now();
        let mut frame = source.next_frame(None).unwrap();
        for _ in 0..2 {
            frame = source.next_frame(Some(frame)).unwrap();
        }
        // Two enforced gaps of 20 ms each
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(frame.get().unwrap(), &[2.0; 4]);
        assert!(matches!(source.next_frame(None), Err(Error::EndOfStream)));
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let camera = CameraIntrinsics::from_focal(2, 2, 1.0, 1.0, 0.5, 0.5);
        assert!(RateLimitedSource::new(MockDepthSource::new(camera), 0.0).is_err());
    }
}
