use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::common::{Error, Result};
use crate::frame::{CameraIntrinsics, DepthFrame};
use crate::stage::DepthSource;

/// Acquires frames from an inner source on a dedicated worker thread.
///
/// The worker keeps up to `capacity` frames ready and blocks while the
/// buffer is full. Frames handed back through `recycled` travel to the
/// worker and are reused for later acquisitions. When the inner source
/// fails (including end of stream) the buffered frames are delivered first,
/// then the failure is returned on this and every later call.
pub struct BufferedSource {
    camera: CameraIntrinsics,
    frames: Option<mpsc::Receiver<Result<DepthFrame>>>,
    pool: mpsc::UnboundedSender<DepthFrame>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    error: Option<Error>,
}

impl BufferedSource {
    pub fn new<S>(inner: S, capacity: usize) -> Result<Self>
    where
        S: DepthSource + 'static,
    {
        if capacity == 0 {
            return Err(Error::Config("buffer capacity must be positive".into()));
        }

        let camera = inner.camera();
        let (frame_tx, frame_rx) = mpsc::channel(capacity);
        let (pool_tx, pool_rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let worker = thread::Builder::new()
            .name("depth-acquisition".into())
            .spawn({
                let stop = Arc::clone(&stop);
                move || acquire(inner, frame_tx, pool_rx, stop)
            })
            .map_err(|e| Error::Acquisition(format!("failed to spawn worker: {}", e)))?;

        debug!("Buffered depth source started with capacity {}", capacity);

        Ok(Self {
            camera,
            frames: Some(frame_rx),
            pool: pool_tx,
            stop,
            worker: Some(worker),
            error: None,
        })
    }
}

fn acquire<S: DepthSource>(
    mut inner: S,
    frames: mpsc::Sender<Result<DepthFrame>>,
    mut pool: mpsc::UnboundedReceiver<DepthFrame>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        let result = inner.next_frame(pool.try_recv().ok());
        let failed = result.is_err();
        if let Err(e) = &result {
            if !matches!(e, Error::EndOfStream) {
                warn!("Depth acquisition failed: {}", e);
            }
        }

        // Fails once the consumer side is gone.
        if frames.blocking_send(result).is_err() || failed {
            break;
        }
    }
    debug!("Depth acquisition worker exiting");
}

impl DepthSource for BufferedSource {
    fn camera(&self) -> CameraIntrinsics {
        self.camera
    }

    fn next_frame(&mut self, recycled: Option<DepthFrame>) -> Result<DepthFrame> {
        if let Some(frame) = recycled {
            // The worker may have exited already; the frame is then dropped.
            let _ = self.pool.send(frame);
        }
        if let Some(e) = &self.error {
            return Err(e.clone());
        }

        let frames = self
            .frames
            .as_mut()
            .ok_or_else(|| Error::Acquisition("buffered source is shut down".into()))?;
        let result = frames
            .blocking_recv()
            .unwrap_or_else(|| Err(Error::Acquisition("acquisition worker stopped".into())));

        if let Err(e) = &result {
            self.error = Some(e.clone());
        }
        result
    }
}

impl Drop for BufferedSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Closing the channel wakes a worker blocked on a full buffer.
        self.frames.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Depth acquisition worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for BufferedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedSource")
            .field("camera", &self.camera)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
