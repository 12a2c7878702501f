use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strum_macros::Display;

use crate::common::{Error, Result};
use crate::compute::{ComputeContext, DeviceKey};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// How a device-resident value relates to the queue that wants to consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Compatibility {
    /// Same logical queue: the buffer can be used as is.
    SameQueue,
    /// Same context, other queue: usable after the owning queue drains.
    SameContext,
    /// Same physical device, other context: the data has to be copied.
    SameDevice,
    /// Different physical device.
    Unrelated,
}

/// Plain-data identity of a queue, enough to classify compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueIdentity {
    pub queue: u64,
    pub context: u64,
    pub device: Arc<DeviceKey>,
}

impl QueueIdentity {
    pub fn compatibility(&self, other: &QueueIdentity) -> Compatibility {
        if self.context == other.context {
            if self.queue == other.queue {
                Compatibility::SameQueue
            } else {
                Compatibility::SameContext
            }
        } else if self.device == other.device {
            Compatibility::SameDevice
        } else {
            Compatibility::Unrelated
        }
    }
}

#[derive(Debug)]
struct QueueInner {
    id: u64,
    context: ComputeContext,
    last_submission: Mutex<Option<wgpu::SubmissionIndex>>,
}

/// Logical in-order submission stream over a [`ComputeContext`].
///
/// Cloning shares the stream. Enqueued work runs asynchronously; the only
/// wait points are [`ComputeQueue::finish`] and buffer readback.
#[derive(Debug, Clone)]
pub struct ComputeQueue {
    inner: Arc<QueueInner>,
}

impl ComputeQueue {
    pub(crate) fn new(context: &ComputeContext) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
                context: context.clone(),
                last_submission: Mutex::new(None),
            }),
        }
    }

    pub fn context(&self) -> &ComputeContext {
        &self.inner.context
    }

    pub fn device(&self) -> &wgpu::Device {
        self.inner.context.device()
    }

    pub fn identity(&self) -> QueueIdentity {
        QueueIdentity {
            queue: self.inner.id,
            context: self.inner.context.id(),
            device: Arc::clone(self.inner.context.device_key()),
        }
    }

    pub fn compatibility(&self, other: &ComputeQueue) -> Compatibility {
        self.identity().compatibility(&other.identity())
    }

    /// Stages a host-to-device write, ordered before the next submission.
    pub fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.inner
            .context
            .queue()
            .write_buffer(buffer, offset, data);
    }

    pub fn create_command_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submits recorded work without waiting for it.
    pub fn submit(&self, commands: wgpu::CommandBuffer) {
        let index = self.inner.context.queue().submit(std::iter::once(commands));
        *self.inner.last_submission.lock() = Some(index);
    }

    pub fn has_pending_work(&self) -> bool {
        self.inner.last_submission.lock().is_some()
    }

    /// Blocks until all work submitted through this queue has completed.
    pub fn finish(&self) -> Result<()> {
        let pending = self.inner.last_submission.lock().take();
        if let Some(index) = pending {
            self.device()
                .poll(wgpu::PollType::WaitForSubmissionIndex(index))?;
        }
        Ok(())
    }

    /// Downloads the first `size` bytes of `buffer`, waiting for prior work.
    ///
    /// `size` must be a multiple of [`wgpu::COPY_BUFFER_ALIGNMENT`].
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }

        let staging = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("fusion_readback_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.create_command_encoder("fusion_readback_encoder");
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.submit(encoder.finish());

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.finish()?;

        let mapped = match rx.try_recv() {
            Ok(result) => result,
            Err(_) => {
                // The map callback may need one more device-wide poll.
                self.device().poll(wgpu::PollType::Wait)?;
                rx.try_recv()
                    .map_err(|_| Error::Device("buffer mapping did not complete".into()))?
            }
        };
        mapped?;

        let data = slice.get_mapped_range();
        let bytes = data.to_vec();
        drop(data);
        staging.unmap();

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(queue: u64, context: u64, device: &str) -> QueueIdentity {
        QueueIdentity {
            queue,
            context,
            device: Arc::new(DeviceKey {
                name: device.to_string(),
                vendor: 0x10de,
                device: 1,
                backend: wgpu::Backend::Vulkan,
            }),
        }
    }

    #[test]
    fn test_classification_levels() {
        let base = identity(1, 1, "gpu0");

        assert_eq!(
            base.compatibility(&identity(1, 1, "gpu0")),
            Compatibility::SameQueue
        );
        assert_eq!(
            base.compatibility(&identity(2, 1, "gpu0")),
            Compatibility::SameContext
        );
        assert_eq!(
            base.compatibility(&identity(3, 2, "gpu0")),
            Compatibility::SameDevice
        );
        assert_eq!(
            base.compatibility(&identity(4, 3, "gpu1")),
            Compatibility::Unrelated
        );
    }

    #[test]
    fn test_queues_on_one_context() {
        let Ok(ctx) = ComputeContext::new() else {
            eprintln!("Skipping GPU test: no GPU available");
            return;
        };
        let a = ctx.create_queue();
        let b = ctx.create_queue();

        assert_eq!(a.compatibility(&a.clone()), Compatibility::SameQueue);
        assert_eq!(a.compatibility(&b), Compatibility::SameContext);
        assert!(!a.has_pending_work());
        assert!(a.finish().is_ok());
    }

    #[test]
    fn test_read_buffer() {
        use wgpu::util::DeviceExt;

        let Ok(ctx) = ComputeContext::new() else {
            eprintln!("Skipping GPU test: no GPU available");
            return;
        };
        let queue = ctx.create_queue();
        let data: Vec<u32> = (0..64).collect();
        let buffer = ctx
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("test_buffer"),
                contents: bytemuck::cast_slice(&data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });

        let bytes = queue.read_buffer(&buffer, 64 * 4).unwrap();
        let back: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(back, data);
        assert!(!queue.has_pending_work());
    }
}
