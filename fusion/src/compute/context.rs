use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::info;

use crate::common::{Error, Result};
use crate::compute::ComputeQueue;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the physical device a context was opened on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub backend: wgpu::Backend,
}

impl DeviceKey {
    fn from_info(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            vendor: info.vendor,
            device: info.device,
            backend: info.backend,
        }
    }
}

/// A logical device with its hardware queue. Buffers created in one context
/// are not visible to another, even on the same physical device.
#[derive(Debug, Clone)]
pub struct ComputeContext {
    id: u64,
    device_key: Arc<DeviceKey>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl ComputeContext {
    /// Opens a context on the preferred high-performance adapter.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| Error::Device(format!("failed to find suitable adapter: {}", e)))?;

        Self::from_adapter(&adapter)
    }

    /// Opens a fresh context on `adapter`. Each call yields a distinct context.
    pub fn from_adapter(adapter: &wgpu::Adapter) -> Result<Self> {
        let info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("fusion_device"),
            ..Default::default()
        }))
        .map_err(|e| Error::Device(format!("failed to create device: {}", e)))?;

        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            "Opened compute context {} on {} ({:?})",
            id, info.name, info.backend
        );

        Ok(Self {
            id,
            device_key: Arc::new(DeviceKey::from_info(&info)),
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Creates a new logical queue submitting through this context.
    pub fn create_queue(&self) -> ComputeQueue {
        ComputeQueue::new(self)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device_key(&self) -> &Arc<DeviceKey> {
        &self.device_key
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Blocks until every submission on this context has completed.
    pub fn wait(&self) -> Result<()> {
        self.device.poll(wgpu::PollType::Wait)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let result = ComputeContext::new();
        if let Err(e) = &result {
            eprintln!(
                "Compute context creation failed (expected on headless systems): {}",
                e
            );
            return;
        }
        let ctx = result.unwrap();
        assert!(ctx.id() > 0);
        assert!(ctx.wait().is_ok());
    }

    #[test]
    fn test_contexts_have_distinct_ids() {
        let Ok(a) = ComputeContext::new() else {
            eprintln!("Skipping GPU test: no GPU available");
            return;
        };
        let Ok(b) = ComputeContext::new() else {
            eprintln!("Skipping GPU test: no GPU available");
            return;
        };
        assert_ne!(a.id(), b.id());
        assert_eq!(a.device_key(), b.device_key());
    }
}
