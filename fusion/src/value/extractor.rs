use bytemuck::Pod;
use strum_macros::Display;

use crate::common::Result;
use crate::compute::{Compatibility, ComputeQueue};
use crate::value::{DeviceValue, PipelineValue};

/// How an [`Extraction`] obtained its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Transfer {
    /// The value's own buffer, already on the target queue.
    Resident,
    /// The value's own buffer, after draining the queue that owns it.
    Synchronized,
    /// Device data copied through the host into a target-side buffer.
    Copied,
    /// Host data uploaded into a target-side buffer.
    Uploaded,
}

/// A buffer usable by kernels enqueued on the extractor's queue.
#[derive(Debug)]
pub struct Extraction<'a> {
    buffer: &'a wgpu::Buffer,
    len: usize,
    transfer: Transfer,
}

impl<'a> Extraction<'a> {
    pub fn buffer(&self) -> &'a wgpu::Buffer {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }

    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'a> {
        self.buffer.as_entire_binding()
    }
}

/// Produces device buffers for a fixed target queue from arbitrary pipeline
/// values, transferring only when the value is not reachable from it.
///
/// Values that have to be transferred land in a scratch buffer owned by the
/// extractor and reused across calls.
#[derive(Debug)]
pub struct DeviceValueExtractor<T: Pod> {
    queue: ComputeQueue,
    scratch: Option<DeviceValue<T>>,
}

impl<T: Pod> DeviceValueExtractor<T> {
    pub fn new(queue: &ComputeQueue) -> Self {
        Self {
            queue: queue.clone(),
            scratch: None,
        }
    }

    pub fn queue(&self) -> &ComputeQueue {
        &self.queue
    }

    pub fn extract<'a>(&'a mut self, value: &'a mut PipelineValue<T>) -> Result<Extraction<'a>> {
        let compatibility = value
            .as_device()
            .map(|device| device.queue().compatibility(&self.queue));

        match (compatibility, value) {
            (Some(Compatibility::SameQueue), PipelineValue::Device(device)) => Ok(Extraction {
                buffer: device.buffer(),
                len: device.len(),
                transfer: Transfer::Resident,
            }),
            (Some(Compatibility::SameContext), PipelineValue::Device(device)) => {
                device.queue().finish()?;
                Ok(Extraction {
                    buffer: device.buffer(),
                    len: device.len(),
                    transfer: Transfer::Synchronized,
                })
            }
            (compatibility, value) => {
                let transfer = match compatibility {
                    Some(_) => Transfer::Copied,
                    None => Transfer::Uploaded,
                };
                let data = value.get()?;
                let scratch = self.stage(data);
                Ok(Extraction {
                    buffer: scratch.buffer(),
                    len: scratch.len(),
                    transfer,
                })
            }
        }
    }

    fn stage(&mut self, data: &[T]) -> &DeviceValue<T> {
        let queue = &self.queue;
        let scratch = self
            .scratch
            .get_or_insert_with(|| DeviceValue::new(queue, data.len()));
        scratch.write(data);
        scratch
    }
}
