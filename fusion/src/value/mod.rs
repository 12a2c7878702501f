//! Pipeline values: stage outputs that live in host or device memory and are
//! synchronised lazily between the two.

mod device;
mod extractor;
mod host;

use bytemuck::Pod;

pub use self::device::DeviceValue;
pub use self::extractor::{DeviceValueExtractor, Extraction, Transfer};
pub use self::host::HostValue;

use crate::common::Result;

/// A stage output held either purely on the host or in a device buffer.
///
/// Values are owned by exactly one stage at a time and moved between stages.
#[derive(Debug)]
pub enum PipelineValue<T: Pod> {
    Host(HostValue<T>),
    Device(DeviceValue<T>),
}

impl<T: Pod> PipelineValue<T> {
    pub fn from_vec(data: Vec<T>) -> Self {
        PipelineValue::Host(HostValue::new(data))
    }

    /// Read-only host view, downloading first if the device copy is newer.
    ///
    /// `&mut self` only covers materialising the host cache; the logical
    /// value is unchanged and repeated calls return identical data.
    pub fn get(&mut self) -> Result<&[T]> {
        match self {
            PipelineValue::Host(value) => Ok(value.get()),
            PipelineValue::Device(value) => value.get(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PipelineValue::Host(value) => value.len(),
            PipelineValue::Device(value) => value.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_device(&self) -> bool {
        matches!(self, PipelineValue::Device(_))
    }

    /// Device-resident representation, if any.
    pub fn as_device(&self) -> Option<&DeviceValue<T>> {
        match self {
            PipelineValue::Device(value) => Some(value),
            PipelineValue::Host(_) => None,
        }
    }

    pub fn as_device_mut(&mut self) -> Option<&mut DeviceValue<T>> {
        match self {
            PipelineValue::Device(value) => Some(value),
            PipelineValue::Host(_) => None,
        }
    }
}

impl<T: Pod> From<HostValue<T>> for PipelineValue<T> {
    fn from(value: HostValue<T>) -> Self {
        PipelineValue::Host(value)
    }
}

impl<T: Pod> From<DeviceValue<T>> for PipelineValue<T> {
    fn from(value: DeviceValue<T>) -> Self {
        PipelineValue::Device(value)
    }
}

impl<T: Pod> From<Vec<T>> for PipelineValue<T> {
    fn from(data: Vec<T>) -> Self {
        PipelineValue::from_vec(data)
    }
}
