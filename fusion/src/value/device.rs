use std::borrow::Cow;
use std::mem::size_of;

use bytemuck::Pod;

use crate::common::Result;
use crate::compute::ComputeQueue;

/// Pipeline value backed by a device buffer on a specific queue.
///
/// The host view is cached and only re-downloaded after the buffer was
/// handed out mutably. Uploading through [`DeviceValue::write`] keeps the
/// cache valid, so "upload once, run many kernels, download lazily" costs a
/// single transfer each way.
#[derive(Debug)]
pub struct DeviceValue<T: Pod> {
    queue: ComputeQueue,
    buffer: wgpu::Buffer,
    len: usize,
    capacity: usize,
    // None when the device copy may be newer than the host copy
    host: Option<Vec<T>>,
}

impl<T: Pod> DeviceValue<T> {
    /// Allocates a zero-initialised value of `len` elements.
    pub fn new(queue: &ComputeQueue, len: usize) -> Self {
        Self {
            queue: queue.clone(),
            buffer: create_buffer::<T>(queue, len),
            len,
            capacity: len,
            host: Some(vec![T::zeroed(); len]),
        }
    }

    /// Allocates and uploads `data`.
    pub fn from_slice(queue: &ComputeQueue, data: &[T]) -> Self {
        let mut value = Self::new(queue, data.len());
        value.write(data);
        value
    }

    pub fn queue(&self) -> &ComputeQueue {
        &self.queue
    }

    /// Device buffer for read-only use by kernels.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Device buffer for kernels that write to it.
    ///
    /// `&mut self` is intentional: it invalidates the cached host view so
    /// the next [`DeviceValue::get`] downloads the device contents.
    pub fn buffer_mut(&mut self) -> &wgpu::Buffer {
        self.host = None;
        &self.buffer
    }

    /// Uploads `data`, growing the buffer if needed.
    pub fn write(&mut self, data: &[T]) {
        self.resize(data.len());
        if !data.is_empty() {
            self.queue.write_buffer(&self.buffer, 0, &padded_bytes(data));
        }

        let mut host = self.host.take().unwrap_or_default();
        host.clear();
        host.extend_from_slice(data);
        self.host = Some(host);
    }

    /// Sets the element count. Contents are unspecified afterwards.
    pub fn resize(&mut self, len: usize) {
        if len > self.capacity {
            self.buffer = create_buffer::<T>(&self.queue, len);
            self.capacity = len;
        }
        self.len = len;
        self.host = None;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_dirty(&self) -> bool {
        self.host.is_none()
    }

    /// Host view, downloaded only if the device copy changed since the last
    /// download or upload.
    pub fn get(&mut self) -> Result<&[T]> {
        let host = match self.host.take() {
            Some(host) => host,
            None => self.download()?,
        };
        let host: &[T] = self.host.insert(host);
        Ok(host)
    }

    fn download(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.len];
        if self.len == 0 {
            return Ok(out);
        }

        let bytes = self.queue.read_buffer(&self.buffer, buffer_size::<T>(self.len))?;
        let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut out);
        let n = dst.len();
        dst.copy_from_slice(&bytes[..n]);

        Ok(out)
    }
}

/// Byte size of a buffer holding `len` elements, copy-aligned and non-zero.
pub(crate) fn buffer_size<T>(len: usize) -> u64 {
    let bytes = (len * size_of::<T>()).max(1) as u64;
    bytes.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

fn create_buffer<T>(queue: &ComputeQueue, len: usize) -> wgpu::Buffer {
    queue.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("pipeline_value_buffer"),
        size: buffer_size::<T>(len),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn padded_bytes<T: Pod>(data: &[T]) -> Cow<'_, [u8]> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let size = buffer_size::<T>(data.len()) as usize;
    if bytes.len() == size {
        Cow::Borrowed(bytes)
    } else {
        let mut padded = bytes.to_vec();
        padded.resize(size, 0);
        Cow::Owned(padded)
    }
}
