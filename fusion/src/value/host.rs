use bytemuck::Pod;

use crate::value::PipelineValue;

/// Pipeline value backed purely by host memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostValue<T> {
    data: Vec<T>,
}

impl<T: Pod> HostValue<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }

    /// Reuses a recycled host allocation, or starts empty when `recycled` is
    /// absent or device-resident.
    pub fn recycle(recycled: Option<PipelineValue<T>>) -> Self {
        match recycled {
            Some(PipelineValue::Host(mut value)) => {
                value.data.clear();
                value
            }
            _ => Self { data: Vec::new() },
        }
    }

    pub fn get(&self) -> &[T] {
        &self.data
    }

    pub fn get_mut(&mut self) -> &mut Vec<T> {
        &mut self.data
    }

    /// Replaces the contents.
    pub fn emplace(&mut self, data: Vec<T>) {
        self.data = data;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data
    }
}
