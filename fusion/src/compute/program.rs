use std::fmt::Write;

use crate::common::{Error, Result};

/// A compiled WGSL module from which compute kernels are created.
///
/// Compilation and pipeline creation run inside a validation error scope so
/// failures come back as [`Error::Build`] with the backend's diagnostics
/// instead of reaching the device's uncaptured-error handler.
#[derive(Debug)]
pub struct Program {
    label: String,
    module: wgpu::ShaderModule,
}

impl Program {
    pub fn build(device: &wgpu::Device, label: &str, source: &str) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let scope_error = pollster::block_on(device.pop_error_scope());

        if let Some(err) = scope_error {
            let mut log = err.to_string();
            let info = pollster::block_on(module.get_compilation_info());
            for message in info.messages {
                let _ = write!(log, "\n{:?}: {}", message.message_type, message.message);
                if let Some(location) = message.location {
                    let _ = write!(
                        log,
                        " (line {}, column {})",
                        location.line_number, location.line_position
                    );
                }
            }
            return Err(Error::Build { log });
        }

        Ok(Self {
            label: label.to_string(),
            module,
        })
    }

    /// Creates the compute pipeline for `entry_point` with an explicit layout.
    pub fn kernel(
        &self,
        device: &wgpu::Device,
        entry_point: &str,
        bind_group_layouts: &[&wgpu::BindGroupLayout],
    ) -> Result<wgpu::ComputePipeline> {
        let label = format!("{}_{}", self.label, entry_point);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts,
            ..Default::default()
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&label),
            layout: Some(&layout),
            module: &self.module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(Error::Build {
                log: format!("{}: {}", label, err),
            }),
            None => Ok(pipeline),
        }
    }
}

/// Bind group layout entry for a compute-visible buffer.
pub(crate) fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
