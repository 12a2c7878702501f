//! GPU pipelines and buffers for one device pose estimator.

use bytemuck::{Pod, Zeroable};

use crate::common::{Error, RejectionCounts, Result};
use crate::compute::{buffer_entry, ComputeQueue, Program};
use crate::frame::{CameraIntrinsics, PointNormal};
use crate::icp::device::ReductionPlan;
use crate::icp::tracking::IterationFrame;
use crate::math::{NormalEquations, PACKED_LEN};

const CORRESPOND_WORKGROUP: u32 = 8;
const REJECTION_REASONS: usize = 4;
// 27 reduced floats followed by the rejection counters
const RESULT_WORDS: usize = PACKED_LEN + REJECTION_REASONS + 1;
const RESULT_COUNTERS_OFFSET: u64 = (PACKED_LEN * 4) as u64;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CorrespondParams {
    to_previous: [[f32; 4]; 4],
    to_global: [[f32; 4]; 4],
    k: [[f32; 4]; 3],
    width: u32,
    height: u32,
    epsilon_distance: f32,
    epsilon_angle: f32,
}

impl CorrespondParams {
    fn new(frame: &IterationFrame) -> Self {
        let k = frame.k.as_mat3();
        Self {
            to_previous: frame.to_previous.as_mat4().to_cols_array_2d(),
            to_global: frame.to_global.as_mat4().to_cols_array_2d(),
            k: [
                k.x_axis.extend(0.0).to_array(),
                k.y_axis.extend(0.0).to_array(),
                k.z_axis.extend(0.0).to_array(),
            ],
            width: frame.width as u32,
            height: frame.height as u32,
            epsilon_distance: frame.epsilon_distance as f32,
            epsilon_angle: frame.epsilon_angle as f32,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FinishParams {
    count: u32,
    _padding: [u32; 3],
}

/// Fails when a storage buffer of `size` bytes cannot be created or bound whole.
fn check_storage_size(device: &wgpu::Device, what: &str, size: u64) -> Result<()> {
    let limits = device.limits();
    let max = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if size > max {
        return Err(Error::Config(format!(
            "{} needs {} bytes, device storage buffers are limited to {} bytes",
            what, size, max
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub(super) struct IcpKernels {
    camera: CameraIntrinsics,
    plan: ReductionPlan,

    correspond: wgpu::ComputePipeline,
    reduce: wgpu::ComputePipeline,
    finish: wgpu::ComputePipeline,
    correspond_layout: wgpu::BindGroupLayout,

    params: wgpu::Buffer,
    terms: wgpu::Buffer,
    counters: wgpu::Buffer,
    results: wgpu::Buffer,

    // [terms -> partials, partials -> terms]
    reduce_groups: [wgpu::BindGroup; 2],
    finish_group: wgpu::BindGroup,
}

impl IcpKernels {
    pub fn new(queue: &ComputeQueue, camera: CameraIntrinsics, block_size: u32) -> Result<Self> {
        let device = queue.device();
        let pixels = camera.pixel_count();
        let plan = ReductionPlan::new(pixels, block_size as usize);

        let max_groups = device.limits().max_compute_workgroups_per_dimension as usize;
        if let Some(&groups) = plan.passes().first() {
            if groups > max_groups {
                return Err(Error::Config(format!(
                    "reduction block size {} needs {} workgroups, device allows {}",
                    block_size, groups, max_groups
                )));
            }
        }

        check_storage_size(device, "ICP term buffer", (pixels * PACKED_LEN * 4) as u64)?;
        check_storage_size(
            device,
            "point-normal map",
            (pixels * std::mem::size_of::<PointNormal>()) as u64,
        )?;

        let correspond_program =
            Program::build(device, "icp_correspond", include_str!("correspond.wgsl"))?;
        let reduce_source =
            include_str!("reduce.wgsl").replace("{{BLOCK_SIZE}}", &block_size.to_string());
        let reduce_program = Program::build(device, "icp_reduce", &reduce_source)?;

        let storage_ro = wgpu::BufferBindingType::Storage { read_only: true };
        let storage_rw = wgpu::BufferBindingType::Storage { read_only: false };

        let correspond_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("icp_correspond_bind_group_layout"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                // Current map (camera space)
                buffer_entry(1, storage_ro),
                // Previous predicted map (global space)
                buffer_entry(2, storage_ro),
                // Per-pixel terms
                buffer_entry(3, storage_rw),
                // Rejection counters
                buffer_entry(4, storage_rw),
            ],
        });
        let reduce_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("icp_reduce_bind_group_layout"),
            entries: &[
                buffer_entry(0, storage_ro),
                buffer_entry(1, storage_rw),
                buffer_entry(2, wgpu::BufferBindingType::Uniform),
            ],
        });

        let correspond = correspond_program.kernel(device, "correspond", &[&correspond_layout])?;
        let reduce = reduce_program.kernel(device, "reduce", &[&reduce_layout])?;
        let finish = reduce_program.kernel(device, "finish", &[&reduce_layout])?;

        let storage_usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let create = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let params = create(
            "icp_params",
            std::mem::size_of::<CorrespondParams>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let finish_params = create(
            "icp_finish_params",
            std::mem::size_of::<FinishParams>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let terms = create("icp_terms", (pixels * PACKED_LEN * 4) as u64, storage_usage);
        let partial_len = plan.passes().first().copied().unwrap_or(1);
        let partials = create("icp_partials", (partial_len * PACKED_LEN * 4) as u64, storage_usage);
        let counters = create("icp_counters", (REJECTION_REASONS * 4) as u64, storage_usage);
        let results = create("icp_results", (RESULT_WORDS * 4) as u64, storage_usage);

        queue.write_buffer(
            &finish_params,
            0,
            bytemuck::bytes_of(&FinishParams {
                count: plan.remainder() as u32,
                _padding: [0; 3],
            }),
        );

        let reduce_group = |label: &str, src: &wgpu::Buffer, dst: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &reduce_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: src.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: dst.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: finish_params.as_entire_binding(),
                    },
                ],
            })
        };

        let reduce_groups = [
            reduce_group("icp_reduce_forward", &terms, &partials),
            reduce_group("icp_reduce_backward", &partials, &terms),
        ];
        let last = if plan.ends_in_secondary() {
            &partials
        } else {
            &terms
        };
        let finish_group = reduce_group("icp_finish", last, &results);

        Ok(Self {
            camera,
            plan,
            correspond,
            reduce,
            finish,
            correspond_layout,
            params,
            terms,
            counters,
            results,
            reduce_groups,
            finish_group,
        })
    }

    pub fn plan(&self) -> &ReductionPlan {
        &self.plan
    }

    /// Binds a pair of input maps for the correspondence kernel.
    pub fn bind_maps(
        &self,
        device: &wgpu::Device,
        current: &wgpu::Buffer,
        previous: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("icp_correspond_bind_group"),
            layout: &self.correspond_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: current.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: previous.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.terms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.counters.as_entire_binding(),
                },
            ],
        })
    }

    /// Runs association, reduction and readback for one ICP iteration.
    pub fn run(
        &self,
        queue: &ComputeQueue,
        maps: &wgpu::BindGroup,
        frame: &IterationFrame,
    ) -> Result<(NormalEquations, RejectionCounts)> {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&CorrespondParams::new(frame)));

        let mut encoder = queue.create_command_encoder("icp_iteration_encoder");
        encoder.clear_buffer(&self.counters, 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("icp_correspond_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.correspond);
            pass.set_bind_group(0, maps, &[]);
            pass.dispatch_workgroups(
                (self.camera.width as u32).div_ceil(CORRESPOND_WORKGROUP),
                (self.camera.height as u32).div_ceil(CORRESPOND_WORKGROUP),
                1,
            );
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("icp_reduce_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.reduce);
            for (i, &groups) in self.plan.passes().iter().enumerate() {
                pass.set_bind_group(0, &self.reduce_groups[i % 2], &[]);
                pass.dispatch_workgroups(groups as u32, PACKED_LEN as u32, 1);
            }
            pass.set_pipeline(&self.finish);
            pass.set_bind_group(0, &self.finish_group, &[]);
            pass.dispatch_workgroups(PACKED_LEN as u32, 1, 1);
        }
        encoder.copy_buffer_to_buffer(
            &self.counters,
            0,
            &self.results,
            RESULT_COUNTERS_OFFSET,
            (REJECTION_REASONS * 4) as u64,
        );
        queue.submit(encoder.finish());

        let bytes = queue.read_buffer(&self.results, (RESULT_WORDS * 4) as u64)?;
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let packed: [f32; PACKED_LEN] = std::array::from_fn(|i| f32::from_bits(words[i]));
        let counts = &words[PACKED_LEN..PACKED_LEN + REJECTION_REASONS];
        let rejected = RejectionCounts {
            invalid: counts[0] as usize,
            out_of_bounds: counts[1] as usize,
            distance: counts[2] as usize,
            angle: counts[3] as usize,
        };
        let accepted = self.camera.pixel_count().saturating_sub(rejected.total());

        Ok((NormalEquations::from_packed(&packed, accepted), rejected))
    }
}
