//! GPU ray integrator.
//!
//! Uploads the caller's ray slice into a storage buffer, runs
//! `geodesic.wgsl` with one invocation per ray, and copies the result back
//! into the same slice before returning.

use std::sync::Arc;

use horizon_core::{HorizonError, HorizonResult, RayIntegrator, RayState, StepParams};
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;

const WORKGROUP_SIZE: u32 = 64;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuStepParams {
    d_lambda: f64,
    rs: f64,
    count: u32,
    steps: u32,
    row_stride: u32,
    _pad: u32,
}

/// Dispatch grid for `count` invocations under a per-dimension limit.
///
/// Returns `(groups_x, groups_y, row_stride)` where `row_stride` is the
/// number of invocations per grid row.
fn dispatch_grid(count: u32, max_per_dim: u32) -> (u32, u32, u32) {
    let groups = count.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(max_per_dim.max(1));
    let y = groups.div_ceil(x);
    (x, y, x * WORKGROUP_SIZE)
}

/// Largest number of rays one storage binding can hold.
fn batch_capacity(limits: &wgpu::Limits) -> usize {
    let bytes = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    ((bytes / RayState::SIZE as u64) as usize).max(1)
}

/// Parallel integration backend running on the device.
pub struct GpuIntegrator {
    gpu: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl GpuIntegrator {
    pub fn new(gpu: Arc<GpuContext>) -> HorizonResult<Self> {
        if !gpu.supports_f64() {
            return Err(HorizonError::Unsupported(format!(
                "adapter '{}' has no f64 shader support",
                gpu.adapter_name()
            )));
        }

        let (pipeline, bind_group_layout) = gpu
            .scoped(|device| {
                let shader = device.create_shader_module(wgpu::include_wgsl!("shaders/geodesic.wgsl"));

                let bind_group_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("geodesic_bind_group_layout"),
                        entries: &[
                            wgpu::BindGroupLayoutEntry {
                                binding: 0,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Buffer {
                                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                                    has_dynamic_offset: false,
                                    min_binding_size: None,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 1,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Buffer {
                                    ty: wgpu::BufferBindingType::Uniform,
                                    has_dynamic_offset: false,
                                    min_binding_size: None,
                                },
                                count: None,
                            },
                        ],
                    });

                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("geodesic_pipeline_layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("geodesic_pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: "main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                });

                (pipeline, bind_group_layout)
            })
            .map_err(|e| {
                HorizonError::Initialization(format!("geodesic pipeline failed to compile: {e}"))
            })?;

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    fn run_batch(&self, rays: &mut [RayState], params: &StepParams) -> HorizonResult<()> {
        let device = &self.gpu.device;
        let limits = self.gpu.limits();
        let count = rays.len() as u32;
        let (groups_x, groups_y, row_stride) =
            dispatch_grid(count, limits.max_compute_workgroups_per_dimension);

        tracing::debug!(count, groups_x, groups_y, steps = params.steps, "dispatching geodesic batch");

        let size = (rays.len() * RayState::SIZE) as u64;
        let storage = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("geodesic_rays"),
            contents: bytemuck::cast_slice(rays),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("geodesic_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniforms = GpuStepParams {
            d_lambda: params.d_lambda,
            rs: params.rs,
            count,
            steps: params.steps,
            row_stride,
            _pad: 0,
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("geodesic_params"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("geodesic_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: storage.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("geodesic_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("geodesic_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&storage, 0, &readback, 0, size);

        let index = self.gpu.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.gpu.wait_for(index);

        rx.recv()
            .map_err(|_| HorizonError::Gpu("ray readback callback dropped".into()))?
            .map_err(|e| HorizonError::Gpu(format!("failed to map ray readback: {e}")))?;

        {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice_mut::<RayState, u8>(rays).copy_from_slice(&data);
        }
        readback.unmap();
        Ok(())
    }
}

impl RayIntegrator for GpuIntegrator {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn advance(&self, rays: &mut [RayState], params: &StepParams) -> HorizonResult<()> {
        params.validate()?;
        if rays.is_empty() || params.is_noop() {
            return Ok(());
        }

        let capacity = batch_capacity(&self.gpu.limits());
        for batch in rays.chunks_mut(capacity) {
            self.run_batch(batch, params)?;
        }
        Ok(())
    }
}
