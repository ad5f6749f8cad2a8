use std::sync::Arc;

use horizon_core::{Camera, FrameBuffer, HorizonError, HorizonResult, RenderUniforms};

use crate::gpu::GpuContext;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const WORKGROUP_EDGE: u32 = 8;

fn align_to(v: u32, align: u32) -> u32 {
    v.div_ceil(align) * align
}

/// The storage texture the kernel writes plus its host-visible image buffer.
struct Surface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Readback buffer holding one frame with rows padded to the copy alignment.
    image_buffer: wgpu::Buffer,
    padded_row: u32,
    width: u32,
    height: u32,
}

impl Surface {
    fn allocate(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_row = align_to(
            width * FrameBuffer::BYTES_PER_PIXEL as u32,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        );
        let image_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("render_target_image_buffer"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            image_buffer,
            padded_row,
            width,
            height,
        }
    }
}

/// Equirectangular sky sampled by escaping rays.
struct Background {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// `None` for the 1×1 placeholder bound when no sky is set.
    size: Option<(u32, u32)>,
}

impl Background {
    fn upload(gpu: &GpuContext, rgba: &[u8], width: u32, height: u32) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target_background"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );
        texture
    }

    fn placeholder(gpu: &GpuContext) -> Self {
        let texture = Self::upload(gpu, &[0, 0, 0, 255], 1, 1);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
            size: None,
        }
    }
}

/// Off-screen image written by the lensing kernel.
///
/// Owns its pipeline, uniform buffer, texture and image buffer; shares the
/// device through `Arc<GpuContext>`. Mutating calls take `&mut self`, so a
/// target is never driven from two threads at once.
pub struct RenderTarget {
    gpu: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    background: Background,
    surface: Option<Surface>,
    bind_group: Option<wgpu::BindGroup>,
}

impl RenderTarget {
    /// Compile the render pipeline on `gpu`.
    ///
    /// The target has no size until the first successful [`resize`](Self::resize).
    pub fn new(gpu: Arc<GpuContext>) -> HorizonResult<Self> {
        let (pipeline, bind_group_layout, uniform_buffer, sampler) = gpu
            .scoped(|device| {
                let shader = device.create_shader_module(wgpu::include_wgsl!("shaders/render.wgsl"));

                let bind_group_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("render_target_bind_group_layout"),
                        entries: &[
                            wgpu::BindGroupLayoutEntry {
                                binding: 0,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::StorageTexture {
                                    access: wgpu::StorageTextureAccess::WriteOnly,
                                    format: TARGET_FORMAT,
                                    view_dimension: wgpu::TextureViewDimension::D2,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 1,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Buffer {
                                    ty: wgpu::BufferBindingType::Uniform,
                                    has_dynamic_offset: false,
                                    min_binding_size: wgpu::BufferSize::new(
                                        RenderUniforms::SIZE as u64,
                                    ),
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 2,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Texture {
                                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                    view_dimension: wgpu::TextureViewDimension::D2,
                                    multisampled: false,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 3,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                                count: None,
                            },
                        ],
                    });

                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("render_target_pipeline_layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("render_target_pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: "main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                });

                let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("render_target_uniforms"),
                    size: RenderUniforms::SIZE as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("render_target_background_sampler"),
                    address_mode_u: wgpu::AddressMode::Repeat,
                    address_mode_v: wgpu::AddressMode::ClampToEdge,
                    mag_filter: wgpu::FilterMode::Linear,
                    min_filter: wgpu::FilterMode::Linear,
                    ..Default::default()
                });

                (pipeline, bind_group_layout, uniform_buffer, sampler)
            })
            .map_err(|e| {
                HorizonError::Initialization(format!("render pipeline failed to compile: {e}"))
            })?;

        let background = Background::placeholder(&gpu);

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            sampler,
            background,
            surface: None,
            bind_group: None,
        })
    }

    fn create_bind_group(&self, target_view: &wgpu::TextureView) -> wgpu::BindGroup {
        self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("render_target_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(target_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.background.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn rebuild_bind_group(&mut self) {
        self.bind_group = self
            .surface
            .as_ref()
            .map(|surface| self.create_bind_group(&surface.view));
    }

    /// Reallocate the texture and image buffer to `width × height`.
    ///
    /// On failure the previous texture, buffer and dimensions stay exactly
    /// as they were. Resizing to the current dimensions is a no-op.
    pub fn resize(&mut self, width: u32, height: u32) -> HorizonResult<()> {
        if width == 0 || height == 0 {
            return Err(HorizonError::resize(width, height, "dimensions must be positive"));
        }
        let max = self.gpu.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(HorizonError::resize(
                width,
                height,
                format!("exceeds device limit of {max}"),
            ));
        }
        if let Some(current) = &self.surface {
            if current.width == width && current.height == height {
                return Ok(());
            }
        }

        let surface = self
            .gpu
            .scoped(|device| Surface::allocate(device, width, height))
            .map_err(|e| HorizonError::resize(width, height, e.to_string()))?;

        tracing::debug!(width, height, "render target resized");
        self.bind_group = Some(self.create_bind_group(&surface.view));
        self.surface = Some(surface);
        Ok(())
    }

    /// Dispatch the kernel with an opaque uniform blob.
    ///
    /// The blob must be exactly [`RenderUniforms::SIZE`] bytes. Returns once
    /// the frame has been written to the texture.
    pub fn render(&mut self, bytes: &[u8]) -> HorizonResult<()> {
        let (Some(surface), Some(bind_group)) = (&self.surface, &self.bind_group) else {
            return Err(HorizonError::NotSized);
        };
        if bytes.len() != RenderUniforms::SIZE {
            return Err(HorizonError::UniformSize {
                expected: RenderUniforms::SIZE,
                actual: bytes.len(),
            });
        }

        self.gpu.queue.write_buffer(&self.uniform_buffer, 0, bytes);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_target_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("render_target_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(
                surface.width.div_ceil(WORKGROUP_EDGE),
                surface.height.div_ceil(WORKGROUP_EDGE),
                1,
            );
        }

        let index = self.gpu.queue.submit(Some(encoder.finish()));
        self.gpu.wait_for(index);
        Ok(())
    }

    pub fn render_uniforms(&mut self, uniforms: &RenderUniforms) -> HorizonResult<()> {
        self.render(uniforms.as_bytes())
    }

    /// Render from a camera at the current size and background.
    pub fn render_camera(&mut self, camera: &Camera) -> HorizonResult<()> {
        if self.surface.is_none() {
            return Err(HorizonError::NotSized);
        }
        let uniforms = camera
            .uniforms(self.width(), self.height())?
            .with_background(self.background.size);
        self.render_uniforms(&uniforms)
    }

    /// Install an RGBA8 equirectangular sky for escaping rays.
    pub fn set_background(&mut self, rgba: &[u8], width: u32, height: u32) -> HorizonResult<()> {
        if width == 0 || height == 0 {
            return Err(HorizonError::invalid("background dimensions must be positive"));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(HorizonError::invalid(format!(
                "background is {} bytes, expected {expected} for {width}x{height}",
                rgba.len()
            )));
        }

        let gpu = self.gpu.clone();
        let texture = gpu
            .scoped(|_| Background::upload(&gpu, rgba, width, height))
            .map_err(|e| HorizonError::Gpu(format!("background upload failed: {e}")))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.background = Background {
            _texture: texture,
            view,
            size: Some((width, height)),
        };
        self.rebuild_bind_group();
        Ok(())
    }

    pub fn clear_background(&mut self) {
        self.background = Background::placeholder(&self.gpu);
        self.rebuild_bind_group();
    }

    pub fn background_size(&self) -> Option<(u32, u32)> {
        self.background.size
    }

    /// Copy the current texture contents to host memory.
    pub fn read_frame(&mut self) -> HorizonResult<FrameBuffer> {
        let surface = self.surface.as_ref().ok_or(HorizonError::NotSized)?;

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_target_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &surface.image_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(surface.padded_row),
                    rows_per_image: Some(surface.height),
                },
            },
            wgpu::Extent3d {
                width: surface.width,
                height: surface.height,
                depth_or_array_layers: 1,
            },
        );
        let index = self.gpu.queue.submit(Some(encoder.finish()));

        let slice = surface.image_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.gpu.wait_for(index);

        rx.recv()
            .map_err(|_| HorizonError::Gpu("frame readback callback dropped".into()))?
            .map_err(|e| HorizonError::Gpu(format!("failed to map frame readback: {e}")))?;

        let frame = {
            let data = slice.get_mapped_range();
            FrameBuffer::from_padded_rows(
                surface.width,
                surface.height,
                surface.padded_row as usize,
                &data,
            )
        };
        surface.image_buffer.unmap();
        Ok(frame)
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.gpu.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu.queue
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn texture(&self) -> Option<&wgpu::Texture> {
        self.surface.as_ref().map(|s| &s.texture)
    }

    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.surface.as_ref().map(|s| &s.view)
    }

    pub fn image_buffer(&self) -> Option<&wgpu::Buffer> {
        self.surface.as_ref().map(|s| &s.image_buffer)
    }

    /// Current width, 0 before the first successful resize.
    pub fn width(&self) -> u32 {
        self.surface.as_ref().map_or(0, |s| s.width)
    }

    /// Current height, 0 before the first successful resize.
    pub fn height(&self) -> u32 {
        self.surface.as_ref().map_or(0, |s| s.height)
    }
}
