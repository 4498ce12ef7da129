//! wgpu-backed presentation surface.
//!
//! Each surface renders into an owned target texture the size of the
//! plugin's visible region. The host composites that texture (for example
//! through `egui_wgpu::Renderer::register_native_texture`) and reads the
//! current view from [`SurfaceTarget`]. A swap submits the recorded commands
//! and reports completion from `Queue::on_submitted_work_done` over a
//! crossbeam channel, which the host drains with
//! `PlayerInstance::pump_swap_completions`.

use std::borrow::Cow;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use overlay_video_core::{
    Color, FrameBuffer, PlayerError, PresentationSurface, SwapCompletion, SwapTicket,
};
use parking_lot::Mutex;

use crate::surface::SurfaceProvider;
use crate::upload::{prepare_rows, TexelLayout};

/// The target texture currently backing the plugin's surface.
#[derive(Clone)]
pub struct TargetView {
    pub view: Arc<wgpu::TextureView>,
    pub size: (u32, u32),
    /// Bumped whenever the texture is recreated
    pub revision: u64,
}

/// Shared slot the host reads the current target from.
#[derive(Clone, Default)]
pub struct SurfaceTarget {
    inner: Arc<Mutex<Option<TargetView>>>,
}

impl SurfaceTarget {
    pub fn current(&self) -> Option<TargetView> {
        self.inner.lock().clone()
    }

    fn publish(&self, view: Arc<wgpu::TextureView>, size: (u32, u32)) {
        let mut slot = self.inner.lock();
        let revision = slot.as_ref().map_or(1, |t| t.revision + 1);
        *slot = Some(TargetView {
            view,
            size,
            revision,
        });
    }
}

/// Creates [`WgpuSurface`]s on a shared device.
pub struct WgpuSurfaceProvider {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    completion_tx: Sender<SwapCompletion>,
    completion_rx: Receiver<SwapCompletion>,
    target: SurfaceTarget,
}

impl WgpuSurfaceProvider {
    /// `format` is the color format the host composites with.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
    ) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            device,
            queue,
            format,
            completion_tx,
            completion_rx,
            target: SurfaceTarget::default(),
        }
    }

    /// Handle to the current target texture.
    pub fn target(&self) -> SurfaceTarget {
        self.target.clone()
    }
}

impl SurfaceProvider for WgpuSurfaceProvider {
    fn probe(&self) -> Result<(), PlayerError> {
        let needed = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let target = self.format.guaranteed_format_features(self.device.features());
        if !target.allowed_usages.contains(needed) {
            return Err(PlayerError::Fatal(format!(
                "{:?} cannot be both rendered to and sampled",
                self.format
            )));
        }
        let frames = wgpu::TextureFormat::Rgba8Unorm.guaranteed_format_features(self.device.features());
        if !frames.allowed_usages.contains(wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING) {
            return Err(PlayerError::Fatal("RGBA8 textures cannot be uploaded".into()));
        }
        Ok(())
    }

    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn PresentationSurface>, PlayerError> {
        let surface = WgpuSurface::new(
            Arc::clone(&self.device),
            Arc::clone(&self.queue),
            self.format,
            (width, height),
            self.completion_tx.clone(),
            self.target.clone(),
        )?;
        Ok(Box::new(surface))
    }

    fn completions(&self) -> Option<Receiver<SwapCompletion>> {
        Some(self.completion_rx.clone())
    }
}

struct FrameTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
    layout: TexelLayout,
}

/// Offscreen render target plus the blit resources drawing into it.
pub struct WgpuSurface {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    size: (u32, u32),
    target_view: Arc<wgpu::TextureView>,
    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: Option<wgpu::RenderPipeline>,
    frame: Option<FrameTexture>,
    encoder: Option<wgpu::CommandEncoder>,
    completion_tx: Sender<SwapCompletion>,
    target: SurfaceTarget,
}

impl WgpuSurface {
    fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
        size: (u32, u32),
        completion_tx: Sender<SwapCompletion>,
        target: SurfaceTarget,
    ) -> Result<Self, PlayerError> {
        let target_view = Arc::new(create_target(&device, format, size)?);
        target.publish(Arc::clone(&target_view), size);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("overlay_frame_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay_blit_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        tracing::debug!("wgpu surface created {}x{} ({:?})", size.0, size.1, format);
        Ok(Self {
            device,
            queue,
            format,
            size,
            target_view,
            sampler,
            bind_group_layout,
            pipeline: None,
            frame: None,
            encoder: None,
            completion_tx,
            target,
        })
    }

    fn create_frame_texture(&self, size: (u32, u32), layout: TexelLayout) -> FrameTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("overlay_frame_texture"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: match layout {
                TexelLayout::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
                TexelLayout::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
            },
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overlay_frame_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        tracing::debug!("frame texture {}x{} {:?}", size.0, size.1, layout);
        FrameTexture {
            texture,
            bind_group,
            size,
            layout,
        }
    }

    /// Frame texture matching `size` and `layout`, recreated on change.
    fn frame_texture(&mut self, size: (u32, u32), layout: TexelLayout) -> &FrameTexture {
        let frame = match self.frame.take() {
            Some(f) if f.size == size && f.layout == layout => f,
            _ => self.create_frame_texture(size, layout),
        };
        self.frame.insert(frame)
    }
}

/// Encoder for the commands of the current swap, created on first use.
fn pending_encoder<'a>(
    slot: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    slot.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("overlay_present_encoder"),
        })
    })
}

fn create_target(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    (width, height): (u32, u32),
) -> Result<wgpu::TextureView, PlayerError> {
    let max = device.limits().max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(PlayerError::Surface(format!(
            "surface size {width}x{height} outside 1..={max}"
        )));
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("overlay_target_texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    Ok(texture.create_view(&wgpu::TextureViewDescriptor::default()))
}

impl PresentationSurface for WgpuSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PlayerError> {
        if (width, height) == self.size {
            return Ok(());
        }
        let view = Arc::new(create_target(&self.device, self.format, (width, height))?);
        self.target.publish(Arc::clone(&view), (width, height));
        self.target_view = view;
        self.size = (width, height);
        // Commands recorded against the old target are discarded
        self.encoder = None;
        Ok(())
    }

    fn clear(&mut self, color: Color) {
        let encoder = pending_encoder(&mut self.encoder, &self.device);
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("overlay_clear_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: color.r as f64,
                        g: color.g as f64,
                        b: color.b as f64,
                        a: color.a as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn upload_frame(&mut self, frame: &FrameBuffer) -> Result<(), PlayerError> {
        if !frame.is_well_formed() {
            return Err(PlayerError::Surface(format!(
                "frame {} is {} bytes, too short for {}x{} stride {}",
                frame.sequence,
                frame.size(),
                frame.width,
                frame.height,
                frame.stride
            )));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if frame.width > max || frame.height > max {
            return Err(PlayerError::Surface(format!(
                "frame {}x{} exceeds texture limit {max}",
                frame.width, frame.height
            )));
        }

        let prepared = prepare_rows(frame);
        let queue = Arc::clone(&self.queue);
        let texture = self.frame_texture((frame.width, frame.height), prepared.layout);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &prepared.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(prepared.bytes_per_row),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn compile_blit_program(&mut self) -> Result<(), PlayerError> {
        let device = &self.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay_blit_shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("blit.wgsl"))),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay_blit_pipeline_layout"),
            bind_group_layouts: &[&self.bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay_blit_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipeline = Some(pipeline);
        tracing::debug!("blit pipeline compiled for {:?}", self.format);
        Ok(())
    }

    fn draw_fullscreen_quad(&mut self) -> Result<(), PlayerError> {
        let (Some(pipeline), Some(frame)) = (self.pipeline.as_ref(), self.frame.as_ref()) else {
            return Err(PlayerError::Surface("blit drawn before program or upload".into()));
        };
        let encoder = pending_encoder(&mut self.encoder, &self.device);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("overlay_blit_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &frame.bind_group, &[]);
        pass.draw(0..6, 0..1);
        Ok(())
    }

    fn swap_buffers(&mut self, ticket: SwapTicket) -> Result<(), PlayerError> {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("overlay_idle_encoder"),
                }),
        };
        self.queue.submit(Some(encoder.finish()));
        let tx = self.completion_tx.clone();
        self.queue.on_submitted_work_done(move || {
            // Receiver gone means the instance was dropped
            let _ = tx.send(ticket.complete(0));
        });
        Ok(())
    }
}
