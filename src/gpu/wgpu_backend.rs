//! Hardware backend on top of `wgpu`.
//!
//! The master owns one device and queue; every context shares them, so textures drawn by one
//! worker are directly sampleable by another. Programs are render pipelines over a fullscreen
//! triangle, draws are encoded into command buffers that `flush` submits.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;

use crate::foundation::core::FrameRGBA;
use crate::foundation::error::{RenderError, RenderResult};
use crate::gpu::{
    DrawCall, FramebufferId, GpuContext, GpuFunctions, GpuTexture, MasterContext,
    OffscreenSurface, ProgramId, ProgramKind, Texture, TextureId, Uniforms, next_texture_id,
};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const UNIFORM_BYTES: u64 = 32;

const SHADER: &str = r#"
struct VsOut {
  @builtin(position) pos: vec4<f32>,
  @location(0) uv: vec2<f32>,
};

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> VsOut {
  var p = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -1.0),
    vec2<f32>( 3.0, -1.0),
    vec2<f32>(-1.0,  3.0),
  );
  let pos = p[vi];
  var o: VsOut;
  o.pos = vec4<f32>(pos, 0.0, 1.0);
  o.uv = vec2<f32>((pos.x + 1.0) * 0.5, (1.0 - pos.y) * 0.5);
  return o;
}

struct Params {
  color: vec4<f32>,
  opacity: vec4<f32>,
};

@group(0) @binding(0) var t_src: texture_2d<f32>;
@group(0) @binding(1) var s_src: sampler;
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs_fill(in: VsOut) -> @location(0) vec4<f32> {
  return params.color * params.opacity.x;
}

@fragment
fn fs_sample(in: VsOut) -> @location(0) vec4<f32> {
  return textureSample(t_src, s_src, in.uv) * params.opacity.x;
}
"#;

struct WgpuShared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    sampler: wgpu::Sampler,
    /// Bound in place of a texture for programs that sample nothing.
    empty: wgpu::TextureView,
}

/// Master context backed by a `wgpu` device.
#[derive(Clone)]
pub struct WgpuMaster {
    shared: Arc<WgpuShared>,
}

impl WgpuMaster {
    /// Bring up an adapter and device. Fails when no adapter is available.
    pub fn new() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                RenderError::context("no gpu adapter available")
            }
            other => RenderError::context(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("noderender_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| RenderError::context(format!("wgpu request_device failed: {e:?}")))?;

        let min_uniform = std::num::NonZeroU64::new(UNIFORM_BYTES)
            .ok_or_else(|| RenderError::gpu("uniform block size is zero"))?;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("noderender_program_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(min_uniform),
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("noderender_program_pl"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("noderender_programs"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("noderender_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let empty = create_target(&device, 1, 1).create_view(&wgpu::TextureViewDescriptor::default());

        tracing::debug!(adapter = ?adapter.get_info().name, "wgpu master ready");
        Ok(Self {
            shared: Arc::new(WgpuShared {
                device,
                queue,
                layout,
                pipeline_layout,
                shader,
                sampler,
                empty,
            }),
        })
    }
}

impl MasterContext for WgpuMaster {
    fn create_shared(&self) -> RenderResult<Box<dyn GpuContext>> {
        Ok(Box::new(WgpuContext {
            shared: Arc::clone(&self.shared),
            current: None,
            objects: None,
        }))
    }
}

pub struct WgpuContext {
    shared: Arc<WgpuShared>,
    current: Option<ThreadId>,
    objects: Option<Arc<Mutex<WgpuObjects>>>,
}

impl GpuContext for WgpuContext {
    fn make_current(&mut self, _surface: &OffscreenSurface) -> RenderResult<()> {
        let thread = std::thread::current().id();
        if let Some(owner) = self.current
            && owner != thread
        {
            return Err(RenderError::context(
                "context is already current on another thread",
            ));
        }
        self.current = Some(thread);
        if self.objects.is_none() {
            self.objects = Some(Arc::new(Mutex::new(WgpuObjects::default())));
        }
        Ok(())
    }

    fn functions(&self) -> Option<Rc<dyn GpuFunctions>> {
        let objects = self.objects.as_ref()?;
        Some(Rc::new(WgpuFunctions {
            shared: Arc::clone(&self.shared),
            objects: Arc::clone(objects),
        }))
    }
}

#[derive(Default)]
struct WgpuObjects {
    next_object: u64,
    framebuffers: HashSet<FramebufferId>,
    programs: HashMap<ProgramId, (ProgramKind, Arc<wgpu::RenderPipeline>)>,
    pending: Vec<wgpu::CommandBuffer>,
}

impl WgpuObjects {
    fn next_object(&mut self) -> u64 {
        self.next_object += 1;
        self.next_object
    }
}

#[derive(Debug)]
pub struct WgpuTexture {
    id: TextureId,
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture for WgpuTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn create_target(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("noderender_texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn downcast(texture: &Texture) -> RenderResult<&WgpuTexture> {
    texture
        .as_any()
        .downcast_ref::<WgpuTexture>()
        .ok_or_else(|| RenderError::gpu("texture does not belong to the wgpu backend"))
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

struct WgpuFunctions {
    shared: Arc<WgpuShared>,
    objects: Arc<Mutex<WgpuObjects>>,
}

impl WgpuFunctions {
    fn texture(&self, width: u32, height: u32) -> WgpuTexture {
        let texture = create_target(&self.shared.device, width, height);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        WgpuTexture {
            id: next_texture_id(),
            width,
            height,
            texture,
            view,
        }
    }

    fn params(&self, uniforms: Uniforms, opacity: f32) -> wgpu::Buffer {
        let buffer = self.shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("noderender_params"),
            size: UNIFORM_BYTES,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut bytes = [0u8; UNIFORM_BYTES as usize];
        for (i, c) in uniforms.color.to_array().into_iter().enumerate() {
            let v = f32::from(c) / 255.0;
            bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        bytes[16..20].copy_from_slice(&opacity.to_le_bytes());
        self.shared.queue.write_buffer(&buffer, 0, &bytes);
        buffer
    }

    /// Encode one pass into `target`: clear, then one blended draw per source.
    fn encode_pass(
        &self,
        pipeline: &wgpu::RenderPipeline,
        target: &WgpuTexture,
        sources: &[Option<&wgpu::TextureView>],
        uniforms: Uniforms,
        opacity: f32,
    ) -> wgpu::CommandBuffer {
        let device = &self.shared.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("noderender_draw_encoder"),
        });
        let bind_groups: Vec<wgpu::BindGroup> = sources
            .iter()
            .map(|src| {
                let params = self.params(uniforms, opacity);
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("noderender_draw_bg"),
                    layout: &self.shared.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(
                                src.unwrap_or(&self.shared.empty),
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.shared.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: params.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("noderender_draw_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(pipeline);
            for bg in &bind_groups {
                rp.set_bind_group(0, bg, &[]);
                rp.draw(0..3, 0..1);
            }
        }
        encoder.finish()
    }

    fn submit_pending(&self) {
        let pending = std::mem::take(&mut self.objects.lock().pending);
        if !pending.is_empty() {
            self.shared.queue.submit(pending);
        }
    }
}

impl GpuFunctions for WgpuFunctions {
    fn enable_blend(&self) {
        // Premultiplied blending is baked into every pipeline.
    }

    fn viewport(&self, _x: i32, _y: i32, _width: u32, _height: u32) {}

    fn create_framebuffer(&self) -> RenderResult<FramebufferId> {
        let mut objects = self.objects.lock();
        let fb = FramebufferId(objects.next_object());
        objects.framebuffers.insert(fb);
        Ok(fb)
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        self.objects.lock().framebuffers.remove(&framebuffer);
    }

    fn create_program(&self, kind: ProgramKind) -> RenderResult<ProgramId> {
        let entry = match kind {
            ProgramKind::Fill => "fs_fill",
            ProgramKind::Over | ProgramKind::Opacity | ProgramKind::Blit => "fs_sample",
        };
        let shared = &self.shared;
        let pipeline = shared
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("noderender_program"),
                layout: Some(&shared.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shared.shader,
                    entry_point: Some("vs"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shared.shader,
                    entry_point: Some(entry),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: FORMAT,
                        blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        let mut objects = self.objects.lock();
        let program = ProgramId(objects.next_object());
        objects.programs.insert(program, (kind, Arc::new(pipeline)));
        Ok(program)
    }

    fn delete_program(&self, program: ProgramId) {
        self.objects.lock().programs.remove(&program);
    }

    fn upload_texture(&self, frame: &FrameRGBA) -> RenderResult<Texture> {
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.data.len() != expected || frame.width == 0 || frame.height == 0 {
            return Err(RenderError::gpu(
                "upload expects non-empty width*height*4 rgba8 bytes",
            ));
        }
        let tex = self.texture(frame.width, frame.height);
        self.shared.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(Arc::new(tex))
    }

    fn draw(&self, call: &DrawCall<'_>) -> RenderResult<Texture> {
        let (kind, pipeline) = {
            let objects = self.objects.lock();
            if !objects.framebuffers.contains(&call.framebuffer) {
                return Err(RenderError::gpu(
                    "draw with a framebuffer from another context",
                ));
            }
            objects
                .programs
                .get(&call.program)
                .map(|(k, p)| (*k, Arc::clone(p)))
                .ok_or_else(|| RenderError::gpu("draw with a program from another context"))?
        };
        if call.width == 0 || call.height == 0 {
            return Err(RenderError::gpu("draw with an empty viewport"));
        }
        let inputs = call
            .inputs
            .iter()
            .map(downcast)
            .collect::<RenderResult<Vec<_>>>()?;
        let views: Vec<Option<&wgpu::TextureView>> = inputs.iter().map(|t| Some(&t.view)).collect();

        let target = self.texture(call.width, call.height);
        let opacity = call.uniforms.opacity;
        let mut buffers = Vec::with_capacity(2);
        match kind {
            ProgramKind::Fill => {
                buffers.push(self.encode_pass(&pipeline, &target, &[None], call.uniforms, opacity));
            }
            ProgramKind::Opacity | ProgramKind::Blit => {
                let scale = if kind == ProgramKind::Blit { 1.0 } else { opacity };
                buffers.push(self.encode_pass(
                    &pipeline,
                    &target,
                    &views[..views.len().min(1)],
                    call.uniforms,
                    scale,
                ));
            }
            ProgramKind::Over if opacity >= 1.0 => {
                buffers.push(self.encode_pass(&pipeline, &target, &views, call.uniforms, 1.0));
            }
            ProgramKind::Over => {
                let stack = self.texture(call.width, call.height);
                buffers.push(self.encode_pass(&pipeline, &stack, &views, call.uniforms, 1.0));
                buffers.push(self.encode_pass(
                    &pipeline,
                    &target,
                    &[Some(&stack.view)],
                    call.uniforms,
                    opacity,
                ));
            }
        }
        self.objects.lock().pending.extend(buffers);
        Ok(Arc::new(target))
    }

    fn read_pixels(&self, texture: &Texture) -> RenderResult<FrameRGBA> {
        let tex = downcast(texture)?;
        self.submit_pending();

        let device = &self.shared.device;
        let bytes_per_row = align_to(
            tex.width
                .checked_mul(4)
                .ok_or_else(|| RenderError::gpu("readback width overflow"))?,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        );
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("noderender_readback"),
            size: u64::from(bytes_per_row) * u64::from(tex.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("noderender_readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(tex.height),
                },
            },
            wgpu::Extent3d {
                width: tex.width,
                height: tex.height,
                depth_or_array_layers: 1,
            },
        );
        self.shared.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RenderError::gpu(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| RenderError::gpu("readback channel closed"))?
            .map_err(|e| RenderError::gpu(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let row_bytes = tex.width as usize * 4;
        let mut data = Vec::with_capacity(row_bytes * tex.height as usize);
        for row in 0..tex.height as usize {
            let start = row * bytes_per_row as usize;
            data.extend_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        readback.unmap();

        Ok(FrameRGBA {
            width: tex.width,
            height: tex.height,
            data,
        })
    }

    fn flush(&self) {
        self.submit_pending();
    }

    fn finish(&self) {
        self.submit_pending();
        if let Err(e) = self
            .shared
            .device
            .poll(wgpu::PollType::wait_indefinitely())
        {
            tracing::warn!(error = ?e, "wgpu poll failed");
        }
    }
}
