//! wgpu implementation of [`GraphicsDevice`]
//!
//! Calls are recorded while a frame is built and encoded into render passes
//! when the frame ends or pixels are read back. Consecutive draws into the
//! same target share a pass; a clear starts a new pass whose load operations
//! perform it.
//!
//! Scene matrices arrive in GL clip conventions. Clip-space transforms are
//! remapped to wgpu's `[0, 1]` depth range when uniforms are packed, which
//! leaves shadow lookups through the bias matrix comparing like with like.

use std::ops::Range;
use std::sync::{Arc, Mutex};

use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix3, Matrix4};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::{RenderError, RenderResult};
use crate::gfx::camera::OPENGL_TO_WGPU_MATRIX;
use crate::gfx::resources::handle::HandlePool;
use crate::gfx::resources::texture_resource::{wgpu_format, TextureResource};
use crate::gfx::scene::vertex::Vertex3D;
use crate::wgpu_utils::DynamicUniformBuffer;

use super::device::*;
use super::pipeline_manager::{BindingLayouts, PipelineKey, PipelineManager, Program};

const MAX_TEXTURE_UNITS: usize = 2;
const INITIAL_UNIFORM_BLOCKS: u64 = 64;

/// Per-draw uniform block shared by every program
///
/// Matrices are column-major; 3x3 matrices are stored as three padded
/// columns to match WGSL's `mat3x3<f32>` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    pub clip: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub light_transform: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 3],
    pub light_position: [f32; 4],
    pub camera_position: [f32; 4],
    pub color: [f32; 4],
    pub overlay: [[f32; 4]; 3],
}

fn padded_columns(m: Matrix3<f32>) -> [[f32; 4]; 3] {
    [
        [m.x.x, m.x.y, m.x.z, 0.0],
        [m.y.x, m.y.y, m.y.z, 0.0],
        [m.z.x, m.z.y, m.z.z, 0.0],
    ]
}

fn to_clip(m: Matrix4<f32>) -> [[f32; 4]; 4] {
    (OPENGL_TO_WGPU_MATRIX * m).into()
}

impl UniformBlock {
    pub fn from_uniforms(uniforms: &DrawUniforms) -> Self {
        let mut block = Self::zeroed();
        match uniforms {
            DrawUniforms::Depth { light_transform } => {
                block.clip = to_clip(*light_transform);
            }
            DrawUniforms::Shaded(shaded) => {
                block.clip = to_clip(shaded.model_view_projection);
                block.model_view = shaded.model_view.into();
                // bias * P * V * M already lands in [0, 1] depth
                block.light_transform = shaded.light_transform.into();
                block.normal_matrix = padded_columns(shaded.normal_matrix);
                block.light_position = shaded.light_position.extend(1.0).into();
                block.camera_position = shaded.camera_position.extend(1.0).into();
                block.color = shaded.color.extend(1.0).into();
            }
            DrawUniforms::Overlay { transform } => {
                block.overlay = padded_columns(*transform);
            }
        }
        block
    }
}

/// Draw state captured at `draw_arrays`
#[derive(Debug, Clone, PartialEq)]
struct RecordedDraw {
    viewport: Viewport,
    program: ProgramId,
    depth_bias: Option<DepthBias>,
    textures: Vec<TextureId>,
    vertex_array: Option<VertexArrayId>,
    uniform_offset: u32,
    range: Range<u32>,
}

#[derive(Debug, Clone, PartialEq)]
enum Command<T> {
    Clear {
        target: Option<FramebufferId>,
        flags: ClearFlags,
    },
    Draw {
        target: Option<FramebufferId>,
        draw: T,
    },
}

/// One render pass: what its load operations clear and what it draws
#[derive(Debug, Clone, PartialEq)]
struct PassPlan<T> {
    target: Option<FramebufferId>,
    clear: ClearFlags,
    draws: Vec<T>,
}

/// Groups recorded commands into render passes
///
/// A clear opens a new pass unless the current pass has the same target and
/// has not drawn yet, in which case the clears merge. Draws join the current
/// pass when it targets the same framebuffer.
fn plan_passes<T>(commands: Vec<Command<T>>) -> Vec<PassPlan<T>> {
    let mut passes: Vec<PassPlan<T>> = Vec::new();
    for command in commands {
        match command {
            Command::Clear { target, flags } => match passes.last_mut() {
                Some(pass) if pass.target == target && pass.draws.is_empty() => {
                    pass.clear.color = flags.color.or(pass.clear.color);
                    pass.clear.depth = flags.depth.or(pass.clear.depth);
                }
                _ => passes.push(PassPlan {
                    target,
                    clear: flags,
                    draws: Vec::new(),
                }),
            },
            Command::Draw { target, draw } => match passes.last_mut() {
                Some(pass) if pass.target == target => pass.draws.push(draw),
                _ => passes.push(PassPlan {
                    target,
                    clear: ClearFlags {
                        color: None,
                        depth: None,
                    },
                    draws: vec![draw],
                }),
            },
        }
    }
    passes
}

/// GL viewports count rows from the bottom; wgpu from the top
fn flip_viewport(viewport: Viewport, target_height: u32) -> (f32, f32, f32, f32) {
    let top = target_height.saturating_sub(viewport.y + viewport.height);
    (
        viewport.x as f32,
        top as f32,
        viewport.width as f32,
        viewport.height as f32,
    )
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

struct FramebufferRecord {
    label: String,
    attachments: FramebufferAttachments,
    size: (u32, u32),
}

struct VertexArray {
    buffer: wgpu::Buffer,
    count: u32,
}

/// Draw resolved against the GPU resources it needs
struct EncodedDraw {
    pipeline: PipelineKey,
    viewport: Viewport,
    vertex_array: Option<VertexArrayId>,
    textures: Option<wgpu::BindGroup>,
    uniform_offset: u32,
    range: Range<u32>,
}

pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    window_depth: wgpu::TextureView,
    frame: Option<wgpu::SurfaceTexture>,

    textures: HandlePool<TextureMarker, TextureResource>,
    framebuffers: HandlePool<FramebufferMarker, FramebufferRecord>,
    programs: HandlePool<ProgramMarker, Program>,
    vertex_arrays: HandlePool<VertexArrayMarker, VertexArray>,

    layouts: BindingLayouts,
    pipelines: PipelineManager,
    uniforms: DynamicUniformBuffer<UniformBlock>,
    uniform_bind_group: wgpu::BindGroup,
    latched_error: Arc<Mutex<Option<String>>>,

    framebuffer: Option<FramebufferId>,
    viewport: Viewport,
    depth_bias: Option<DepthBias>,
    program: Option<ProgramId>,
    bound_textures: [Option<TextureId>; MAX_TEXTURE_UNITS],
    vertex_array: Option<VertexArrayId>,
    draw_uniforms: Option<DrawUniforms>,
    commands: Vec<Command<RecordedDraw>>,
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>) -> RenderResult<Self> {
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::ContextCreation(format!("surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::ContextCreation(format!("adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::ContextCreation(format!("device: {e}")))?;

        let info = adapter.get_info();
        log::info!("Using {} ({:?})", info.name, info.backend);

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| RenderError::ContextCreation("surface reports no formats".into()))?;
        let alpha_mode = surface_capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let latched_error = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&latched_error);
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("wgpu: {error}");
            if let Ok(mut slot) = sink.lock() {
                slot.get_or_insert_with(|| error.to_string());
            }
        }));

        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let window_depth = TextureResource::create_depth_texture(&device, &config, "window depth");
        let layouts = BindingLayouts::new(&device);
        let uniforms = DynamicUniformBuffer::new(&device, INITIAL_UNIFORM_BLOCKS);
        let uniform_bind_group = create_uniform_bind_group(&device, &layouts, &uniforms);

        Ok(Self {
            surface,
            pipelines: PipelineManager::new(Arc::clone(&device)),
            device,
            queue,
            config,
            window_depth,
            frame: None,
            textures: HandlePool::new(),
            framebuffers: HandlePool::new(),
            programs: HandlePool::new(),
            vertex_arrays: HandlePool::new(),
            layouts,
            uniforms,
            uniform_bind_group,
            latched_error,
            framebuffer: None,
            viewport: Viewport::full(width, height),
            depth_bias: None,
            program: None,
            bound_textures: [None; MAX_TEXTURE_UNITS],
            vertex_array: None,
            draw_uniforms: None,
            commands: Vec::new(),
        })
    }

    fn texture(&self, texture: TextureId) -> RenderResult<&TextureResource> {
        self.textures
            .get(texture)
            .ok_or_else(|| RenderError::stale("texture"))
    }

    /// Color and depth formats of a render target
    fn target_formats(
        &self,
        target: Option<FramebufferId>,
    ) -> RenderResult<(Option<wgpu::TextureFormat>, Option<wgpu::TextureFormat>)> {
        let Some(id) = target else {
            return Ok((Some(self.config.format), Some(TextureResource::DEPTH_FORMAT)));
        };
        let record = self
            .framebuffers
            .get(id)
            .ok_or_else(|| RenderError::stale("framebuffer"))?;
        let format_of = |slot: Option<TextureId>| -> RenderResult<Option<wgpu::TextureFormat>> {
            slot.map(|t| self.texture(t).map(|r| wgpu_format(r.desc.format)))
                .transpose()
        };
        Ok((
            format_of(record.attachments.color)?,
            format_of(record.attachments.depth)?,
        ))
    }

    fn target_height(&self, target: Option<FramebufferId>) -> RenderResult<u32> {
        match target {
            None => Ok(self.config.height),
            Some(id) => self
                .framebuffers
                .get(id)
                .map(|record| record.size.1)
                .ok_or_else(|| RenderError::stale("framebuffer")),
        }
    }

    fn texture_bind_group(
        &self,
        program: &Program,
        textures: &[TextureId],
    ) -> RenderResult<Option<wgpu::BindGroup>> {
        let Some(layout) = self.layouts.textures(program.layout) else {
            return Ok(None);
        };
        let resources = textures
            .iter()
            .map(|&t| self.texture(t))
            .collect::<RenderResult<Vec<_>>>()?;

        let entries: Vec<wgpu::BindGroupEntry> = match program.layout {
            ProgramLayout::DepthOverlay => vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&resources[0].view),
            }],
            _ => resources
                .iter()
                .enumerate()
                .flat_map(|(i, resource)| {
                    [
                        wgpu::BindGroupEntry {
                            binding: 2 * i as u32,
                            resource: wgpu::BindingResource::TextureView(&resource.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2 * i as u32 + 1,
                            resource: wgpu::BindingResource::Sampler(&resource.sampler),
                        },
                    ]
                })
                .collect(),
        };

        Ok(Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} textures", program.label)),
            layout,
            entries: &entries,
        })))
    }

    /// Uploads staged uniforms and encodes every recorded command
    fn encode_pending(&mut self) -> RenderResult<wgpu::CommandEncoder> {
        if self.uniforms.flush(&self.device, &self.queue) {
            self.uniform_bind_group =
                create_uniform_bind_group(&self.device, &self.layouts, &self.uniforms);
        }

        let passes = plan_passes(std::mem::take(&mut self.commands));

        // resolve pipelines and texture bindings before any pass borrows them
        let mut planned = Vec::with_capacity(passes.len());
        for pass in passes {
            let (color_format, depth_format) = self.target_formats(pass.target)?;
            let height = self.target_height(pass.target)?;
            let mut draws = Vec::with_capacity(pass.draws.len());
            for draw in pass.draws {
                let program = self
                    .programs
                    .get(draw.program)
                    .ok_or_else(|| RenderError::stale("program"))?;
                let key = PipelineKey {
                    program: draw.program,
                    color_format,
                    depth_format,
                    depth_bias: draw.depth_bias,
                };
                self.pipelines.get_pipeline(key, program, &self.layouts);
                draws.push(EncodedDraw {
                    pipeline: key,
                    viewport: draw.viewport,
                    vertex_array: draw.vertex_array,
                    textures: self.texture_bind_group(program, &draw.textures)?,
                    uniform_offset: draw.uniform_offset,
                    range: draw.range,
                });
            }
            planned.push((pass.target, pass.clear, height, draws));
        }

        let surface_view = self
            .frame
            .as_ref()
            .map(|frame| frame.texture.create_view(&wgpu::TextureViewDescriptor::default()));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        for (target, clear, height, draws) in &planned {
            let (color_view, depth_view) = match target {
                None => {
                    let view = surface_view.as_ref().ok_or_else(|| {
                        RenderError::Device("window drawn to outside of a frame".into())
                    })?;
                    (Some(view), Some(&self.window_depth))
                }
                Some(id) => {
                    let record = self
                        .framebuffers
                        .get(*id)
                        .ok_or_else(|| RenderError::stale("framebuffer"))?;
                    let view_of = |slot: Option<TextureId>| -> RenderResult<Option<&wgpu::TextureView>> {
                        slot.map(|t| self.texture(t).map(|r| &r.view)).transpose()
                    };
                    (view_of(record.attachments.color)?, view_of(record.attachments.depth)?)
                }
            };

            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_view
                .into_iter()
                .map(|view| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: match clear.color {
                                Some([r, g, b, a]) => {
                                    wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
                                }
                                None => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();
            let depth_stencil_attachment =
                depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match clear.depth {
                            Some(depth) => wgpu::LoadOp::Clear(depth),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

            let label = match target {
                None => "window".to_owned(),
                Some(id) => self
                    .framebuffers
                    .get(*id)
                    .map(|record| record.label.clone())
                    .unwrap_or_default(),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in draws {
                let pipeline = self.pipelines.cached(&draw.pipeline).ok_or_else(|| {
                    RenderError::Device("pipeline missing from cache".into())
                })?;
                render_pass.set_pipeline(pipeline);
                let (x, y, w, h) = flip_viewport(draw.viewport, *height);
                render_pass.set_viewport(x, y, w, h, 0.0, 1.0);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[draw.uniform_offset]);
                if let Some(textures) = &draw.textures {
                    render_pass.set_bind_group(1, textures, &[]);
                }
                if let Some(id) = draw.vertex_array {
                    let vertex_array = self
                        .vertex_arrays
                        .get(id)
                        .ok_or_else(|| RenderError::stale("vertex array"))?;
                    render_pass.set_vertex_buffer(0, vertex_array.buffer.slice(..));
                }
                render_pass.draw(draw.range.clone(), 0..1);
            }
        }

        Ok(encoder)
    }
}

fn create_uniform_bind_group(
    device: &wgpu::Device,
    layouts: &BindingLayouts,
    uniforms: &DynamicUniformBuffer<UniformBlock>,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Uniform Block"),
        layout: &layouts.uniforms,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.binding_resource(),
        }],
    })
}

impl GraphicsDevice for WgpuDevice {
    fn window_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize_window(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.window_depth =
            TextureResource::create_depth_texture(&self.device, &self.config, "window depth");
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        let resource = TextureResource::create(&self.device, &self.queue, desc, None)?;
        Ok(self.textures.insert(resource))
    }

    fn create_cube_texture(
        &mut self,
        desc: &TextureDesc,
        faces: &[Vec<u8>; 6],
    ) -> RenderResult<TextureId> {
        if desc.kind != TextureKind::Cube {
            return Err(RenderError::ResourceCreation {
                label: desc.label.clone(),
                reason: "not a cube texture description".into(),
            });
        }
        let resource = TextureResource::create(&self.device, &self.queue, desc, Some(faces))?;
        Ok(self.textures.insert(resource))
    }

    fn texture_desc(&self, texture: TextureId) -> RenderResult<TextureDesc> {
        self.texture(texture).map(|r| r.desc.clone())
    }

    fn destroy_texture(&mut self, texture: TextureId) -> RenderResult<()> {
        self.textures
            .remove(texture)
            .ok_or_else(|| RenderError::stale("texture"))?;
        for unit in self.bound_textures.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
        Ok(())
    }

    fn create_framebuffer(
        &mut self,
        label: &str,
        attachments: &FramebufferAttachments,
    ) -> RenderResult<FramebufferId> {
        let size = attachments
            .check_completeness(|id| self.textures.get(id).map(|r| r.desc.clone()))
            .map_err(|reason| RenderError::ResourceCreation {
                label: label.to_owned(),
                reason,
            })?;
        Ok(self.framebuffers.insert(FramebufferRecord {
            label: label.to_owned(),
            attachments: *attachments,
            size,
        }))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> RenderResult<()> {
        self.framebuffers
            .remove(framebuffer)
            .ok_or_else(|| RenderError::stale("framebuffer"))?;
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
        Ok(())
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> RenderResult<ProgramId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Compile {
                label: desc.label.to_owned(),
                message: error.to_string(),
            });
        }

        log::debug!("Compiled program '{}'", desc.label);
        Ok(self.programs.insert(Program {
            label: desc.label.to_owned(),
            module,
            vertex_entry: desc.vertex_entry.to_owned(),
            fragment_entry: desc.fragment_entry.map(str::to_owned),
            layout: desc.layout,
            blend: desc.blend,
        }))
    }

    fn create_vertex_array(
        &mut self,
        label: &str,
        vertices: &[Vertex3D],
    ) -> RenderResult<VertexArrayId> {
        if vertices.is_empty() {
            return Err(RenderError::ResourceCreation {
                label: label.to_owned(),
                reason: "no vertices".into(),
            });
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        Ok(self.vertex_arrays.insert(VertexArray {
            buffer,
            count: vertices.len() as u32,
        }))
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        if self.frame.is_some() {
            return Err(RenderError::Device("frame already started".into()));
        }
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|e| RenderError::Device(format!("surface unavailable: {e}")))?
            }
            Err(e) => return Err(RenderError::Device(format!("surface unavailable: {e}"))),
        };
        self.frame = Some(frame);
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        if self.frame.is_none() {
            return Err(RenderError::Device("no frame to end".into()));
        }
        let submitted = self
            .encode_pending()
            .map(|encoder| self.queue.submit(std::iter::once(encoder.finish())));
        // present even when encoding failed so the next frame can acquire
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        submitted.map(|_| ())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> RenderResult<()> {
        if let Some(id) = framebuffer {
            if !self.framebuffers.contains(id) {
                return Err(RenderError::stale("framebuffer"));
            }
        }
        self.framebuffer = framebuffer;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.commands.push(Command::Clear {
            target: self.framebuffer,
            flags,
        });
    }

    fn set_depth_bias(&mut self, bias: Option<DepthBias>) {
        self.depth_bias = bias;
    }

    fn use_program(&mut self, program: ProgramId) -> RenderResult<()> {
        if !self.programs.contains(program) {
            return Err(RenderError::stale("program"));
        }
        self.program = Some(program);
        Ok(())
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId) -> RenderResult<()> {
        self.texture(texture)?;
        let slot = self
            .bound_textures
            .get_mut(unit.0 as usize)
            .ok_or_else(|| RenderError::Device(format!("texture unit {} out of range", unit.0)))?;
        *slot = Some(texture);
        Ok(())
    }

    fn set_uniforms(&mut self, uniforms: DrawUniforms) {
        self.draw_uniforms = Some(uniforms);
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> RenderResult<()> {
        if !self.vertex_arrays.contains(vertex_array) {
            return Err(RenderError::stale("vertex array"));
        }
        self.vertex_array = Some(vertex_array);
        Ok(())
    }

    fn draw_arrays(&mut self, range: Range<u32>) -> RenderResult<()> {
        if self.frame.is_none() {
            return Err(RenderError::Device("draw outside of a frame".into()));
        }
        let program_id = self
            .program
            .ok_or_else(|| RenderError::Device("draw without a program".into()))?;
        let program = self
            .programs
            .get(program_id)
            .ok_or_else(|| RenderError::stale("program"))?;

        let vertex_array = if program.layout.uses_vertex_buffer() {
            let id = self
                .vertex_array
                .ok_or_else(|| RenderError::Device("draw without a vertex array".into()))?;
            let count = self
                .vertex_arrays
                .get(id)
                .ok_or_else(|| RenderError::stale("vertex array"))?
                .count;
            if range.end > count {
                return Err(RenderError::Device(format!(
                    "draw range {:?} exceeds {} vertices",
                    range, count
                )));
            }
            Some(id)
        } else {
            None
        };

        let mut textures = Vec::new();
        for unit in program.layout.sampled_units() {
            let texture = self
                .bound_textures
                .get(unit.0 as usize)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    RenderError::Device(format!(
                        "program '{}' samples empty unit {}",
                        program.label, unit.0
                    ))
                })?;
            self.texture(texture)?;
            textures.push(texture);
        }
        if let Some(target) = self.framebuffer.and_then(|f| self.framebuffers.get(f)) {
            let attached = [target.attachments.color, target.attachments.depth];
            if textures.iter().any(|t| attached.contains(&Some(*t))) {
                return Err(RenderError::Device(
                    "texture bound for sampling is attached to the current framebuffer".into(),
                ));
            }
        }

        let block = self
            .draw_uniforms
            .as_ref()
            .map(UniformBlock::from_uniforms)
            .unwrap_or_else(UniformBlock::zeroed);
        let uniform_offset = self.uniforms.push(&block);

        self.commands.push(Command::Draw {
            target: self.framebuffer,
            draw: RecordedDraw {
                viewport: self.viewport,
                program: program_id,
                depth_bias: self.depth_bias,
                textures,
                vertex_array,
                uniform_offset,
                range,
            },
        });
        Ok(())
    }

    fn read_pixels(&mut self, framebuffer: FramebufferId) -> RenderResult<PixelBuffer> {
        let record = self
            .framebuffers
            .get(framebuffer)
            .ok_or_else(|| RenderError::stale("framebuffer"))?;
        let color = record
            .attachments
            .color
            .ok_or_else(|| RenderError::Device("framebuffer has no color attachment".into()))?;
        let (width, height) = record.size;
        let padded_row = padded_bytes_per_row(width);

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_buffer"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.encode_pending()?;
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture(color)?.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging_buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| RenderError::Device(format!("readback poll failed: {e}")))?;

        match futures::executor::block_on(rx) {
            Ok(Ok(())) => {
                let mapped = slice.get_mapped_range();
                let row = (width * 4) as usize;
                let mut data = Vec::with_capacity(row * height as usize);
                for chunk in mapped.chunks(padded_row as usize).take(height as usize) {
                    data.extend_from_slice(&chunk[..row]);
                }
                drop(mapped);
                staging_buffer.unmap();
                Ok(PixelBuffer {
                    width,
                    height,
                    data,
                })
            }
            _ => Err(RenderError::Device("failed to map readback buffer".into())),
        }
    }

    fn check_error(&mut self) -> RenderResult<()> {
        let latched = self
            .latched_error
            .lock()
            .map_err(|_| RenderError::Device("error latch poisoned".into()))?
            .take();
        match latched {
            Some(message) => Err(RenderError::Device(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{SquareMatrix, Vector3, Vector4};

    fn target(n: u32) -> Option<FramebufferId> {
        let mut pool: HandlePool<FramebufferMarker, ()> = HandlePool::new();
        let mut last = None;
        for _ in 0..n {
            last = Some(pool.insert(()));
        }
        last
    }

    #[test]
    fn test_clear_then_draws_share_one_pass() {
        let shadow = target(1);
        let passes = plan_passes(vec![
            Command::Clear {
                target: shadow,
                flags: ClearFlags::depth_only(),
            },
            Command::Draw {
                target: shadow,
                draw: 1,
            },
            Command::Draw {
                target: shadow,
                draw: 2,
            },
            Command::Clear {
                target: None,
                flags: ClearFlags::color_and_depth([1.0; 4]),
            },
            Command::Draw {
                target: None,
                draw: 3,
            },
        ]);

        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].target, shadow);
        assert_eq!(passes[0].clear, ClearFlags::depth_only());
        assert_eq!(passes[0].draws, vec![1, 2]);
        assert_eq!(passes[1].clear.color, Some([1.0; 4]));
        assert_eq!(passes[1].draws, vec![3]);
    }

    #[test]
    fn test_draw_after_switching_back_loads_previous_contents() {
        let passes = plan_passes(vec![
            Command::Clear {
                target: None,
                flags: ClearFlags::color_and_depth([1.0; 4]),
            },
            Command::Draw {
                target: None,
                draw: 1,
            },
            Command::Draw {
                target: target(1),
                draw: 2,
            },
            Command::Draw {
                target: None,
                draw: 3,
            },
        ]);

        assert_eq!(passes.len(), 3);
        assert_eq!(passes[2].clear.color, None);
        assert_eq!(passes[2].clear.depth, None);
    }

    #[test]
    fn test_clear_after_draws_starts_new_pass() {
        let passes = plan_passes(vec![
            Command::Draw {
                target: None,
                draw: 1,
            },
            Command::Clear {
                target: None,
                flags: ClearFlags::depth_only(),
            },
            Command::Draw {
                target: None,
                draw: 2,
            },
        ]);
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[1].clear.depth, Some(1.0));
    }

    #[test]
    fn test_viewport_rows_counted_from_top() {
        let quarter = Viewport {
            x: 0,
            y: 0,
            width: 200,
            height: 150,
        };
        assert_eq!(flip_viewport(quarter, 600), (0.0, 450.0, 200.0, 150.0));
        assert_eq!(
            flip_viewport(Viewport::full(800, 600), 600),
            (0.0, 0.0, 800.0, 600.0)
        );
    }

    #[test]
    fn test_readback_rows_are_aligned() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(800) % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
    }

    #[test]
    fn test_depth_uniforms_remap_clip_depth() {
        let block = UniformBlock::from_uniforms(&DrawUniforms::Depth {
            light_transform: Matrix4::identity(),
        });
        let clip = Matrix4::from(block.clip);
        // GL near plane (z = -1) lands on wgpu depth 0
        let near = clip * Vector4::new(0.0, 0.0, -1.0, 1.0);
        let far = clip * Vector4::new(0.0, 0.0, 1.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-6);
        assert!((far.z / far.w - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shaded_uniforms_pack_padded_normal_matrix() {
        let normal_matrix = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let block = UniformBlock::from_uniforms(&DrawUniforms::Shaded(ShadedUniforms {
            model_view_projection: Matrix4::identity(),
            model_view: Matrix4::identity(),
            normal_matrix,
            light_transform: Matrix4::from_scale(0.5),
            light_position: Vector3::new(10.0, 0.0, 0.0),
            camera_position: Vector3::new(0.0, 0.0, 10.0),
            color: Vector3::new(1.0, 0.8, 0.8),
        }));

        assert_eq!(block.normal_matrix[1], [4.0, 5.0, 6.0, 0.0]);
        assert_eq!(block.light_position, [10.0, 0.0, 0.0, 1.0]);
        assert_eq!(block.color, [1.0, 0.8, 0.8, 1.0]);
        // the shadow transform is used as given
        assert_eq!(block.light_transform[0][0], 0.5);
        assert_eq!(block.overlay, [[0.0; 4]; 3]);
    }

    #[test]
    fn test_block_layout_matches_shader_struct() {
        assert_eq!(std::mem::size_of::<UniformBlock>(), 336);
        assert_eq!(DynamicUniformBuffer::<UniformBlock>::stride(), 512);
    }
}
