//! In-memory graphics device that records every call
//!
//! Tracks the same binding state a GL context would, validates handles and
//! framebuffer completeness with the shared rules, and keeps an ordered call
//! log so pass sequencing can be checked without a GPU.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use crate::error::{RenderError, RenderResult};
use crate::gfx::resources::handle::HandlePool;
use crate::gfx::scene::vertex::Vertex3D;

use super::device::*;

/// One draw as the device saw it, with the state it was issued under
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: String,
    pub framebuffer: Option<FramebufferId>,
    pub textures: Vec<(TextureUnit, TextureId)>,
    pub viewport: Viewport,
    pub depth_bias: Option<DepthBias>,
    pub uniforms: Option<DrawUniforms>,
    pub range: Range<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateTexture(String),
    DestroyTexture(TextureId),
    CreateFramebuffer(String),
    DestroyFramebuffer(FramebufferId),
    CreateProgram(String),
    CreateVertexArray(String, usize),
    BeginFrame,
    EndFrame,
    BindFramebuffer(Option<FramebufferId>),
    SetViewport(Viewport),
    Clear(ClearFlags),
    SetDepthBias(Option<DepthBias>),
    UseProgram(String),
    BindTexture(TextureUnit, TextureId),
    Draw(DrawCall),
    ReadPixels(FramebufferId),
}

struct FramebufferRecord {
    attachments: FramebufferAttachments,
    size: (u32, u32),
}

pub struct RecordingDevice {
    calls: Vec<Call>,
    window: (u32, u32),
    textures: HandlePool<TextureMarker, TextureDesc>,
    framebuffers: HandlePool<FramebufferMarker, FramebufferRecord>,
    programs: HandlePool<ProgramMarker, (String, ProgramLayout)>,
    vertex_arrays: HandlePool<VertexArrayMarker, u32>,
    /// Program labels whose creation fails with `Compile`
    failing_programs: HashSet<String>,
    latched_error: Option<String>,
    in_frame: bool,

    framebuffer: Option<FramebufferId>,
    viewport: Viewport,
    depth_bias: Option<DepthBias>,
    program: Option<ProgramId>,
    bound_textures: BTreeMap<u32, TextureId>,
    vertex_array: Option<VertexArrayId>,
    uniforms: Option<DrawUniforms>,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            calls: Vec::new(),
            window: (width, height),
            textures: HandlePool::new(),
            framebuffers: HandlePool::new(),
            programs: HandlePool::new(),
            vertex_arrays: HandlePool::new(),
            failing_programs: HashSet::new(),
            latched_error: None,
            in_frame: false,
            framebuffer: None,
            viewport: Viewport::full(width, height),
            depth_bias: None,
            program: None,
            bound_textures: BTreeMap::new(),
            vertex_array: None,
            uniforms: None,
        }
    }

    pub fn fail_program(&mut self, label: &str) {
        self.failing_programs.insert(label.to_owned());
    }

    /// Latches an error for the next `check_error`, like a GL error flag
    pub fn raise_error(&mut self, message: &str) {
        self.latched_error.get_or_insert_with(|| message.to_owned());
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.calls.iter().filter_map(|call| match call {
            Call::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn attachments(&self, framebuffer: FramebufferId) -> Option<FramebufferAttachments> {
        self.framebuffers.get(framebuffer).map(|f| f.attachments)
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    fn check_texture(&self, texture: TextureId) -> RenderResult<&TextureDesc> {
        self.textures
            .get(texture)
            .ok_or_else(|| RenderError::stale("texture"))
    }
}

impl GraphicsDevice for RecordingDevice {
    fn window_size(&self) -> (u32, u32) {
        self.window
    }

    fn resize_window(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.window = (width, height);
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        self.calls.push(Call::CreateTexture(desc.label.clone()));
        Ok(self.textures.insert(desc.clone()))
    }

    fn create_cube_texture(
        &mut self,
        desc: &TextureDesc,
        faces: &[Vec<u8>; 6],
    ) -> RenderResult<TextureId> {
        let expected = (desc.width * desc.height * 4) as usize;
        if desc.kind != TextureKind::Cube || faces.iter().any(|f| f.len() != expected) {
            return Err(RenderError::Device(format!(
                "cube texture '{}' has mismatched face data",
                desc.label
            )));
        }
        self.create_texture(desc)
    }

    fn texture_desc(&self, texture: TextureId) -> RenderResult<TextureDesc> {
        self.check_texture(texture).cloned()
    }

    fn destroy_texture(&mut self, texture: TextureId) -> RenderResult<()> {
        self.textures
            .remove(texture)
            .ok_or_else(|| RenderError::stale("texture"))?;
        self.bound_textures.retain(|_, bound| *bound != texture);
        self.calls.push(Call::DestroyTexture(texture));
        Ok(())
    }

    fn create_framebuffer(
        &mut self,
        label: &str,
        attachments: &FramebufferAttachments,
    ) -> RenderResult<FramebufferId> {
        let size = attachments
            .check_completeness(|id| self.textures.get(id).cloned())
            .map_err(|reason| RenderError::ResourceCreation {
                label: label.to_owned(),
                reason,
            })?;
        self.calls.push(Call::CreateFramebuffer(label.to_owned()));
        Ok(self.framebuffers.insert(FramebufferRecord {
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
        self.calls.push(Call::DestroyFramebuffer(framebuffer));
        Ok(())
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> RenderResult<ProgramId> {
        if self.failing_programs.contains(desc.label) {
            return Err(RenderError::Compile {
                label: desc.label.to_owned(),
                message: "rejected by test device".into(),
            });
        }
        self.calls.push(Call::CreateProgram(desc.label.to_owned()));
        Ok(self.programs.insert((desc.label.to_owned(), desc.layout)))
    }

    fn create_vertex_array(
        &mut self,
        label: &str,
        vertices: &[Vertex3D],
    ) -> RenderResult<VertexArrayId> {
        self.calls
            .push(Call::CreateVertexArray(label.to_owned(), vertices.len()));
        Ok(self.vertex_arrays.insert(vertices.len() as u32))
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        if self.in_frame {
            return Err(RenderError::Device("frame already started".into()));
        }
        self.in_frame = true;
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        if !self.in_frame {
            return Err(RenderError::Device("no frame to end".into()));
        }
        self.in_frame = false;
        self.calls.push(Call::EndFrame);
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> RenderResult<()> {
        if let Some(id) = framebuffer {
            if !self.framebuffers.contains(id) {
                return Err(RenderError::stale("framebuffer"));
            }
        }
        self.framebuffer = framebuffer;
        self.calls.push(Call::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.calls.push(Call::SetViewport(viewport));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.calls.push(Call::Clear(flags));
    }

    fn set_depth_bias(&mut self, bias: Option<DepthBias>) {
        self.depth_bias = bias;
        self.calls.push(Call::SetDepthBias(bias));
    }

    fn use_program(&mut self, program: ProgramId) -> RenderResult<()> {
        let (label, _) = self
            .programs
            .get(program)
            .ok_or_else(|| RenderError::stale("program"))?;
        self.calls.push(Call::UseProgram(label.clone()));
        self.program = Some(program);
        Ok(())
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId) -> RenderResult<()> {
        self.check_texture(texture)?;
        self.bound_textures.insert(unit.0, texture);
        self.calls.push(Call::BindTexture(unit, texture));
        Ok(())
    }

    fn set_uniforms(&mut self, uniforms: DrawUniforms) {
        self.uniforms = Some(uniforms);
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> RenderResult<()> {
        if !self.vertex_arrays.contains(vertex_array) {
            return Err(RenderError::stale("vertex array"));
        }
        self.vertex_array = Some(vertex_array);
        Ok(())
    }

    fn draw_arrays(&mut self, range: Range<u32>) -> RenderResult<()> {
        if !self.in_frame {
            return Err(RenderError::Device("draw outside of a frame".into()));
        }
        let program = self
            .program
            .ok_or_else(|| RenderError::Device("draw without a program".into()))?;
        let (label, layout) = self
            .programs
            .get(program)
            .ok_or_else(|| RenderError::stale("program"))?
            .clone();

        if layout.uses_vertex_buffer() {
            let vertex_array = self
                .vertex_array
                .ok_or_else(|| RenderError::Device("draw without a vertex array".into()))?;
            let count = *self
                .vertex_arrays
                .get(vertex_array)
                .ok_or_else(|| RenderError::stale("vertex array"))?;
            if range.end > count {
                return Err(RenderError::Device(format!(
                    "draw range {:?} exceeds {} vertices",
                    range, count
                )));
            }
        }

        let mut textures = Vec::new();
        for unit in layout.sampled_units() {
            let texture = *self.bound_textures.get(&unit.0).ok_or_else(|| {
                RenderError::Device(format!("program '{}' samples empty unit {}", label, unit.0))
            })?;
            self.check_texture(texture)?;
            textures.push((*unit, texture));
        }
        // sampling a texture while rendering into it is a feedback loop
        if let Some(target) = self.framebuffer.and_then(|f| self.framebuffers.get(f)) {
            let attached = [target.attachments.color, target.attachments.depth];
            if textures.iter().any(|(_, t)| attached.contains(&Some(*t))) {
                return Err(RenderError::Device(
                    "texture bound for sampling is attached to the current framebuffer".into(),
                ));
            }
        }

        self.calls.push(Call::Draw(DrawCall {
            program: label,
            framebuffer: self.framebuffer,
            textures,
            viewport: self.viewport,
            depth_bias: self.depth_bias,
            uniforms: self.uniforms,
            range,
        }));
        Ok(())
    }

    fn read_pixels(&mut self, framebuffer: FramebufferId) -> RenderResult<PixelBuffer> {
        let record = self
            .framebuffers
            .get(framebuffer)
            .ok_or_else(|| RenderError::stale("framebuffer"))?;
        if record.attachments.color.is_none() {
            return Err(RenderError::Device("framebuffer has no color attachment".into()));
        }
        let (width, height) = record.size;
        self.calls.push(Call::ReadPixels(framebuffer));
        Ok(PixelBuffer {
            width,
            height,
            data: vec![255; (width * height * 4) as usize],
        })
    }

    fn check_error(&mut self) -> RenderResult<()> {
        match self.latched_error.take() {
            Some(message) => Err(RenderError::Device(message)),
            None => Ok(()),
        }
    }
}
