//! Graphics device abstraction used by the render passes
//!
//! The passes drive the GPU through this GL-like interface: bind a render target,
//! set the viewport, clear, pick a program, bind textures to units, set per-draw
//! uniforms and draw a contiguous vertex range. Calls are issued from a single
//! thread and execute in submission order.
//!
//! [`WgpuDevice`](super::wgpu_device::WgpuDevice) is the real implementation.

use std::ops::Range;

use cgmath::{Matrix3, Matrix4, Vector3};

use crate::error::RenderResult;
use crate::gfx::resources::handle::Handle;
use crate::gfx::scene::vertex::Vertex3D;

pub struct TextureMarker;
pub struct FramebufferMarker;
pub struct ProgramMarker;
pub struct VertexArrayMarker;

pub type TextureId = Handle<TextureMarker>;
pub type FramebufferId = Handle<FramebufferMarker>;
pub type ProgramId = Handle<ProgramMarker>;
pub type VertexArrayId = Handle<VertexArrayMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Depth32Float,
    Rgba8Unorm,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Texture allocation parameters. Textures never carry mip levels and always
/// clamp to the edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub kind: TextureKind,
    pub filter: FilterMode,
}

impl TextureDesc {
    /// Depth texture sampled with linear filtering (hardware PCF on compare)
    pub fn depth(label: &str, width: u32, height: u32) -> Self {
        Self {
            label: label.to_owned(),
            width,
            height,
            format: TextureFormat::Depth32Float,
            kind: TextureKind::D2,
            filter: FilterMode::Linear,
        }
    }

    /// RGBA8 color texture with nearest filtering
    pub fn color(label: &str, width: u32, height: u32) -> Self {
        Self {
            label: label.to_owned(),
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            kind: TextureKind::D2,
            filter: FilterMode::Nearest,
        }
    }

    /// Six square RGBA8 faces
    pub fn cube(label: &str, face_size: u32) -> Self {
        Self {
            label: label.to_owned(),
            width: face_size,
            height: face_size,
            format: TextureFormat::Rgba8Unorm,
            kind: TextureKind::Cube,
            filter: FilterMode::Linear,
        }
    }
}

/// Textures to attach to a framebuffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramebufferAttachments {
    pub color: Option<TextureId>,
    pub depth: Option<TextureId>,
}

impl FramebufferAttachments {
    /// Checks the attachment set the way a framebuffer status query would
    ///
    /// `describe` resolves a texture handle to its description. Returns the
    /// framebuffer dimensions when complete, or the reason it is not.
    pub fn check_completeness<F>(&self, describe: F) -> Result<(u32, u32), String>
    where
        F: Fn(TextureId) -> Option<TextureDesc>,
    {
        if self.color.is_none() && self.depth.is_none() {
            return Err("missing attachment: no color or depth texture attached".into());
        }

        let mut size: Option<(u32, u32)> = None;
        for (slot, texture) in [("color", self.color), ("depth", self.depth)] {
            let Some(texture) = texture else {
                continue;
            };
            let desc = describe(texture)
                .ok_or_else(|| format!("{slot} attachment refers to a destroyed texture"))?;

            if desc.kind != TextureKind::D2 {
                return Err(format!("{slot} attachment '{}' is not a 2D texture", desc.label));
            }
            if desc.width == 0 || desc.height == 0 {
                return Err(format!("{slot} attachment '{}' has zero size", desc.label));
            }
            let wants_depth = slot == "depth";
            if desc.format.is_depth() != wants_depth {
                return Err(format!(
                    "{slot} attachment '{}' has incompatible format {:?}",
                    desc.label, desc.format
                ));
            }

            match size {
                None => size = Some((desc.width, desc.height)),
                Some((w, h)) if (w, h) != (desc.width, desc.height) => {
                    return Err(format!(
                        "attachment dimensions differ: {}x{} vs {}x{}",
                        w, h, desc.width, desc.height
                    ));
                }
                Some(_) => {}
            }
        }

        size.ok_or_else(|| "missing attachment".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Which buffers a clear touches, and the values written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearFlags {
    pub color: Option<[f64; 4]>,
    pub depth: Option<f32>,
}

impl ClearFlags {
    pub fn depth_only() -> Self {
        Self {
            color: None,
            depth: Some(1.0),
        }
    }

    pub fn color_and_depth(color: [f64; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }
}

/// Polygon offset applied to depth values while rasterizing
#[derive(Debug, Clone, Copy)]
pub struct DepthBias {
    pub constant: i32,
    pub slope_scale: f32,
}

impl PartialEq for DepthBias {
    fn eq(&self, other: &Self) -> bool {
        self.constant == other.constant && self.slope_scale.to_bits() == other.slope_scale.to_bits()
    }
}

impl Eq for DepthBias {}

impl std::hash::Hash for DepthBias {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.constant.hash(state);
        self.slope_scale.to_bits().hash(state);
    }
}

/// Resource interface a program expects, which fixes its bind group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramLayout {
    /// Positions only, writes depth, no fragment stage
    DepthOnly,
    /// Full vertex layout; shadow map on unit 0 and environment cube on unit 1
    Shaded,
    /// Screen quad sampling a depth texture on unit 0
    DepthOverlay,
    /// Screen quad sampling a color texture on unit 0
    ColorOverlay,
}

impl ProgramLayout {
    pub fn uses_vertex_buffer(self) -> bool {
        matches!(self, ProgramLayout::DepthOnly | ProgramLayout::Shaded)
    }

    /// Texture units the program samples
    pub fn sampled_units(self) -> &'static [TextureUnit] {
        match self {
            ProgramLayout::DepthOnly => &[],
            ProgramLayout::Shaded => &[TextureUnit::SHADOW_MAP, TextureUnit::ENVIRONMENT],
            ProgramLayout::DepthOverlay | ProgramLayout::ColorOverlay => &[TextureUnit::OVERLAY],
        }
    }
}

/// Source and entry points of one shader program
#[derive(Debug, Clone)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: Option<&'a str>,
    pub layout: ProgramLayout,
    pub blend: bool,
}

/// Texture unit index, as in `glActiveTexture(GL_TEXTURE0 + n)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureUnit(pub u32);

impl TextureUnit {
    pub const SHADOW_MAP: TextureUnit = TextureUnit(0);
    pub const ENVIRONMENT: TextureUnit = TextureUnit(1);
    pub const OVERLAY: TextureUnit = TextureUnit(0);
}

/// Per-node inputs of the shaded programs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadedUniforms {
    pub model_view_projection: Matrix4<f32>,
    pub model_view: Matrix4<f32>,
    pub normal_matrix: Matrix3<f32>,
    /// Bias * light projection * light view * model
    pub light_transform: Matrix4<f32>,
    /// Light position in object space
    pub light_position: Vector3<f32>,
    /// Camera position in object space
    pub camera_position: Vector3<f32>,
    pub color: Vector3<f32>,
}

/// Uniform values consumed by the next draw call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawUniforms {
    /// Light projection * light view * model
    Depth { light_transform: Matrix4<f32> },
    Shaded(ShadedUniforms),
    /// 2D affine placement of the screen quad
    Overlay { transform: Matrix3<f32> },
}

/// Tightly packed RGBA8 rows, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// The single-threaded graphics context the passes render through
pub trait GraphicsDevice {
    /// Size of the default (window) framebuffer
    fn window_size(&self) -> (u32, u32);

    /// Resizes the default framebuffer. Zero sizes are ignored.
    fn resize_window(&mut self, width: u32, height: u32);

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId>;

    /// Creates a cube texture from six tightly packed RGBA8 faces in
    /// +X, -X, +Y, -Y, +Z, -Z order
    fn create_cube_texture(&mut self, desc: &TextureDesc, faces: &[Vec<u8>; 6])
        -> RenderResult<TextureId>;

    fn texture_desc(&self, texture: TextureId) -> RenderResult<TextureDesc>;

    fn destroy_texture(&mut self, texture: TextureId) -> RenderResult<()>;

    /// Creates a framebuffer from the given attachments, failing with
    /// `ResourceCreation` if the result would be incomplete
    fn create_framebuffer(
        &mut self,
        label: &str,
        attachments: &FramebufferAttachments,
    ) -> RenderResult<FramebufferId>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> RenderResult<()>;

    fn create_program(&mut self, desc: &ProgramDesc) -> RenderResult<ProgramId>;

    fn create_vertex_array(&mut self, label: &str, vertices: &[Vertex3D])
        -> RenderResult<VertexArrayId>;

    /// Starts a frame; the default framebuffer becomes available
    fn begin_frame(&mut self) -> RenderResult<()>;

    /// Submits everything recorded this frame and presents
    fn end_frame(&mut self) -> RenderResult<()>;

    /// Redirects subsequent clears and draws. `None` is the default framebuffer.
    /// The viewport is left untouched.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> RenderResult<()>;

    fn set_viewport(&mut self, viewport: Viewport);

    fn clear(&mut self, flags: ClearFlags);

    /// Enables (`Some`) or disables (`None`) polygon offset
    fn set_depth_bias(&mut self, bias: Option<DepthBias>);

    fn use_program(&mut self, program: ProgramId) -> RenderResult<()>;

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId) -> RenderResult<()>;

    fn set_uniforms(&mut self, uniforms: DrawUniforms);

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> RenderResult<()>;

    /// Draws `range` of the bound vertex array (triangles, or a four-vertex
    /// strip for overlay programs)
    fn draw_arrays(&mut self, range: Range<u32>) -> RenderResult<()>;

    /// Blocking readback of a framebuffer's color attachment. Everything
    /// submitted before the call is executed first.
    fn read_pixels(&mut self, framebuffer: FramebufferId) -> RenderResult<PixelBuffer>;

    /// Returns and clears the first error the device latched since the last check
    fn check_error(&mut self) -> RenderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::resources::handle::HandlePool;

    fn pool_with(descs: &[TextureDesc]) -> (HandlePool<TextureMarker, TextureDesc>, Vec<TextureId>) {
        let mut pool = HandlePool::new();
        let ids = descs.iter().map(|d| pool.insert(d.clone())).collect();
        (pool, ids)
    }

    #[test]
    fn test_complete_color_and_depth() {
        let (pool, ids) = pool_with(&[
            TextureDesc::color("c", 64, 32),
            TextureDesc::depth("d", 64, 32),
        ]);
        let attachments = FramebufferAttachments {
            color: Some(ids[0]),
            depth: Some(ids[1]),
        };
        let size = attachments.check_completeness(|id| pool.get(id).cloned());
        assert_eq!(size, Ok((64, 32)));
    }

    #[test]
    fn test_mismatched_dimensions_incomplete() {
        let (pool, ids) = pool_with(&[
            TextureDesc::color("c", 64, 64),
            TextureDesc::depth("d", 32, 32),
        ]);
        let attachments = FramebufferAttachments {
            color: Some(ids[0]),
            depth: Some(ids[1]),
        };
        assert!(attachments
            .check_completeness(|id| pool.get(id).cloned())
            .is_err());
    }

    #[test]
    fn test_no_attachment_incomplete() {
        let attachments = FramebufferAttachments::default();
        assert!(attachments.check_completeness(|_| None).is_err());
    }

    #[test]
    fn test_depth_texture_in_color_slot_incomplete() {
        let (pool, ids) = pool_with(&[TextureDesc::depth("d", 16, 16)]);
        let attachments = FramebufferAttachments {
            color: Some(ids[0]),
            depth: None,
        };
        assert!(attachments
            .check_completeness(|id| pool.get(id).cloned())
            .is_err());
    }
}
