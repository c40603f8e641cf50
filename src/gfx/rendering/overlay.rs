//! Picture-in-picture quads drawn over the finished frame

use cgmath::{Matrix3, Vector3};

use crate::error::RenderResult;

use super::device::{DrawUniforms, GraphicsDevice, ProgramId, TextureId, TextureUnit, Viewport};

/// Window quarter an overlay covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayCorner {
    LowerLeft,
    LowerRight,
}

/// Scales the full-screen quad by half and moves it into `corner`
pub fn overlay_transform(corner: OverlayCorner) -> Matrix3<f32> {
    let offset = match corner {
        OverlayCorner::LowerLeft => -0.5,
        OverlayCorner::LowerRight => 0.5,
    };
    Matrix3::from_cols(
        Vector3::new(0.5, 0.0, 0.0),
        Vector3::new(0.0, 0.5, 0.0),
        Vector3::new(offset, -0.5, 1.0),
    )
}

/// Draws `texture` into a quarter of the default framebuffer
///
/// The quad needs no vertex array; the program builds it from the vertex index.
pub fn draw_overlay<D: GraphicsDevice + ?Sized>(
    device: &mut D,
    program: ProgramId,
    texture: TextureId,
    corner: OverlayCorner,
) -> RenderResult<()> {
    device.bind_framebuffer(None)?;
    let (width, height) = device.window_size();
    device.set_viewport(Viewport::full(width, height));
    device.use_program(program)?;
    device.bind_texture(TextureUnit::OVERLAY, texture)?;
    device.set_uniforms(DrawUniforms::Overlay {
        transform: overlay_transform(corner),
    });
    device.draw_arrays(0..4)
}
