//! Depth capture from the light and the shadowed color composite
//!
//! A frame is strictly ordered: one depth capture, then any number of color
//! composites sampling the captured depth. [`FrameSequencer`] rejects anything
//! else with `PassOrder`, so a composite can never read a stale or
//! half-written shadow map.

use cgmath::Matrix4;

use crate::error::{RenderError, RenderResult};
use crate::gfx::resources::cube_map::CubeMap;
use crate::gfx::resources::framebuffer::{FramebufferTarget, TargetFormat};
use crate::gfx::scene::mesh::ViewUniforms;
use crate::gfx::scene::scene::{ObjectKind, Scene};

use super::device::{ClearFlags, DepthBias, GraphicsDevice, TextureId, TextureUnit, Viewport};
use super::shading::{ShaderPrograms, ShadingStrategy};

/// Maps clip coordinates in `[-1, 1]` to texture coordinates and depth in `[0, 1]`
#[rustfmt::skip]
pub const BIAS: Matrix4<f32> = Matrix4::new(
    0.5, 0.0, 0.0, 0.0,
    0.0, 0.5, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.5, 0.5, 0.5, 1.0,
);

pub const CLEAR_COLOR: [f64; 4] = [1.0, 1.0, 1.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    DepthCapture,
    ColorComposite,
}

/// Enforces depth capture before color composites within one frame
#[derive(Debug)]
pub struct FrameSequencer {
    state: PassState,
}

impl Default for FrameSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self {
            state: PassState::Idle,
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn begin_depth_capture(&mut self) -> RenderResult<()> {
        match self.state {
            PassState::Idle => {
                self.state = PassState::DepthCapture;
                Ok(())
            }
            state => Err(RenderError::PassOrder(format!(
                "depth capture started in state {state:?}"
            ))),
        }
    }

    pub fn begin_color_composite(&mut self) -> RenderResult<()> {
        match self.state {
            PassState::DepthCapture | PassState::ColorComposite => {
                self.state = PassState::ColorComposite;
                Ok(())
            }
            PassState::Idle => Err(RenderError::PassOrder(
                "color composite before depth capture".into(),
            )),
        }
    }

    /// Ends the frame; at least one composite must have run
    pub fn finish(&mut self) -> RenderResult<()> {
        let state = std::mem::replace(&mut self.state, PassState::Idle);
        match state {
            PassState::ColorComposite => Ok(()),
            state => Err(RenderError::PassOrder(format!(
                "frame finished in state {state:?}"
            ))),
        }
    }

    /// Drops a frame abandoned by an error
    pub fn reset(&mut self) {
        self.state = PassState::Idle;
    }
}

/// The shadow map and the depth-only pass that fills it
pub struct ShadowPass {
    target: FramebufferTarget,
    bias: DepthBias,
}

impl ShadowPass {
    pub fn new<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        size: u32,
        bias: DepthBias,
    ) -> RenderResult<Self> {
        let target = FramebufferTarget::create(device, "shadow map", size, size, TargetFormat::Depth)?;
        Ok(Self { target, bias })
    }

    /// Depth texture written by the last capture. Valid for the current frame only.
    pub fn shadow_texture(&self) -> TextureId {
        self.target.texture()
    }

    pub fn size(&self) -> (u32, u32) {
        self.target.size()
    }

    /// Renders every shadow caster from the light into the shadow map
    ///
    /// Polygon offset is enabled for the pass and disabled again afterwards.
    pub fn depth_capture<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        sequencer: &mut FrameSequencer,
        scene: &Scene,
        programs: &ShaderPrograms,
    ) -> RenderResult<()> {
        sequencer.begin_depth_capture()?;

        let (width, height) = self.target.size();
        self.target.bind(device)?;
        device.set_viewport(Viewport::full(width, height));
        device.clear(ClearFlags::depth_only());
        device.set_depth_bias(Some(self.bias));
        device.use_program(programs.depth)?;

        let light_view_projection = scene.light.view_projection();
        for object in scene.objects().iter().filter(|o| o.casts_shadow()) {
            scene.meshes()[object.mesh].render_depth(device, &light_view_projection, &object.model)?;
        }

        device.set_depth_bias(None);
        Ok(())
    }
}

/// Renders the shaded scene into `target`, or the window when `None`
///
/// The walls always use Phong; instances use `strategy`. Both sample the
/// shadow map on unit 0 and the environment on unit 1.
#[allow(clippy::too_many_arguments)]
pub fn color_composite<D: GraphicsDevice + ?Sized>(
    device: &mut D,
    sequencer: &mut FrameSequencer,
    scene: &Scene,
    programs: &ShaderPrograms,
    strategy: ShadingStrategy,
    shadow_texture: TextureId,
    environment: &CubeMap,
    view: &ViewUniforms,
    target: Option<&FramebufferTarget>,
) -> RenderResult<()> {
    sequencer.begin_color_composite()?;

    let (width, height) = match target {
        Some(target) => {
            target.bind(device)?;
            target.size()
        }
        None => {
            FramebufferTarget::unbind(device)?;
            device.window_size()
        }
    };
    device.set_viewport(Viewport::full(width, height));
    device.clear(ClearFlags::color_and_depth(CLEAR_COLOR));

    device.bind_texture(TextureUnit::SHADOW_MAP, shadow_texture)?;
    environment.bind_texture(device, TextureUnit::ENVIRONMENT)?;

    for (kind, program) in [
        (ObjectKind::Walls, programs.phong),
        (ObjectKind::Instance, strategy.program(programs)),
    ] {
        device.use_program(program)?;
        for object in scene.objects().iter().filter(|o| o.kind == kind) {
            scene.meshes()[object.mesh].render_shaded(device, view, &object.model, object.color)?;
        }
    }
    Ok(())
}
