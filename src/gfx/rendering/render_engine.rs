//! Frame orchestration for the shadow-mapped scene
//!
//! Sequences the passes of one frame on top of a [`GraphicsDevice`]: the depth
//! capture from the light, the optional offscreen composites for screenshots
//! and the light's-eye debug view, the main composite into the window and the
//! picture-in-picture overlays.

use crate::config::DemoConfig;
use crate::error::RenderResult;
use crate::gfx::resources::cube_map::CubeMap;
use crate::gfx::resources::framebuffer::{FramebufferTarget, TargetFormat};
use crate::gfx::scene::mesh::ViewUniforms;
use crate::gfx::scene::scene::Scene;

use super::device::{GraphicsDevice, PixelBuffer};
use super::overlay::{draw_overlay, OverlayCorner};
use super::shading::{ShaderPrograms, ShadingStrategy};
use super::shadow_pass::{color_composite, FrameSequencer, ShadowPass};

/// Core rendering engine owning every GPU resource the frame needs
///
/// The RenderEngine handles:
/// - Shader program compilation
/// - The shadow map and its depth-only pass
/// - A window-sized offscreen target for screenshots and the debug view
/// - The environment cube map
/// - Pass ordering within a frame
pub struct RenderEngine<D: GraphicsDevice> {
    device: D,
    programs: ShaderPrograms,
    shadow: ShadowPass,
    capture: FramebufferTarget,
    environment: CubeMap,
    sequencer: FrameSequencer,
}

impl<D: GraphicsDevice> RenderEngine<D> {
    /// Compiles the programs and allocates the render targets
    ///
    /// Any failure here is fatal: a missing program or an incomplete
    /// framebuffer leaves nothing sensible to draw.
    pub fn new(mut device: D, config: &DemoConfig) -> RenderResult<Self> {
        let programs = ShaderPrograms::compile(&mut device)?;
        let shadow = ShadowPass::new(&mut device, config.shadow_map_size, config.depth_bias())?;
        let (width, height) = device.window_size();
        let capture = FramebufferTarget::create(&mut device, "capture", width, height, TargetFormat::Color)?;
        let environment = CubeMap::load(&mut device, &config.cubemap_dir, &config.cubemap_extension)?;
        device.check_error()?;

        Ok(Self {
            device,
            programs,
            shadow,
            capture,
            environment,
            sequencer: FrameSequencer::new(),
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable device access, for uploading scene meshes
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Resizes the window surface and the window-sized offscreen target
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.device.resize_window(width, height);
        if self.capture.size() != (width, height) {
            let capture =
                FramebufferTarget::create(&mut self.device, "capture", width, height, TargetFormat::Color)?;
            std::mem::replace(&mut self.capture, capture).destroy(&mut self.device)?;
        }
        Ok(())
    }

    fn composite(
        &mut self,
        scene: &Scene,
        view: &ViewUniforms,
        to_capture: bool,
    ) -> RenderResult<()> {
        color_composite(
            &mut self.device,
            &mut self.sequencer,
            scene,
            &self.programs,
            ShadingStrategy::for_mode(scene.render_mode()),
            self.shadow.shadow_texture(),
            &self.environment,
            view,
            to_capture.then_some(&self.capture),
        )
    }

    /// Renders and presents one frame
    ///
    /// With `screenshot` set, the camera view is also rendered offscreen at
    /// window size and its pixels returned. Overlays are never part of it.
    pub fn render_frame(
        &mut self,
        scene: &Scene,
        screenshot: bool,
    ) -> RenderResult<Option<PixelBuffer>> {
        self.device.begin_frame()?;
        let result = self.render_passes(scene, screenshot);
        if result.is_err() {
            self.sequencer.reset();
        }
        // present whatever was recorded, then report the first failure
        let presented = self.device.end_frame();
        let pixels = result?;
        presented?;
        self.device.check_error()?;
        Ok(pixels)
    }

    fn render_passes(
        &mut self,
        scene: &Scene,
        screenshot: bool,
    ) -> RenderResult<Option<PixelBuffer>> {
        self.shadow
            .depth_capture(&mut self.device, &mut self.sequencer, scene, &self.programs)?;

        let camera = scene.camera_uniforms();
        let pixels = if screenshot {
            self.composite(scene, &camera, true)?;
            Some(self.device.read_pixels(self.capture.framebuffer())?)
        } else {
            None
        };

        if scene.show_debug_view() {
            self.composite(scene, &scene.light_uniforms(), true)?;
        }

        self.composite(scene, &camera, false)?;

        if scene.show_shadow_map() {
            draw_overlay(
                &mut self.device,
                self.programs.depth_overlay,
                self.shadow.shadow_texture(),
                OverlayCorner::LowerLeft,
            )?;
        }
        if scene.show_debug_view() {
            draw_overlay(
                &mut self.device,
                self.programs.color_overlay,
                self.capture.texture(),
                OverlayCorner::LowerRight,
            )?;
        }

        self.sequencer.finish()?;
        Ok(pixels)
    }
}
