//! Offscreen render targets
//!
//! A [`FramebufferTarget`] owns a texture and the framebuffer that renders into
//! it. Consumers receive the texture as a plain [`TextureId`] each frame and
//! must not keep it: destroying or recreating the target bumps the handle
//! generation, so a kept id fails with `StaleHandle` instead of aliasing.

use crate::error::RenderResult;
use crate::gfx::rendering::device::{
    FramebufferAttachments, FramebufferId, GraphicsDevice, TextureDesc, TextureId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// Depth texture only, no color buffer
    Depth,
    /// Color texture plus an internal depth buffer for depth testing
    Color,
}

#[derive(Debug)]
pub struct FramebufferTarget {
    label: String,
    width: u32,
    height: u32,
    format: TargetFormat,
    texture: TextureId,
    depth_buffer: Option<TextureId>,
    framebuffer: FramebufferId,
}

impl FramebufferTarget {
    /// Allocates the backing texture(s) and a complete framebuffer
    ///
    /// Fails with `ResourceCreation` when the device reports the framebuffer
    /// incomplete; textures allocated so far are released first.
    pub fn create<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        label: &str,
        width: u32,
        height: u32,
        format: TargetFormat,
    ) -> RenderResult<Self> {
        let (texture, depth_buffer, attachments) = match format {
            TargetFormat::Depth => {
                let texture =
                    device.create_texture(&TextureDesc::depth(&format!("{label} depth"), width, height))?;
                let attachments = FramebufferAttachments {
                    color: None,
                    depth: Some(texture),
                };
                (texture, None, attachments)
            }
            TargetFormat::Color => {
                let texture =
                    device.create_texture(&TextureDesc::color(&format!("{label} color"), width, height))?;
                let depth = match device.create_texture(&TextureDesc::depth(
                    &format!("{label} depth buffer"),
                    width,
                    height,
                )) {
                    Ok(depth) => depth,
                    Err(e) => {
                        device.destroy_texture(texture)?;
                        return Err(e);
                    }
                };
                let attachments = FramebufferAttachments {
                    color: Some(texture),
                    depth: Some(depth),
                };
                (texture, Some(depth), attachments)
            }
        };

        let framebuffer = match device.create_framebuffer(label, &attachments) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                device.destroy_texture(texture)?;
                if let Some(depth) = depth_buffer {
                    device.destroy_texture(depth)?;
                }
                return Err(e);
            }
        };

        log::info!("Created {:?} render target '{}' ({}x{})", format, label, width, height);

        Ok(Self {
            label: label.to_owned(),
            width,
            height,
            format,
            texture,
            depth_buffer,
            framebuffer,
        })
    }

    /// Redirects subsequent draws and clears here. The caller sets the viewport.
    pub fn bind<D: GraphicsDevice + ?Sized>(&self, device: &mut D) -> RenderResult<()> {
        device.bind_framebuffer(Some(self.framebuffer))
    }

    /// Restores the default framebuffer
    pub fn unbind<D: GraphicsDevice + ?Sized>(device: &mut D) -> RenderResult<()> {
        device.bind_framebuffer(None)
    }

    /// The texture rendered into: depth for depth targets, color otherwise
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> TargetFormat {
        self.format
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Releases the framebuffer and every texture it owns
    pub fn destroy<D: GraphicsDevice + ?Sized>(self, device: &mut D) -> RenderResult<()> {
        device.destroy_framebuffer(self.framebuffer)?;
        device.destroy_texture(self.texture)?;
        if let Some(depth) = self.depth_buffer {
            device.destroy_texture(depth)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::gfx::rendering::recording::RecordingDevice;

    #[test]
    fn test_depth_target_has_no_color_attachment() {
        let mut device = RecordingDevice::new(800, 600);
        let target =
            FramebufferTarget::create(&mut device, "shadow", 1024, 1024, TargetFormat::Depth).unwrap();

        let desc = device.texture_desc(target.texture()).unwrap();
        assert!(desc.format.is_depth());
        assert_eq!((desc.width, desc.height), (1024, 1024));
        let attachments = device.attachments(target.framebuffer()).unwrap();
        assert!(attachments.color.is_none());
        assert_eq!(attachments.depth, Some(target.texture()));
    }

    #[test]
    fn test_color_target_exposes_color_texture() {
        let mut device = RecordingDevice::new(800, 600);
        let target =
            FramebufferTarget::create(&mut device, "capture", 800, 600, TargetFormat::Color).unwrap();

        let desc = device.texture_desc(target.texture()).unwrap();
        assert!(!desc.format.is_depth());
        assert_eq!(target.size(), (800, 600));
    }

    #[test]
    fn test_incomplete_target_fails_and_releases_textures() {
        let mut device = RecordingDevice::new(800, 600);
        let err = FramebufferTarget::create(&mut device, "empty", 0, 0, TargetFormat::Depth)
            .unwrap_err();

        assert!(matches!(err, RenderError::ResourceCreation { .. }));
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn test_destroyed_target_texture_is_stale() {
        let mut device = RecordingDevice::new(800, 600);
        let target =
            FramebufferTarget::create(&mut device, "capture", 64, 64, TargetFormat::Color).unwrap();
        let texture = target.texture();
        let framebuffer = target.framebuffer();
        target.destroy(&mut device).unwrap();

        assert!(matches!(
            device.texture_desc(texture),
            Err(RenderError::StaleHandle { .. })
        ));
        assert!(matches!(
            device.bind_framebuffer(Some(framebuffer)),
            Err(RenderError::StaleHandle { .. })
        ));
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn test_bind_and_unbind() {
        let mut device = RecordingDevice::new(800, 600);
        let target =
            FramebufferTarget::create(&mut device, "shadow", 16, 16, TargetFormat::Depth).unwrap();
        target.bind(&mut device).unwrap();
        assert_eq!(device.bound_framebuffer(), Some(target.framebuffer()));
        FramebufferTarget::unbind(&mut device).unwrap();
        assert_eq!(device.bound_framebuffer(), None);
    }
}
