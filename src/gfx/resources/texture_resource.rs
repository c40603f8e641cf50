//! Texture resource management for wgpu
//!
//! Turns a device-level [`TextureDesc`] into a GPU texture with a view and a
//! sampler suited to how the texture is read back in the shaders.

use crate::error::{RenderError, RenderResult};
use crate::gfx::rendering::device::{FilterMode, TextureDesc, TextureFormat, TextureKind};

/// GPU texture resource containing texture, view, and sampler
///
/// Depth textures carry a comparison sampler for shadow lookups; color and
/// cube textures carry a plain filtering sampler.
pub struct TextureResource {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub desc: TextureDesc,
}

pub fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn wgpu_filter(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Depth and color textures are render targets that are also sampled and
/// read back; cube textures are upload-only.
pub fn texture_usage(desc: &TextureDesc) -> wgpu::TextureUsages {
    match (desc.kind, desc.format) {
        (TextureKind::Cube, _) => {
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
        }
        (TextureKind::D2, TextureFormat::Depth32Float) => {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        }
        (TextureKind::D2, TextureFormat::Rgba8Unorm) => {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
        }
    }
}

impl TextureResource {
    /// Standard depth buffer format used throughout the renderer
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Allocates the texture described by `desc`
    ///
    /// Cube textures are filled from `faces`, six tightly packed RGBA8 images.
    pub fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        desc: &TextureDesc,
        faces: Option<&[Vec<u8>; 6]>,
    ) -> RenderResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::ResourceCreation {
                label: desc.label.clone(),
                reason: format!("zero-sized texture {}x{}", desc.width, desc.height),
            });
        }

        let layers = match desc.kind {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        };
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: layers,
        };
        let format = wgpu_format(desc.format);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: texture_usage(desc),
            view_formats: &[],
        });

        if let Some(faces) = faces {
            let face_bytes = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
            for (layer, face) in faces.iter().enumerate() {
                if face.len() != face_bytes {
                    return Err(RenderError::ResourceCreation {
                        label: desc.label.clone(),
                        reason: format!(
                            "face {} holds {} bytes, expected {}",
                            layer,
                            face.len(),
                            face_bytes
                        ),
                    });
                }
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: layer as u32,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    face,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(desc.format.bytes_per_pixel() * desc.width),
                        rows_per_image: Some(desc.height),
                    },
                    wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(match desc.kind {
                TextureKind::D2 => wgpu::TextureViewDimension::D2,
                TextureKind::Cube => wgpu::TextureViewDimension::Cube,
            }),
            ..Default::default()
        });

        let filter = wgpu_filter(desc.filter);
        let compare = desc
            .format
            .is_depth()
            .then_some(wgpu::CompareFunction::LessEqual);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", desc.label)),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare,
            ..Default::default()
        });

        Ok(Self {
            texture,
            view,
            sampler,
            desc: desc.clone(),
        })
    }

    /// Depth buffer of the default framebuffer, matching the surface size
    pub fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        label: &str,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_targets_can_be_read_back() {
        let usage = texture_usage(&TextureDesc::color("capture", 8, 8));
        assert!(usage.contains(wgpu::TextureUsages::COPY_SRC));
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
    }

    #[test]
    fn test_depth_targets_are_sampled() {
        let usage = texture_usage(&TextureDesc::depth("shadow", 8, 8));
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(!usage.contains(wgpu::TextureUsages::COPY_SRC));
        assert_eq!(
            wgpu_format(TextureFormat::Depth32Float),
            TextureResource::DEPTH_FORMAT
        );
    }

    #[test]
    fn test_cube_maps_are_upload_only() {
        let usage = texture_usage(&TextureDesc::cube("sky", 4));
        assert!(usage.contains(wgpu::TextureUsages::COPY_DST));
        assert!(!usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
    }
}
