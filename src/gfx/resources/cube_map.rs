//! Environment cube map loading
//!
//! Six faces named `posx negx posy negy posz negz` plus an extension are read
//! from one directory and uploaded as a single cube texture.

use std::path::Path;

use crate::error::{RenderError, RenderResult};
use crate::gfx::rendering::device::{GraphicsDevice, TextureDesc, TextureId, TextureUnit};

/// Face file stems in +X, -X, +Y, -Y, +Z, -Z order
pub const FACE_NAMES: [&str; 6] = ["posx", "negx", "posy", "negy", "posz", "negz"];

const FALLBACK_GREY: [u8; 4] = [128, 128, 128, 255];

#[derive(Debug)]
pub struct CubeMap {
    texture: TextureId,
    face_size: u32,
}

impl CubeMap {
    /// Loads the six faces from `directory`
    ///
    /// A missing directory yields a uniform grey cube map so the demo still
    /// runs without assets; any face that exists but cannot be used is fatal.
    pub fn load<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        directory: &Path,
        extension: &str,
    ) -> RenderResult<Self> {
        if !directory.is_dir() {
            log::warn!(
                "Cube map directory {} not found, using a uniform grey environment",
                directory.display()
            );
            return Self::uniform(device, FALLBACK_GREY);
        }

        let (face_size, faces) = load_faces(directory, extension)?;
        let texture = device.create_cube_texture(
            &TextureDesc::cube(&format!("cube map {}", directory.display()), face_size),
            &faces,
        )?;
        log::info!(
            "Loaded cube map from {} ({}x{} faces)",
            directory.display(),
            face_size,
            face_size
        );
        Ok(Self { texture, face_size })
    }

    /// One-texel cube map of a single color
    pub fn uniform<D: GraphicsDevice + ?Sized>(device: &mut D, rgba: [u8; 4]) -> RenderResult<Self> {
        let faces: [Vec<u8>; 6] = std::array::from_fn(|_| rgba.to_vec());
        let texture = device.create_cube_texture(&TextureDesc::cube("uniform cube map", 1), &faces)?;
        Ok(Self {
            texture,
            face_size: 1,
        })
    }

    pub fn bind_texture<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        unit: TextureUnit,
    ) -> RenderResult<()> {
        device.bind_texture(unit, self.texture)
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn face_size(&self) -> u32 {
        self.face_size
    }
}

/// Decodes the six faces into tightly packed RGBA8, checking they are square
/// and equally sized
pub fn load_faces(directory: &Path, extension: &str) -> RenderResult<(u32, [Vec<u8>; 6])> {
    let mut size = None;
    let mut faces = Vec::with_capacity(FACE_NAMES.len());

    for name in FACE_NAMES {
        let face = directory.join(format!("{name}.{extension}"));
        let image = image::open(&face)
            .map_err(|e| RenderError::CubeMap {
                face: face.clone(),
                reason: e.to_string(),
            })?
            .to_rgba8();

        let (width, height) = image.dimensions();
        if width != height || width == 0 {
            return Err(RenderError::CubeMap {
                face,
                reason: format!("face must be square, got {}x{}", width, height),
            });
        }
        match size {
            None => size = Some(width),
            Some(expected) if expected != width => {
                return Err(RenderError::CubeMap {
                    face,
                    reason: format!("face is {0}x{0}, expected {1}x{1}", width, expected),
                });
            }
            Some(_) => {}
        }
        faces.push(image.into_raw());
    }

    let faces: [Vec<u8>; 6] = faces.try_into().map_err(|_| RenderError::CubeMap {
        face: directory.to_path_buf(),
        reason: "expected six faces".into(),
    })?;
    Ok((size.unwrap_or(0), faces))
}
