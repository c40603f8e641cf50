//! Screenshot encoding and file naming

use std::path::{Path, PathBuf};

use crate::error::{RenderError, RenderResult};
use crate::gfx::rendering::device::PixelBuffer;

pub trait ImageEncoder {
    fn encode_and_save(&self, pixels: &PixelBuffer, path: &Path) -> RenderResult<()>;
}

/// PNG encoder backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn encode_and_save(&self, pixels: &PixelBuffer, path: &Path) -> RenderResult<()> {
        let mut errors = Vec::new();

        if pixels.width == 0 || pixels.height == 0 {
            errors.push(format!("empty image {}x{}", pixels.width, pixels.height));
        }
        let expected = pixels.width as usize * pixels.height as usize * 4;
        if pixels.data.len() != expected {
            errors.push(format!(
                "pixel buffer holds {} bytes, expected {}",
                pixels.data.len(),
                expected
            ));
        }

        if errors.is_empty() {
            match image::RgbaImage::from_raw(pixels.width, pixels.height, pixels.data.clone()) {
                Some(image) => {
                    if let Err(e) = image.save_with_format(path, image::ImageFormat::Png) {
                        errors.push(format!("{}: {}", path.display(), e));
                    }
                }
                None => errors.push("pixel buffer does not match its dimensions".into()),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RenderError::Screenshot(errors.join("; ")))
        }
    }
}

/// Numbers screenshots `screenshot_<N>.png` from 0 for the lifetime of the run
pub struct ScreenshotRecorder {
    directory: PathBuf,
    next_index: u32,
    encoder: Box<dyn ImageEncoder>,
}

impl ScreenshotRecorder {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_encoder(directory, Box::new(PngEncoder))
    }

    pub fn with_encoder(directory: impl Into<PathBuf>, encoder: Box<dyn ImageEncoder>) -> Self {
        Self {
            directory: directory.into(),
            next_index: 0,
            encoder,
        }
    }

    pub fn next_path(&self) -> PathBuf {
        self.directory
            .join(format!("screenshot_{}.png", self.next_index))
    }

    /// Writes the next numbered file; the counter only advances on success
    pub fn save(&mut self, pixels: &PixelBuffer) -> RenderResult<PathBuf> {
        let path = self.next_path();
        self.encoder.encode_and_save(pixels, &path)?;
        self.next_index += 1;
        log::info!(
            "Saved screenshot {} ({}x{})",
            path.display(),
            pixels.width,
            pixels.height
        );
        Ok(path)
    }
}
