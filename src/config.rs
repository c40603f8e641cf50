//! Demo configuration
//!
//! Every field has a default matching the built-in scene. A `shadowbox.json`
//! in the working directory overrides any subset of them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};
use crate::gfx::rendering::device::DepthBias;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,

    pub model_path: PathBuf,
    /// Loads the model inside out (negated scale and normals)
    pub invert_model: bool,
    pub instance_count: usize,

    pub cubemap_dir: PathBuf,
    pub cubemap_extension: String,
    pub screenshot_dir: PathBuf,

    pub shadow_map_size: u32,
    pub depth_bias_constant: i32,
    pub depth_bias_slope: f32,

    pub near_plane: f32,
    pub far_plane: f32,
    /// Vertical field of view in degrees
    pub fovy: f32,
    pub light_start: [f32; 3],
    pub light_degrees_per_second: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            window_title: "shadowbox".into(),
            window_width: 800,
            window_height: 600,
            model_path: PathBuf::from("models/bunny.obj"),
            invert_model: false,
            instance_count: 20,
            cubemap_dir: PathBuf::from("cubemaps/diffuse/"),
            cubemap_extension: "jpg".into(),
            screenshot_dir: PathBuf::from("."),
            shadow_map_size: 1024,
            depth_bias_constant: 2,
            depth_bias_slope: 2.0,
            near_plane: 0.5,
            far_plane: 30.0,
            fovy: 45.0,
            light_start: [10.0, 0.0, 0.0],
            light_degrees_per_second: 10.0,
        }
    }
}

impl DemoConfig {
    pub const FILE_NAME: &'static str = "shadowbox.json";

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads and validates the config at `path`
    pub fn from_file(path: &Path) -> RenderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content).map_err(|e| RenderError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate().map_err(|reason| RenderError::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    /// `shadowbox.json` from `dir` when present, defaults otherwise
    pub fn load_or_default(dir: &Path) -> RenderResult<Self> {
        let path = dir.join(Self::FILE_NAME);
        if path.is_file() {
            log::info!("Loading config from {}", path.display());
            Self::from_file(&path)
        } else {
            log::info!("No {} found, using defaults", Self::FILE_NAME);
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err("window size must be non-zero".into());
        }
        if self.shadow_map_size == 0 {
            return Err("shadow map size must be non-zero".into());
        }
        if !(self.near_plane > 0.0 && self.far_plane > self.near_plane) {
            return Err(format!(
                "need 0 < near < far, got near {} far {}",
                self.near_plane, self.far_plane
            ));
        }
        if !(self.fovy > 0.0 && self.fovy < 180.0) {
            return Err(format!("field of view {} out of range", self.fovy));
        }
        Ok(())
    }

    /// Edge length of the walls cube
    pub fn cube_scale(&self) -> f32 {
        self.far_plane * 0.75
    }

    pub fn depth_bias(&self) -> DepthBias {
        DepthBias {
            constant: self.depth_bias_constant,
            slope_scale: self.depth_bias_slope,
        }
    }
}
