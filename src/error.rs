//! Error types shared by the renderer, the asset loaders and the screenshot path
//!
//! Initialization errors abort startup and per-frame errors stop the event
//! loop; the app logs the message and exits. A failed screenshot is only
//! logged, since the frame itself was rendered.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while creating or driving rendering resources
#[derive(Debug, Error)]
pub enum RenderError {
    /// Window surface, adapter or device could not be created
    #[error("failed to create graphics context: {0}")]
    ContextCreation(String),

    /// A shader program failed to compile or link
    #[error("shader program '{label}' failed to compile: {message}")]
    Compile { label: String, message: String },

    /// An offscreen render target did not pass the completeness check
    #[error("framebuffer '{label}' is incomplete: {reason}")]
    ResourceCreation { label: String, reason: String },

    /// The asset importer could not read the mesh file
    #[error("unable to load mesh from {path}: {reason}")]
    MeshImport { path: PathBuf, reason: String },

    /// The mesh contains faces that are not triangles
    #[error("only triangle meshes are supported: {path} has a face with {arity} vertices")]
    UnsupportedTopology { path: PathBuf, arity: usize },

    /// Vertex data violates the triangle-list layout
    #[error("invalid mesh data: {0}")]
    InvalidMesh(String),

    /// One of the six cube map faces could not be used
    #[error("cube map face {face}: {reason}")]
    CubeMap { face: PathBuf, reason: String },

    /// The graphics device reported an error after a state change
    #[error("graphics device error: {0}")]
    Device(String),

    /// A resource handle outlived the resource it pointed to
    #[error("stale or unknown {kind} handle")]
    StaleHandle { kind: &'static str },

    /// Passes were issued out of order within a frame
    #[error("render pass order violated: {0}")]
    PassOrder(String),

    /// Encoding or writing a screenshot failed
    #[error("screenshot failed: {0}")]
    Screenshot(String),

    /// The config file exists but could not be parsed or holds unusable values
    #[error("invalid config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    pub(crate) fn stale(kind: &'static str) -> Self {
        RenderError::StaleHandle { kind }
    }
}
