// src/wgpu_utils/mod.rs
//! WGPU utility functions and helpers
//!
//! Binding layout shorthands and the per-draw uniform buffer used by the
//! wgpu device.

pub mod binding_types;
pub mod uniform_buffer;

pub use binding_types::*;
pub use uniform_buffer::DynamicUniformBuffer;
