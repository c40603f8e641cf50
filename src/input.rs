//! Keyboard bindings
//!
//! Keys map to [`Action`]s that the scene applies; pointer input goes to the
//! trackball directly from the app.

use cgmath::Vector3;
use winit::keyboard::KeyCode;

use crate::gfx::scene::RenderMode;

/// Camera translation per key press, in view-space units
pub const TRANSLATE_STEP: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    SetRenderMode(RenderMode),
    ToggleShadowMap,
    ToggleDebugView,
    Screenshot,
    ZoomIn,
    ZoomOut,
    Translate(Vector3<f32>),
    Exit,
}

pub fn action_for_key(key: KeyCode, ctrl: bool) -> Option<Action> {
    let step = TRANSLATE_STEP;
    let action = match key {
        KeyCode::Escape => Action::Exit,
        KeyCode::KeyQ if ctrl => Action::Exit,

        KeyCode::Digit1 | KeyCode::Numpad1 => Action::SetRenderMode(RenderMode::Phong),
        KeyCode::Digit2 | KeyCode::Numpad2 => Action::SetRenderMode(RenderMode::Wireframe),
        KeyCode::Digit3 | KeyCode::Numpad3 => Action::SetRenderMode(RenderMode::HiddenLine),
        KeyCode::Digit4 | KeyCode::Numpad4 => Action::SetRenderMode(RenderMode::Flat),

        KeyCode::KeyT => Action::ToggleShadowMap,
        KeyCode::KeyD => Action::ToggleDebugView,
        KeyCode::KeyP => Action::Screenshot,

        // `+` shares a key with `=` on most layouts
        KeyCode::Equal | KeyCode::NumpadAdd => Action::ZoomIn,
        KeyCode::Minus | KeyCode::NumpadSubtract => Action::ZoomOut,

        KeyCode::ArrowLeft => Action::Translate(Vector3::new(-step, 0.0, 0.0)),
        KeyCode::ArrowRight => Action::Translate(Vector3::new(step, 0.0, 0.0)),
        KeyCode::ArrowUp => Action::Translate(Vector3::new(0.0, step, 0.0)),
        KeyCode::ArrowDown => Action::Translate(Vector3::new(0.0, -step, 0.0)),
        KeyCode::PageUp => Action::Translate(Vector3::new(0.0, 0.0, -step)),
        KeyCode::PageDown => Action::Translate(Vector3::new(0.0, 0.0, step)),

        _ => return None,
    };
    Some(action)
}
