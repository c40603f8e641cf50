//! Window, event loop and per-frame driving
//!
//! Key presses become [`Action`]s applied to the scene, left-button drags feed
//! the trackball, and every redraw advances the light and renders a frame.
//! Any render error is logged and ends the event loop.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{ModifiersState, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::DemoConfig;
use crate::error::RenderResult;
use crate::gfx::{
    rendering::WgpuDevice,
    resources::ScreenshotRecorder,
    scene::{ObjImporter, Scene},
    RenderEngine,
};
use crate::input::action_for_key;

pub struct ShadowboxApp {
    event_loop: EventLoop<()>,
    app_state: AppState,
}

/// Renderer and scene, created once the window exists
struct Running {
    window: Arc<Window>,
    engine: RenderEngine<WgpuDevice>,
    scene: Scene,
}

struct AppState {
    config: DemoConfig,
    running: Option<Running>,
    screenshots: ScreenshotRecorder,
    last_frame: Instant,
    cursor: PhysicalPosition<f64>,
    modifiers: ModifiersState,
    /// First fatal error; the loop exits as soon as it is set
    error: Option<anyhow::Error>,
}

impl ShadowboxApp {
    pub fn new(config: DemoConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let screenshots = ScreenshotRecorder::new(&config.screenshot_dir);

        Ok(Self {
            event_loop,
            app_state: AppState {
                config,
                running: None,
                screenshots,
                last_frame: Instant::now(),
                cursor: PhysicalPosition::new(0.0, 0.0),
                modifiers: ModifiersState::empty(),
                error: None,
            },
        })
    }

    /// Runs until the window closes or a frame fails
    pub fn run(mut self) -> anyhow::Result<()> {
        self.event_loop.set_control_flow(ControlFlow::Poll);
        self.event_loop
            .run_app(&mut self.app_state)
            .context("event loop terminated abnormally")?;

        match self.app_state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error.get_or_insert(error);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<Running> {
        let attributes = WindowAttributes::default()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );

        let device = pollster::block_on(WgpuDevice::new(window.clone()))?;
        let mut engine = RenderEngine::new(device, &self.config)?;
        let mut scene = Scene::load(engine.device_mut(), &self.config, &ObjImporter)?;

        let PhysicalSize { width, height } = window.inner_size();
        scene.resize(width, height);
        engine.resize(width, height)?;

        Ok(Running {
            window,
            engine,
            scene,
        })
    }

    fn redraw(&mut self) -> RenderResult<()> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };

        let now = Instant::now();
        running
            .scene
            .update(now.duration_since(self.last_frame).as_secs_f32());
        self.last_frame = now;

        let screenshot = running.scene.take_screenshot_request();
        if let Some(pixels) = running.engine.render_frame(&running.scene, screenshot)? {
            // a failed screenshot costs the file, not the session
            if let Err(e) = self.screenshots.save(&pixels) {
                log::error!("{e}");
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        let PhysicalKey::Code(key) = event.physical_key else {
            return;
        };
        let Some(action) = action_for_key(key, self.modifiers.control_key()) else {
            return;
        };
        if let Some(running) = self.running.as_mut() {
            if !running.scene.apply(action) {
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }

        match self.start(event_loop) {
            Ok(running) => {
                self.running = Some(running);
                self.last_frame = Instant::now();
            }
            Err(e) => self.fail(event_loop, e.context("initialization failed")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let Some(running) = self.running.as_mut() else {
                    return;
                };
                let (x, y) = (self.cursor.x as f32, self.cursor.y as f32);
                match state {
                    ElementState::Pressed => running.scene.trackball.rotate_begin(x, y),
                    ElementState::Released => running.scene.trackball.rotate_end(),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = position;
                if let Some(running) = self.running.as_mut() {
                    if running.scene.trackball.is_rotating() {
                        let zoom = running.scene.camera.zoom;
                        running
                            .scene
                            .trackball
                            .rotate(position.x as f32, position.y as f32, zoom);
                    }
                }
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                let Some(running) = self.running.as_mut() else {
                    return;
                };
                if width == 0 || height == 0 {
                    return;
                }
                running.scene.resize(width, height);
                if let Err(e) = running.engine.resize(width, height) {
                    self.fail(event_loop, e.into());
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, anyhow::Error::new(e).context("frame failed"));
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            running.window.request_redraw();
        }
    }
}
