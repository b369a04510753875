//! Interactive viewer for the baked maps
//!
//! Renders a grid of PBR spheres lit by four point lights and the diffuse
//! irradiance cubemap, with the environment (or irradiance) map as the sky.
//! The baked maps are only read here; the viewer never re-runs a capture.

mod overlay;
mod renderer;
mod shaders;

pub use overlay::OverlayState;
pub use renderer::{SceneRenderer, SkyboxSource, MAX_LIGHTS};
pub use shaders::{PBR_SHADER, SKYBOX_SHADER, UNLIT_SHADER};

use std::time::Instant;

use glam::Vec2;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::backend::traits::{BackendError, BackendResult, CaptureBackend};
use crate::backend::wgpu_backend::{FrameContext, WgpuBackend};
use crate::capture::IblMaps;
use crate::egui_integration::WgpuEguiIntegration;
use crate::scene::{CameraController, CameraInput, FlyController, Scene};
use crate::window::{Window, WindowApp};
use crate::ViewerConfig;

/// Scroll wheel pixels equivalent to one line
const PIXELS_PER_LINE: f32 = 50.0;

/// Render loop state
pub struct Viewer {
    backend: WgpuBackend,
    maps: IblMaps,
    scene: Scene,
    controller: FlyController,
    input: CameraInput,
    renderer: SceneRenderer,
    egui: WgpuEguiIntegration,
    overlay: OverlayState,
    last_cursor: Option<Vec2>,
    last_frame: Instant,
}

impl Viewer {
    /// Take ownership of a windowed backend and the maps baked on it
    pub fn new(
        window: &Window,
        backend: WgpuBackend,
        maps: IblMaps,
        config: &ViewerConfig,
    ) -> BackendResult<Self> {
        let mut scene = Scene::from_config(config);
        let (width, height) = backend.surface_size();
        scene.camera.set_aspect(width as f32, height as f32);

        let renderer = SceneRenderer::new(&backend, &scene, &maps)?;
        let mut egui = WgpuEguiIntegration::new(&backend, window.window())?;
        let (window_width, window_height) = window.dimensions();
        egui.set_surface_scale(window_width, window_height, width, height);
        let overlay = OverlayState::new((maps.environment.face_size(), maps.irradiance.face_size()));

        Ok(Self {
            backend,
            maps,
            scene,
            controller: FlyController::new(),
            input: CameraInput::new(),
            renderer,
            egui,
            overlay,
            last_cursor: None,
            last_frame: Instant::now(),
        })
    }

    pub fn maps(&self) -> &IblMaps {
        &self.maps
    }

    fn resize(&mut self, window: &Window, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.backend.resize(width, height);
        // The surface may have been clamped to device limits
        let (surface_width, surface_height) = self.backend.surface_size();
        self.renderer
            .resize(self.backend.device(), surface_width, surface_height);
        self.scene
            .camera
            .set_aspect(surface_width as f32, surface_height as f32);
        let (window_width, window_height) = window.dimensions();
        self.egui
            .set_surface_scale(window_width, window_height, surface_width, surface_height);
        log::debug!("Viewport resized to {}x{}", surface_width, surface_height);
    }

    fn handle_key(&mut self, window: &mut Window, event: &KeyEvent) {
        let pressed = event.state == ElementState::Pressed;
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        match code {
            KeyCode::KeyW => self.input.forward = pressed,
            KeyCode::KeyS => self.input.backward = pressed,
            KeyCode::KeyA => self.input.left = pressed,
            KeyCode::KeyD => self.input.right = pressed,
            KeyCode::Escape if pressed => window.request_close(),
            _ => {}
        }
    }

    /// Cursor position in surface texels; the surface may be smaller than the window
    fn surface_cursor(&self, window: &Window, frame: &FrameContext) -> Option<(u32, u32)> {
        let (x, y) = self.overlay.cursor?;
        let (window_width, window_height) = window.dimensions();
        if window_width == 0 || window_height == 0 || x < 0.0 || y < 0.0 {
            return None;
        }
        let sx = (x * frame.width as f64 / window_width as f64) as u32;
        let sy = (y * frame.height as f64 / window_height as f64) as u32;
        (sx < frame.width && sy < frame.height).then_some((sx, sy))
    }

    fn render(&mut self, window: &Window) -> Result<(), BackendError> {
        let frame = self.backend.begin_frame()?;

        self.renderer
            .render(&mut self.backend, &frame.view, &self.scene, self.overlay.sky);

        self.overlay.pixel = match self.surface_cursor(window, &frame) {
            Some((x, y)) => self.backend.read_surface_pixel(x, y).unwrap_or_else(|e| {
                log::debug!("Pixel readout failed: {}", e);
                None
            }),
            None => None,
        };

        let overlay = &mut self.overlay;
        self.egui.run(window.window(), |ctx| overlay.ui(ctx));
        self.egui.paint(&mut self.backend, &frame);

        self.backend.end_frame();
        Ok(())
    }
}

impl WindowApp for Viewer {
    fn window_event(&mut self, window: &mut Window, event: &WindowEvent) {
        let consumed = self.egui.on_window_event(window.window(), event);

        match event {
            WindowEvent::Resized(size) => self.resize(window, size.width, size.height),
            WindowEvent::KeyboardInput { event, .. }
                if !consumed && !self.egui.wants_keyboard_input() =>
            {
                self.handle_key(window, event)
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.input.mouse_look_active =
                    *state == ElementState::Pressed && !self.egui.wants_pointer_input();
            }
            WindowEvent::CursorMoved { position, .. } => {
                let cursor = Vec2::new(position.x as f32, position.y as f32);
                if let Some(last) = self.last_cursor {
                    self.input.mouse_delta += cursor - last;
                }
                self.last_cursor = Some(cursor);
                self.overlay.cursor = Some((position.x, position.y));
            }
            WindowEvent::CursorLeft { .. } => {
                self.last_cursor = None;
                self.overlay.cursor = None;
            }
            WindowEvent::MouseWheel { delta, .. } if !consumed => {
                self.input.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
            }
            _ => {}
        }
    }

    fn frame(&mut self, window: &mut Window) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.overlay.record_frame(dt);
        self.controller.mouse_look_enabled = self.overlay.mouse_look_enabled;
        self.controller.update(&mut self.scene.camera, &self.input, dt);
        self.input.reset_deltas();

        match self.render(window) {
            Ok(()) => {}
            Err(BackendError::SurfaceLost) => {
                let (width, height) = window.dimensions();
                self.resize(window, width, height);
            }
            Err(BackendError::OutOfMemory) => {
                log::error!("Out of GPU memory, closing viewer");
                window.request_close();
            }
            Err(e) => log::warn!("Frame skipped: {}", e),
        }
    }
}
