//! egui overlay on the wgpu swapchain

use egui::ViewportId;
use egui_wgpu::ScreenDescriptor;
use winit::dpi::PhysicalPosition;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::backend::traits::{BackendError, BackendResult};
use crate::backend::wgpu_backend::{FrameContext, WgpuBackend};

/// Ratio between surface pixels and window pixels.
///
/// The surface is smaller than the window only when it was clamped to the
/// device's texture limit; pointer positions are scaled by the same ratio.
pub fn surface_scale(window_size: (u32, u32), surface_size: (u32, u32)) -> f32 {
    if window_size.0 == 0 || window_size.1 == 0 {
        return 1.0;
    }
    let x = surface_size.0 as f32 / window_size.0 as f32;
    let y = surface_size.1 as f32 / window_size.1 as f32;
    x.min(y)
}

/// egui context, winit input state and wgpu renderer for the overlay window
pub struct WgpuEguiIntegration {
    ctx: egui::Context,
    winit_state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    /// Output of the last [`run`](Self::run), consumed by [`paint`](Self::paint)
    paint_jobs: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    pixels_per_point: f32,
    input_scale: f32,
}

impl WgpuEguiIntegration {
    /// Fails for a headless backend, which has no surface to draw onto.
    pub fn new(backend: &WgpuBackend, window: &Window) -> BackendResult<Self> {
        let surface_format = backend.surface_format().ok_or_else(|| {
            BackendError::SurfaceCreationFailed("egui needs a windowed backend".into())
        })?;
        let ctx = egui::Context::default();
        let winit_state = egui_winit::State::new(
            ctx.clone(),
            ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );
        let renderer = egui_wgpu::Renderer::new(backend.device(), surface_format, None, 1);

        Ok(Self {
            ctx,
            winit_state,
            renderer,
            paint_jobs: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
            pixels_per_point: window.scale_factor() as f32,
            input_scale: 1.0,
        })
    }

    /// Track the window to surface ratio after a resize
    pub fn set_surface_scale(
        &mut self,
        window_width: u32,
        window_height: u32,
        surface_width: u32,
        surface_height: u32,
    ) {
        self.input_scale = surface_scale((window_width, window_height), (surface_width, surface_height));
    }

    /// Feed a window event to egui; returns true if egui consumed it
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let scaled;
        let event = match event {
            WindowEvent::CursorMoved {
                device_id,
                position,
            } if self.input_scale != 1.0 => {
                let scale = self.input_scale as f64;
                scaled = WindowEvent::CursorMoved {
                    device_id: *device_id,
                    position: PhysicalPosition::new(position.x * scale, position.y * scale),
                };
                &scaled
            }
            _ => event,
        };
        self.winit_state.on_window_event(window, event).consumed
    }

    /// Build this frame's UI and tessellate it for [`paint`](Self::paint)
    pub fn run(&mut self, window: &Window, mut ui: impl FnMut(&egui::Context)) {
        let mut raw_input = self.winit_state.take_egui_input(window);
        if let Some(rect) = raw_input.screen_rect.as_mut() {
            rect.max.x *= self.input_scale;
            rect.max.y *= self.input_scale;
        }

        let output = self.ctx.run(raw_input, |ctx| ui(ctx));
        self.winit_state
            .handle_platform_output(window, output.platform_output);

        self.pixels_per_point = output.pixels_per_point;
        self.paint_jobs = self.ctx.tessellate(output.shapes, output.pixels_per_point);
        self.textures_delta.append(output.textures_delta);
    }

    /// Draw the last tessellated UI on top of the frame
    pub fn paint(&mut self, backend: &mut WgpuBackend, frame: &FrameContext) {
        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [frame.width, frame.height],
            pixels_per_point: self.pixels_per_point,
        };

        let (device, queue, encoder) = backend.device_queue_encoder();
        for (id, image_delta) in &self.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }
        let Some(encoder) = encoder else {
            // No frame open; keep the texture frees for the next one
            self.textures_delta.set.clear();
            return;
        };
        self.renderer
            .update_buffers(device, queue, encoder, &self.paint_jobs, &screen_descriptor);

        backend.render_egui(&self.renderer, &self.paint_jobs, &screen_descriptor, &frame.view);

        for id in self.textures_delta.free.drain(..) {
            self.renderer.free_texture(&id);
        }
        self.textures_delta.set.clear();
    }

    pub fn context(&self) -> &egui::Context {
        &self.ctx
    }

    pub fn wants_pointer_input(&self) -> bool {
        self.ctx.wants_pointer_input()
    }

    pub fn wants_keyboard_input(&self) -> bool {
        self.ctx.wants_keyboard_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unclamped_surface_has_unit_scale() {
        assert_eq!(surface_scale((1280, 720), (1280, 720)), 1.0);
    }

    #[test]
    fn test_clamped_surface_uses_smaller_ratio() {
        assert_eq!(surface_scale((16384, 4096), (8192, 4096)), 0.5);
    }

    #[test]
    fn test_minimized_window_keeps_unit_scale() {
        assert_eq!(surface_scale((0, 0), (1, 1)), 1.0);
    }
}
