//! egui overlay state

use super::renderer::SkyboxSource;

/// Seconds over which the frame rate is averaged
const FPS_WINDOW: f32 = 0.5;

/// Values shown and toggled in the overlay window
#[derive(Debug, Clone)]
pub struct OverlayState {
    pub fps: f32,
    pub cursor: Option<(f64, f64)>,
    /// Scene colour under the cursor as stored in the swapchain
    pub pixel: Option<[f32; 4]>,
    pub mouse_look_enabled: bool,
    pub sky: SkyboxSource,
    /// Face sizes of the baked environment and irradiance maps
    pub map_sizes: (u32, u32),
    frames: u32,
    accumulated: f32,
}

impl OverlayState {
    pub fn new(map_sizes: (u32, u32)) -> Self {
        Self {
            fps: 0.0,
            cursor: None,
            pixel: None,
            mouse_look_enabled: true,
            sky: SkyboxSource::default(),
            map_sizes,
            frames: 0,
            accumulated: 0.0,
        }
    }

    /// Count a frame of `dt` seconds; the rate refreshes twice a second
    pub fn record_frame(&mut self, dt: f32) {
        self.frames += 1;
        self.accumulated += dt;
        if self.accumulated >= FPS_WINDOW {
            self.fps = self.frames as f32 / self.accumulated;
            self.frames = 0;
            self.accumulated = 0.0;
        }
    }

    pub fn pixel_label(&self) -> String {
        match self.pixel {
            Some([r, g, b, a]) => format!("Pixel: ({:.3}, {:.3}, {:.3}, {:.3})", r, g, b, a),
            None => "Pixel: n/a".to_string(),
        }
    }

    pub fn ui(&mut self, ctx: &egui::Context) {
        egui::Window::new("Irradiance")
            .default_pos([10.0, 10.0])
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(format!("FPS: {:.1}", self.fps));
                match self.cursor {
                    Some((x, y)) => ui.label(format!("Cursor: ({:.0}, {:.0})", x, y)),
                    None => ui.label("Cursor: outside"),
                };
                ui.label(self.pixel_label());
                ui.label(format!(
                    "Environment {0}x{0}, irradiance {1}x{1}",
                    self.map_sizes.0, self.map_sizes.1
                ));
                ui.separator();
                ui.checkbox(&mut self.mouse_look_enabled, "Mouse look");
                ui.horizontal(|ui| {
                    ui.label("Sky:");
                    ui.radio_value(&mut self.sky, SkyboxSource::Environment, "Environment");
                    ui.radio_value(&mut self.sky, SkyboxSource::Irradiance, "Irradiance");
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_averages_over_window() {
        let mut overlay = OverlayState::new((512, 32));
        for _ in 0..40 {
            overlay.record_frame(1.0 / 60.0);
        }
        assert!((overlay.fps - 60.0).abs() < 0.5);
    }

    #[test]
    fn test_pixel_label() {
        let mut overlay = OverlayState::new((512, 32));
        assert_eq!(overlay.pixel_label(), "Pixel: n/a");

        overlay.pixel = Some([1.0, 0.5, 0.0, 1.0]);
        assert_eq!(overlay.pixel_label(), "Pixel: (1.000, 0.500, 0.000, 1.000)");
    }

    #[test]
    fn test_fps_waits_for_full_window() {
        let mut overlay = OverlayState::new((512, 32));
        overlay.record_frame(0.1);
        assert_eq!(overlay.fps, 0.0);
    }
}
