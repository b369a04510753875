//! Camera controller system
//!
//! Input arrives through an explicit [`CameraInput`] snapshot that the window
//! loop fills each frame, so controllers hold no global state.

use glam::{Vec2, Vec3};

use super::camera::{MAX_ZOOM, MIN_ZOOM};
use super::Camera;

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,

    /// Mouse delta since last frame (in pixels, +y downwards)
    pub mouse_delta: Vec2,

    /// Mouse scroll delta (positive = scroll up)
    pub scroll_delta: f32,

    /// Whether mouse look is active (left mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

/// Abstract camera controller trait
pub trait CameraController {
    /// Update the camera based on input and delta time
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);

    /// Get the controller name for debugging
    fn name(&self) -> &'static str;
}

/// Free-fly camera controller
///
/// - WASD: Move along the view direction and the camera's right vector
/// - Mouse: Look around (when mouse_look_active and mouse_look_enabled)
/// - Scroll: Zoom by narrowing the field of view
pub struct FlyController {
    /// Movement speed in units per second
    pub move_speed: f32,
    /// Mouse sensitivity (degrees per pixel)
    pub mouse_sensitivity: f32,
    /// Pitch limit in degrees
    pub max_pitch: f32,
    /// Whether mouse look is applied; keys and scroll always are
    pub mouse_look_enabled: bool,
}

impl Default for FlyController {
    fn default() -> Self {
        Self {
            move_speed: 2.5,
            mouse_sensitivity: 0.1,
            max_pitch: 89.0,
            mouse_look_enabled: true,
        }
    }
}

impl FlyController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraController for FlyController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.scroll_delta != 0.0 {
            camera.zoom = (camera.zoom - input.scroll_delta).clamp(MIN_ZOOM, MAX_ZOOM);
        }

        if self.mouse_look_enabled && input.mouse_look_active && input.mouse_delta != Vec2::ZERO {
            camera.yaw += input.mouse_delta.x * self.mouse_sensitivity;
            // Screen y grows downwards
            camera.pitch -= input.mouse_delta.y * self.mouse_sensitivity;
            camera.pitch = camera.pitch.clamp(-self.max_pitch, self.max_pitch);
            camera.update_vectors();
        }

        let forward = camera.forward();
        let right = camera.right();
        let mut velocity = Vec3::ZERO;

        if input.forward {
            velocity += forward;
        }
        if input.backward {
            velocity -= forward;
        }
        if input.right {
            velocity += right;
        }
        if input.left {
            velocity -= right;
        }

        camera.position += velocity * self.move_speed * dt;
    }

    fn name(&self) -> &'static str {
        "Fly"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_moves_along_view() {
        let mut camera = Camera::default();
        let mut controller = FlyController::new();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 1.0);
        assert!((camera.position - Vec3::new(0.0, 0.0, 2.5)).length() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        let mut controller = FlyController::new();
        let input = CameraInput {
            mouse_delta: Vec2::new(0.0, -10_000.0),
            mouse_look_active: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.pitch, 89.0);
        assert!(camera.forward().y > 0.99);
    }

    #[test]
    fn test_look_ignored_without_button() {
        let mut camera = Camera::default();
        let mut controller = FlyController::new();
        let input = CameraInput {
            mouse_delta: Vec2::new(50.0, 50.0),
            ..Default::default()
        };

        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.yaw, -90.0);
        assert_eq!(camera.pitch, 0.0);
    }

    #[test]
    fn test_zoom_stays_in_range() {
        let mut camera = Camera::default();
        let mut controller = FlyController::new();

        let mut input = CameraInput {
            scroll_delta: 100.0,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.zoom, MIN_ZOOM);

        input.scroll_delta = -100.0;
        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.zoom, MAX_ZOOM);
    }

    #[test]
    fn test_disabled_look_keeps_keys_and_zoom() {
        let mut camera = Camera::default();
        let mut controller = FlyController {
            mouse_look_enabled: false,
            ..Default::default()
        };
        let input = CameraInput {
            forward: true,
            scroll_delta: 5.0,
            mouse_delta: Vec2::new(50.0, 50.0),
            mouse_look_active: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 1.0);
        assert_eq!(camera.yaw, -90.0);
        assert_eq!(camera.pitch, 0.0);
        assert!((camera.position - Vec3::new(0.0, 0.0, 2.5)).length() < 1e-5);
        assert_eq!(camera.zoom, MAX_ZOOM - 5.0);
    }
}
