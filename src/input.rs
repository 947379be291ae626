// Input tracking and fly camera control
//
// InputState folds winit events into queryable per-frame state. The
// controller moves a transform in the XZ plane with WASD/EQ, with
// right-mouse look and a left-mouse speed boost.

use glam::{Vec2, Vec3};
use std::collections::HashSet;
use std::f32::consts::TAU;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::scene::Transform;

#[derive(Default)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
    mouse_buttons: HashSet<MouseButton>,
    cursor: Vec2,
    previous_cursor: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a window event. Returns true when the event was consumed.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.pressed.insert(code),
                        ElementState::Released => self.pressed.remove(&code),
                    };
                    return true;
                }
                false
            }
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => self.mouse_buttons.insert(*button),
                    ElementState::Released => self.mouse_buttons.remove(button),
                };
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                true
            }
            _ => false,
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons.contains(&button)
    }

    /// Cursor movement since the last call. Call once per frame.
    pub fn take_cursor_delta(&mut self) -> Vec2 {
        let delta = self.cursor - self.previous_cursor;
        self.previous_cursor = self.cursor;
        delta
    }
}

pub struct CameraController {
    pub move_speed: f32,
    pub boost_speed: f32,
    pub turn_speed: f32,
}

impl CameraController {
    pub fn new(move_speed: f32, turn_speed: f32) -> Self {
        Self {
            move_speed,
            boost_speed: move_speed * 3.0,
            turn_speed,
        }
    }

    pub fn update(&self, input: &mut InputState, delta: f32, viewer: &mut Transform) {
        let cursor_delta = input.take_cursor_delta();

        if input.is_mouse_pressed(MouseButton::Right) {
            let look = Vec3::new(-cursor_delta.y, cursor_delta.x, 0.0);
            if look.length_squared() > 1e-4 {
                viewer.rotation += self.turn_speed * delta * look;
            }
        }

        viewer.rotation.x = viewer
            .rotation
            .x
            .clamp(-89f32.to_radians(), 89f32.to_radians());
        viewer.rotation.y = viewer.rotation.y.rem_euclid(TAU);

        let yaw = viewer.rotation.y;
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        let up = Vec3::new(0.0, -1.0, 0.0);

        let mut direction = Vec3::ZERO;
        if input.is_pressed(KeyCode::KeyW) {
            direction += forward;
        }
        if input.is_pressed(KeyCode::KeyS) {
            direction -= forward;
        }
        if input.is_pressed(KeyCode::KeyD) {
            direction += right;
        }
        if input.is_pressed(KeyCode::KeyA) {
            direction -= right;
        }
        if input.is_pressed(KeyCode::KeyE) {
            direction += up;
        }
        if input.is_pressed(KeyCode::KeyQ) {
            direction -= up;
        }

        if direction.length_squared() > f32::EPSILON {
            let speed = if input.is_mouse_pressed(MouseButton::Left) {
                self.boost_speed
            } else {
                self.move_speed
            };
            viewer.translation += speed * delta * direction.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut InputState, code: KeyCode) {
        input.pressed.insert(code);
    }

    #[test]
    fn forward_key_moves_along_view_direction() {
        let mut input = InputState::new();
        press(&mut input, KeyCode::KeyW);
        let controller = CameraController::new(3.0, 6.0);
        let mut viewer = Transform::default();

        controller.update(&mut input, 1.0, &mut viewer);

        // Yaw 0 looks down +Z
        assert!(viewer.translation.z > 2.9);
        assert!(viewer.translation.x.abs() < 1e-5);
    }

    #[test]
    fn opposing_keys_cancel_out() {
        let mut input = InputState::new();
        press(&mut input, KeyCode::KeyW);
        press(&mut input, KeyCode::KeyS);
        let controller = CameraController::new(3.0, 6.0);
        let mut viewer = Transform::default();

        controller.update(&mut input, 1.0, &mut viewer);
        assert_eq!(viewer.translation, Vec3::ZERO);
    }

    #[test]
    fn boost_scales_movement() {
        let controller = CameraController::new(3.0, 6.0);

        let mut input = InputState::new();
        press(&mut input, KeyCode::KeyW);
        let mut normal = Transform::default();
        controller.update(&mut input, 1.0, &mut normal);

        input.mouse_buttons.insert(MouseButton::Left);
        let mut boosted = Transform::default();
        controller.update(&mut input, 1.0, &mut boosted);

        assert!(boosted.translation.z > normal.translation.z * 2.0);
    }

    #[test]
    fn look_requires_right_mouse_button() {
        let controller = CameraController::new(3.0, 6.0);
        let mut viewer = Transform::default();

        let mut input = InputState::new();
        input.cursor = Vec2::new(100.0, 50.0);
        controller.update(&mut input, 0.016, &mut viewer);
        assert_eq!(viewer.rotation, Vec3::ZERO);

        input.cursor = Vec2::new(140.0, 50.0);
        input.mouse_buttons.insert(MouseButton::Right);
        controller.update(&mut input, 0.016, &mut viewer);
        assert!(viewer.rotation.y > 0.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let controller = CameraController::new(3.0, 6.0);
        let mut viewer = Transform::default();
        let mut input = InputState::new();
        input.mouse_buttons.insert(MouseButton::Right);

        // Drag the mouse hard downward repeatedly
        for i in 1..50 {
            input.cursor = Vec2::new(0.0, i as f32 * 500.0);
            controller.update(&mut input, 0.1, &mut viewer);
        }
        assert!(viewer.rotation.x >= -89f32.to_radians() - 1e-5);
        assert!(viewer.rotation.x <= 89f32.to_radians() + 1e-5);
    }

    #[test]
    fn yaw_wraps_into_full_turn() {
        let controller = CameraController::new(3.0, 6.0);
        let mut viewer = Transform::default();
        viewer.rotation.y = TAU + 1.0;
        let mut input = InputState::new();
        controller.update(&mut input, 0.016, &mut viewer);
        assert!(viewer.rotation.y >= 0.0 && viewer.rotation.y < TAU);
    }

    #[test]
    fn key_release_clears_state() {
        let mut input = InputState::new();
        press(&mut input, KeyCode::KeyW);
        assert!(input.is_pressed(KeyCode::KeyW));
        input.pressed.remove(&KeyCode::KeyW);
        assert!(!input.is_pressed(KeyCode::KeyW));
    }
}
