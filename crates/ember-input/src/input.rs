//! Combined keyboard and mouse input.

use winit::event::{DeviceEvent, WindowEvent};
use winit::keyboard::KeyCode;

use crate::keyboard::KeyboardState;
use crate::mouse::{MouseButton, MouseState};

/// Input state fed from window and device events.
///
/// Call [`end_frame`](Self::end_frame) once per frame after all consumers
/// have read the state.
#[derive(Debug, Default)]
pub struct InputManager {
    keyboard: KeyboardState,
    mouse: MouseState,
}

impl InputManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut KeyboardState {
        &mut self.keyboard
    }

    #[must_use]
    pub const fn mouse(&self) -> &MouseState {
        &self.mouse
    }

    pub fn mouse_mut(&mut self) -> &mut MouseState {
        &mut self.mouse
    }

    /// Returns `true` if the event was an input event.
    pub fn process_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                self.keyboard.process_key_event(event);
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse.set_position(position.x, position.y);
                true
            }
            WindowEvent::MouseInput { button, state, .. } => {
                self.mouse.process_button(*button, *state);
                true
            }
            WindowEvent::Focused(false) => {
                // Releases are not delivered while unfocused
                self.clear();
                false
            }
            _ => false,
        }
    }

    pub fn process_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.mouse.add_motion(delta.0, delta.1);
        }
    }

    #[must_use]
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keyboard.is_pressed(key)
    }

    #[must_use]
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.keyboard.is_just_pressed(key)
    }

    #[must_use]
    pub const fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse.is_pressed(button)
    }

    #[must_use]
    pub const fn mouse_motion(&self) -> glam::Vec2 {
        self.mouse.motion()
    }

    pub fn end_frame(&mut self) {
        self.keyboard.end_frame();
        self.mouse.end_frame();
    }

    pub fn clear(&mut self) {
        self.keyboard.clear();
        self.mouse.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn device_motion_feeds_mouse() {
        let mut input = InputManager::new();
        input.process_device_event(&DeviceEvent::MouseMotion { delta: (4.0, -2.0) });
        assert_eq!(input.mouse_motion(), Vec2::new(4.0, -2.0));
        input.end_frame();
        assert_eq!(input.mouse_motion(), Vec2::ZERO);
    }

    #[test]
    fn focus_loss_releases_keys() {
        let mut input = InputManager::new();
        input.keyboard_mut().set_key(KeyCode::KeyW, true);
        assert!(!input.process_window_event(&WindowEvent::Focused(false)));
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }
}
