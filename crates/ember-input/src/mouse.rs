//! Mouse state.

use glam::Vec2;
use winit::event::{ElementState, MouseButton as WinitMouseButton};

use crate::button_state::ButtonState;

/// Mouse buttons the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    const COUNT: usize = 3;

    fn from_winit(button: WinitMouseButton) -> Option<Self> {
        match button {
            WinitMouseButton::Left => Some(Self::Left),
            WinitMouseButton::Right => Some(Self::Right),
            WinitMouseButton::Middle => Some(Self::Middle),
            _ => None,
        }
    }
}

/// Cursor position, accumulated raw motion and button state.
#[derive(Debug, Default)]
pub struct MouseState {
    position: Vec2,
    /// Device motion since the last `end_frame`, unaffected by cursor grabs.
    motion: Vec2,
    buttons: [ButtonState; MouseButton::COUNT],
}

impl MouseState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn set_position(&mut self, x: f64, y: f64) {
        self.position = Vec2::new(x as f32, y as f32);
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn add_motion(&mut self, dx: f64, dy: f64) {
        self.motion += Vec2::new(dx as f32, dy as f32);
    }

    pub fn process_button(&mut self, button: WinitMouseButton, state: ElementState) {
        if let Some(button) = MouseButton::from_winit(button) {
            self.buttons[button as usize].set(state == ElementState::Pressed);
        }
    }

    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Raw motion accumulated this frame (x right, y down).
    #[must_use]
    pub const fn motion(&self) -> Vec2 {
        self.motion
    }

    #[must_use]
    pub const fn is_pressed(&self, button: MouseButton) -> bool {
        self.buttons[button as usize].is_pressed()
    }

    #[must_use]
    pub const fn is_just_pressed(&self, button: MouseButton) -> bool {
        self.buttons[button as usize].is_just_pressed()
    }

    pub fn end_frame(&mut self) {
        self.buttons.iter_mut().for_each(ButtonState::end_frame);
        self.motion = Vec2::ZERO;
    }

    pub fn clear(&mut self) {
        *self = Self {
            position: self.position,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_accumulates_until_end_of_frame() {
        let mut mouse = MouseState::new();
        mouse.add_motion(3.0, -1.0);
        mouse.add_motion(2.0, 4.0);
        assert_eq!(mouse.motion(), Vec2::new(5.0, 3.0));

        mouse.end_frame();
        assert_eq!(mouse.motion(), Vec2::ZERO);
    }

    #[test]
    fn buttons_and_position() {
        let mut mouse = MouseState::new();
        mouse.set_position(120.0, 64.0);
        mouse.process_button(WinitMouseButton::Right, ElementState::Pressed);
        mouse.process_button(WinitMouseButton::Other(7), ElementState::Pressed);

        assert_eq!(mouse.position(), Vec2::new(120.0, 64.0));
        assert!(mouse.is_just_pressed(MouseButton::Right));
        assert!(!mouse.is_pressed(MouseButton::Left));

        mouse.clear();
        assert!(!mouse.is_pressed(MouseButton::Right));
        assert_eq!(mouse.position(), Vec2::new(120.0, 64.0));
    }
}
