//! Keyboard state.

use hashbrown::HashMap;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::button_state::ButtonState;

/// Per-key state, keyed by physical key code.
#[derive(Debug, Default)]
pub struct KeyboardState {
    keys: HashMap<KeyCode, ButtonState>,
}

impl KeyboardState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_key_event(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(key) = event.physical_key {
            self.set_key(key, event.state == ElementState::Pressed);
        }
    }

    pub fn set_key(&mut self, key: KeyCode, down: bool) {
        self.keys.entry(key).or_default().set(down);
    }

    #[must_use]
    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.keys.get(&key).is_some_and(|s| s.is_pressed())
    }

    #[must_use]
    pub fn is_just_pressed(&self, key: KeyCode) -> bool {
        self.keys.get(&key).is_some_and(|s| s.is_just_pressed())
    }

    #[must_use]
    pub fn is_just_released(&self, key: KeyCode) -> bool {
        self.keys.get(&key).is_some_and(|s| s.is_just_released())
    }

    pub fn end_frame(&mut self) {
        self.keys.values_mut().for_each(ButtonState::end_frame);
    }

    /// Release everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_independent() {
        let mut keyboard = KeyboardState::new();
        keyboard.set_key(KeyCode::KeyW, true);
        keyboard.set_key(KeyCode::ShiftLeft, true);
        keyboard.set_key(KeyCode::ShiftLeft, false);

        assert!(keyboard.is_pressed(KeyCode::KeyW));
        assert!(keyboard.is_just_released(KeyCode::ShiftLeft));
        assert!(!keyboard.is_pressed(KeyCode::KeyS));

        keyboard.end_frame();
        assert!(keyboard.is_pressed(KeyCode::KeyW));
        assert!(!keyboard.is_just_pressed(KeyCode::KeyW));
        assert!(!keyboard.is_just_released(KeyCode::ShiftLeft));
    }

    #[test]
    fn clear_releases_all_keys() {
        let mut keyboard = KeyboardState::new();
        keyboard.set_key(KeyCode::KeyA, true);
        keyboard.clear();
        assert!(!keyboard.is_pressed(KeyCode::KeyA));
    }
}
