//! Press state of a key or mouse button.

/// Whether a button is down, and whether that changed this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonState {
    down: bool,
    changed: bool,
}

impl ButtonState {
    /// Record a press or release. Repeats of the current state are ignored.
    #[inline]
    pub fn set(&mut self, down: bool) {
        if self.down != down {
            self.down = down;
            self.changed = true;
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_pressed(self) -> bool {
        self.down
    }

    /// Went down since the last [`end_frame`](Self::end_frame).
    #[inline]
    #[must_use]
    pub const fn is_just_pressed(self) -> bool {
        self.down && self.changed
    }

    /// Went up since the last [`end_frame`](Self::end_frame).
    #[inline]
    #[must_use]
    pub const fn is_just_released(self) -> bool {
        !self.down && self.changed
    }

    #[inline]
    pub fn end_frame(&mut self) {
        self.changed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_hold_release() {
        let mut state = ButtonState::default();
        assert!(!state.is_pressed());

        state.set(true);
        assert!(state.is_pressed());
        assert!(state.is_just_pressed());

        state.end_frame();
        assert!(state.is_pressed());
        assert!(!state.is_just_pressed());

        state.set(false);
        assert!(state.is_just_released());
        state.end_frame();
        assert_eq!(state, ButtonState::default());
    }

    #[test]
    fn key_repeat_does_not_retrigger() {
        let mut state = ButtonState::default();
        state.set(true);
        state.end_frame();
        state.set(true);
        assert!(!state.is_just_pressed());
    }

    #[test]
    fn tap_within_one_frame() {
        let mut state = ButtonState::default();
        state.set(true);
        state.set(false);
        assert!(state.is_just_released());
        assert!(!state.is_pressed());
    }
}
