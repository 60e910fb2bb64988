//! Input handling for the Ember renderer.
//!
//! [`InputManager`] accumulates keyboard and mouse state from winit events
//! between frames; [`MovementController`] turns that state into first-person
//! camera motion.
//!
//! ```ignore
//! for event in window.drain_events() {
//!     input.process_event(&event);
//! }
//! controller.move_in_plane_xz(&input, dt, &mut viewer.transform);
//! input.end_frame();
//! ```

mod button_state;
mod input;
mod keyboard;
mod mouse;
mod movement;

pub use button_state::ButtonState;
pub use input::InputManager;
pub use keyboard::KeyboardState;
pub use mouse::{MouseButton, MouseState};
pub use movement::{KeyMappings, MovementController};

pub use winit::keyboard::KeyCode;
