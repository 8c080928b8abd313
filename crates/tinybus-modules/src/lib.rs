//! Hardware-facing modules for tinybus
//!
//! Each module registers itself on a [`tinybus_core::Bus`] and only uses its
//! public surface: requests for control, events for notifications and bus
//! timers for anything periodic. Pins are reached through the traits in
//! [`gpio`].

pub mod button;
pub mod gpio;
pub mod led;

pub use button::{ButtonConfig, ButtonEvent, ButtonModule, ButtonState, ClickClassifier};
pub use gpio::{InputPin, OutputPin, SimulatedPin};
pub use led::{BlinkParams, LedConfig, LedModule};
