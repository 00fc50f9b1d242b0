//! Cryptographic primitives used by the device firmware.

pub mod pin;

pub use pin::{derive_pin, derive_pin_for, derive_pins, PinType};
