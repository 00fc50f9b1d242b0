//! Transport adapters.
//!
//! Real BLE adapters live with the application that embeds the client; this
//! crate ships the in-memory [`mock::RecordingTransport`] used by the tests
//! and by simulators.

pub mod mock;

pub use mock::RecordingTransport;
