//! Infrastructure layer of the client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `boks_core`, but MUST NOT be imported by the `application` layer.
//!
//! - **`transport`** – in-memory `RecordingTransport` for tests and
//!   simulators.
//! - **`storage`** – TOML configuration file.

pub mod storage;
pub mod transport;
