//! boks-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `boks` binary share the same module tree.
//!
//! # What does boks-client do? (for beginners)
//!
//! [`boks_core`] knows what the bytes mean; this crate knows *when* to send
//! them and how to match the device's answers to the commands that caused
//! them.
//!
//! 1. A [`Transport`](application::transport::Transport) supplied by the
//!    embedding application carries frames to and from the box.
//! 2. [`BoksClient`](application::client::BoksClient) serializes commands
//!    into one-at-a-time transactions, decodes every notification, and
//!    resolves each transaction on a success opcode, an error opcode, or a
//!    timeout.
//! 3. Listeners and a diagnostic sink observe traffic without influencing it.
//! 4. [`ClientConfig`](infrastructure::storage::config::ClientConfig) holds
//!    timeouts and device credentials in a TOML file.

/// Application layer: the orchestrator and the abstractions it depends on.
pub mod application;

/// Infrastructure layer: transport adapters and configuration storage.
pub mod infrastructure;

pub use application::client::{BoksClient, ClientTimeouts, Expect, Subscription};
pub use application::error::ClientError;
