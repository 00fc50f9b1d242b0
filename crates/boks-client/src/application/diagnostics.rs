//! Diagnostic event stream.
//!
//! The client reports what it sends and receives as typed [`LogEvent`]s to an
//! injected [`DiagnosticSink`].  Events are informational only: nothing in
//! the client ever branches on whether a sink is installed or what it does.

use std::sync::Mutex;

use boks_core::Opcode;
use serde::Serialize;
use tracing::{debug, error, warn};

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    /// A frame was written.  `length` is the full frame size in bytes.
    Send { opcode: Opcode, length: usize },
    /// A frame was received and decoded.
    Receive { opcode: Opcode },
    /// A write, timeout or rejection.
    Error { opcode: Option<Opcode>, error: String },
    /// An inbound frame failed its checksum and was dropped.
    ChecksumError { opcode: u8, expected: u8, received: u8 },
    /// A packet listener panicked.
    ListenerError { opcode: Opcode, error: String },
}

impl LogEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LogEvent::Send { .. } => "send",
            LogEvent::Receive { .. } => "receive",
            LogEvent::Error { .. } => "error",
            LogEvent::ChecksumError { .. } => "checksum_error",
            LogEvent::ListenerError { .. } => "listener_error",
        }
    }
}

/// Receives diagnostic events.  Must not block.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: LogEvent);
}

/// Default sink: re-emits events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: LogEvent) {
        match event {
            LogEvent::Send { opcode, length } => {
                debug!(opcode = %opcode, length, "send");
            }
            LogEvent::Receive { opcode } => {
                debug!(opcode = %opcode, "receive");
            }
            LogEvent::Error { opcode, error } => match opcode {
                Some(opcode) => error!(opcode = %opcode, %error, "error"),
                None => error!(%error, "error"),
            },
            LogEvent::ChecksumError {
                opcode,
                expected,
                received,
            } => {
                warn!(opcode, expected, received, "checksum_error");
            }
            LogEvent::ListenerError { opcode, error } => {
                error!(opcode = %opcode, %error, "listener_error");
            }
        }
    }
}

/// Keeps every event in memory, in arrival order.
///
/// Useful for tests and for UIs that display a session log.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Returns the recorded events with the given [`LogEvent::name`].
    pub fn named(&self, name: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.name() == name)
            .collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
