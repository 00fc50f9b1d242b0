//! Transport abstraction: the BLE link the client talks through.
//!
//! # Overview (for beginners)
//!
//! The Boks box exposes one GATT service with two characteristics: the
//! client *writes* framed commands to one and *subscribes* to notifications
//! on the other.  Battery data lives on two further characteristics that are
//! *read* directly.
//!
//! The client never talks to a Bluetooth stack itself.  It receives an
//! `Arc<dyn Transport>` and calls it; the application that embeds the client
//! decides whether that is a real adapter, a simulator, or (in tests) a
//! recording double such as
//! [`RecordingTransport`](crate::infrastructure::transport::mock::RecordingTransport).

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

// ── GATT identifiers ──────────────────────────────────────────────────────────

/// Primary Boks service.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xa7630001_f491_4f21_95ea_846ba586e361);

/// Characteristic the client writes command frames to.
pub const WRITE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xa7630002_f491_4f21_95ea_846ba586e361);

/// Characteristic the device notifies frames on.
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xa7630003_f491_4f21_95ea_846ba586e361);

/// Standard Battery Level characteristic (one byte, percent).
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Vendor battery statistics characteristic.
pub const CUSTOM_BATTERY_UUID: Uuid = Uuid::from_u128(0x00000004_0000_1000_8000_00805f9b34fb);

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Called with the raw bytes of every notification.
pub type NotificationCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Failures reported by a [`Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The link or the peripheral refused the operation.
    #[error("{0}")]
    Failed(String),

    /// This transport does not implement the operation at all.
    #[error("operation not supported by this transport: {0}")]
    Unsupported(String),
}

/// A bidirectional byte link to one Boks device.
///
/// Implementations must be `Send + Sync` so a single client can be shared
/// across tasks.  Callbacks may be invoked from any thread, including
/// synchronously from inside [`Transport::write`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Writes one complete frame to the command characteristic.
    async fn write(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Reads the current value of an arbitrary characteristic.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError>;

    /// Subscribes to the notification characteristic.
    async fn subscribe(&self, callback: NotificationCallback) -> Result<(), TransportError>;

    /// Subscribes to notifications on an arbitrary characteristic.
    async fn subscribe_to(
        &self,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_render_in_canonical_form() {
        assert_eq!(
            WRITE_CHARACTERISTIC_UUID.to_string(),
            "a7630002-f491-4f21-95ea-846ba586e361"
        );
        assert_eq!(
            BATTERY_LEVEL_UUID.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CUSTOM_BATTERY_UUID.to_string(),
            "00000004-0000-1000-8000-00805f9b34fb"
        );
    }
}
