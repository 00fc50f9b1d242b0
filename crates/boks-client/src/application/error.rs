//! Error type returned by every [`BoksClient`](crate::application::client::BoksClient) operation.

use boks_core::{Opcode, ProtocolError};
use thiserror::Error;

use crate::application::transport::TransportError;

/// Errors surfaced by the client.
///
/// Transport failures carry the transport's message; protocol outcomes carry
/// the opcode involved so a stalled or rejected command can be identified
/// from the error alone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// An operation that needs the device was called before `connect()`.
    #[error("not connected to a Boks device")]
    NotConnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("disconnect failed: {0}")]
    DisconnectFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    /// No terminal packet arrived in time.  `opcode` is the request that
    /// stalled, or the packet that was awaited.
    #[error("timed out waiting for {opcode}")]
    Timeout { opcode: Opcode },

    /// The device answered with one of the expected error opcodes.
    #[error("device rejected the request with {opcode}")]
    Rejected { opcode: Opcode },

    /// A packet could not be built or encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport does not implement the requested operation.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
}

impl ClientError {
    /// Stable upper-snake identifier, suitable for matching in logs and UIs.
    pub fn id(&self) -> &'static str {
        match self {
            ClientError::NotConnected => "NOT_CONNECTED",
            ClientError::ConnectionFailed(_) => "CONNECTION_FAILURE",
            ClientError::DisconnectFailed(_) => "DISCONNECT_FAILURE",
            ClientError::WriteFailed(_) => "WRITE_FAILURE",
            ClientError::SubscribeFailed(_) => "SUBSCRIBE_FAILURE",
            ClientError::ReadFailed(_) => "READ_FAILURE",
            ClientError::Timeout { .. } => "TIMEOUT",
            ClientError::Rejected { .. } => "REJECTED",
            ClientError::Protocol(_) => "PARSE_ERROR",
            ClientError::UnsupportedFeature(_) => "UNSUPPORTED_FEATURE",
        }
    }

    /// Maps a transport failure, keeping "unsupported" distinct from the
    /// operation-specific failure built by `other`.
    pub(crate) fn from_transport(err: TransportError, other: fn(String) -> ClientError) -> Self {
        match err {
            TransportError::Unsupported(feature) => ClientError::UnsupportedFeature(feature),
            TransportError::Failed(message) => other(message),
        }
    }
}
