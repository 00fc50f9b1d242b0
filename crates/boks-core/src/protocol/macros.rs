//! Helper macros for the many packets that share one payload shape.
//!
//! Each macro defines the payload struct and its [`PacketBody`] impl; the
//! opcode is attached later by the catalog table in `catalog.rs`.
//!
//! [`PacketBody`]: crate::protocol::catalog::PacketBody

/// A packet whose payload is always empty.  Any payload bytes the device
/// appends are ignored on decode.
macro_rules! empty_packet {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name;

        impl $crate::protocol::catalog::PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                Vec::new()
            }

            fn from_payload(
                _payload: &[u8],
            ) -> Result<Self, $crate::protocol::error::ProtocolError> {
                Ok($name)
            }
        }
    };
}

/// An authenticated command carrying `config key (8) + PIN (6)`.
macro_rules! auth_pin_packet {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            pub config_key: $crate::protocol::validation::ConfigKey,
            pub pin: $crate::protocol::validation::Pin,
        }

        impl $name {
            /// Validates both fields.
            ///
            /// # Errors
            ///
            /// Returns `InvalidConfigKey` or `InvalidPinFormat`.
            pub fn new(
                config_key: &str,
                pin: &str,
            ) -> Result<Self, $crate::protocol::error::ProtocolError> {
                Ok(Self {
                    config_key: $crate::protocol::validation::ConfigKey::new(config_key)?,
                    pin: $crate::protocol::validation::Pin::new(pin)?,
                })
            }
        }

        impl $crate::protocol::catalog::PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                let mut buf = Vec::with_capacity(14);
                buf.extend_from_slice(self.config_key.as_bytes());
                buf.extend_from_slice(self.pin.as_bytes());
                buf
            }

            fn from_payload(
                payload: &[u8],
            ) -> Result<Self, $crate::protocol::error::ProtocolError> {
                $crate::protocol::catalog::require_exact(payload, 14, stringify!($name))?;
                Ok(Self {
                    config_key: $crate::protocol::validation::ConfigKey::from_payload_prefix(
                        payload,
                    )?,
                    pin: $crate::protocol::validation::Pin::from_ascii(&payload[8..14])?,
                })
            }
        }
    };
}

/// A packet carrying opaque bytes (scale traffic whose layout is not known).
macro_rules! data_packet {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            pub data: Vec<u8>,
        }

        impl $crate::protocol::catalog::PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                self.data.clone()
            }

            fn from_payload(
                payload: &[u8],
            ) -> Result<Self, $crate::protocol::error::ProtocolError> {
                Ok(Self {
                    data: payload.to_vec(),
                })
            }
        }
    };
}

/// A notification whose payload is a single status byte (0 when absent).
macro_rules! byte_notification {
    ($(#[$meta:meta])* $name:ident { $field:ident }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            pub $field: u8,
        }

        impl $crate::protocol::catalog::PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                vec![self.$field]
            }

            fn from_payload(
                payload: &[u8],
            ) -> Result<Self, $crate::protocol::error::ProtocolError> {
                Ok(Self {
                    $field: payload.first().copied().unwrap_or(0),
                })
            }
        }
    };
}

/// A history event with no fields beyond its age header.
macro_rules! header_history {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            pub header: $crate::protocol::history::HistoryHeader,
        }

        impl $name {
            pub fn from_payload_at(payload: &[u8], decoded_at: ::std::time::SystemTime) -> Self {
                Self {
                    header: $crate::protocol::history::HistoryHeader::decode(payload, decoded_at),
                }
            }
        }

        impl $crate::protocol::history::HistoryRecord for $name {
            fn header(&self) -> &$crate::protocol::history::HistoryHeader {
                &self.header
            }
        }

        impl $crate::protocol::catalog::PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                self.header.encode().to_vec()
            }

            fn from_payload(
                payload: &[u8],
            ) -> Result<Self, $crate::protocol::error::ProtocolError> {
                Ok(Self::from_payload_at(payload, ::std::time::SystemTime::now()))
            }
        }
    };
}
