//! Battery characteristics.
//!
//! Battery data is not framed: it is read directly from two GATT
//! characteristics.  The standard Battery Level characteristic holds one
//! byte; a vendor characteristic holds recent measurements followed by a
//! temperature byte offset by 25 °C.  `0xFF` means "not measured".

use serde::{Deserialize, Serialize};

/// Marker for a missing or unreliable measurement.
pub const UNKNOWN_VALUE: u8 = 0xFF;

/// Temperature bytes are stored as `celsius + 25`.
const TEMPERATURE_OFFSET: i16 = 25;

/// Decoded vendor battery statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStats {
    /// Representative level in percent.
    pub level: u8,
    /// Degrees Celsius, when measured.
    pub temperature: Option<i16>,
    pub details: BatteryDetails,
}

/// The two measurement layouts shipped by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum BatteryDetails {
    /// `[first, min, mean, max, last, temp]`
    FirstMinMeanMaxLast {
        first: u8,
        min: u8,
        mean: u8,
        max: u8,
        last: u8,
    },
    /// `[t1, t5, t10, temp]`: levels 1, 5 and 10 seconds into a load test.
    T1T5T10 {
        t1: u8,
        t5: Option<u8>,
        t10: Option<u8>,
    },
}

fn known(byte: u8) -> Option<u8> {
    (byte != UNKNOWN_VALUE).then_some(byte)
}

/// Parses the standard Battery Level characteristic.
pub fn parse_battery_level(payload: &[u8]) -> Option<u8> {
    payload.first().copied().and_then(known)
}

/// Parses the vendor battery statistics characteristic.
///
/// Returns `None` for empty, all-unknown, or unrecognised payloads.
pub fn parse_battery_stats(payload: &[u8]) -> Option<BatteryStats> {
    if payload.is_empty() || payload.iter().all(|b| *b == UNKNOWN_VALUE) {
        return None;
    }

    let temperature = payload
        .last()
        .copied()
        .and_then(known)
        .map(|raw| i16::from(raw) - TEMPERATURE_OFFSET);

    match *payload {
        [first, min, mean, max, last, _] => Some(BatteryStats {
            level: mean,
            temperature,
            details: BatteryDetails::FirstMinMeanMaxLast {
                first,
                min,
                mean,
                max,
                last,
            },
        }),
        [t1, t5, t10, _] => Some(BatteryStats {
            level: t1,
            temperature,
            details: BatteryDetails::T1T5T10 {
                t1,
                t5: known(t5),
                t10: known(t10),
            },
        }),
        _ => None,
    }
}
