//! Derivation of device PINs from the 32-byte master key.
//!
//! The device computes each code as a 6-byte BLAKE2s-style keyed digest of the
//! text `"{prefix} {index}"` and maps every digest byte onto the base-12
//! alphabet `0123456789AB`.
//!
//! # How the digest is built (for beginners)
//!
//! BLAKE2s keeps eight 32-bit words of state.  The state starts as the fixed
//! IV with its first word mixed with a parameter word that fixes the key and
//! digest length (so a 6-byte digest is unrelated to a 32-byte one).  Two
//! 64-byte blocks are then compressed into it:
//!
//! 1. the key, zero-padded (`t = 64`, not final),
//! 2. the message, zero-padded (`t = 64 + message length`, final).
//!
//! Each compression runs ten rounds of the `G` mixing function over a 16-word
//! working vector.  Only the first six output bytes are used.

use crate::protocol::error::ProtocolError;
use crate::protocol::validation::{Pin, PIN_ALPHABET, PIN_LEN, SEED_LEN};

/// Size of one compression block.
pub const BLOCK_LEN: usize = 64;

/// Parameter word: key length 32, fanout 1, depth 1, digest length 6.
const PARAM_WORD: u32 = 0x0101_2006;

const IV: [u32; 8] = [
    0x6A09_E667,
    0xBB67_AE85,
    0x3C6E_F372,
    0xA54F_F53A,
    0x510E_527F,
    0x9B05_688C,
    0x1F83_D9AB,
    0x5BE0_CD19,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

/// Column steps followed by diagonal steps.
const G_LANES: [[usize; 4]; 8] = [
    [0, 4, 8, 12],
    [1, 5, 9, 13],
    [2, 6, 10, 14],
    [3, 7, 11, 15],
    [0, 5, 10, 15],
    [1, 6, 11, 12],
    [2, 7, 8, 13],
    [3, 4, 9, 14],
];

// ── PIN types ─────────────────────────────────────────────────────────────────

/// The three code tables kept by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PinType {
    SingleUse,
    MultiUse,
    Master,
}

impl PinType {
    /// Text prefix hashed in front of the index.
    pub fn prefix(self) -> &'static str {
        match self {
            PinType::SingleUse => "single-use",
            PinType::MultiUse => "multi-use",
            PinType::Master => "master",
        }
    }

    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPinType`] for any other prefix.
    pub fn from_prefix(prefix: &str) -> Result<Self, ProtocolError> {
        match prefix {
            "single-use" => Ok(PinType::SingleUse),
            "multi-use" => Ok(PinType::MultiUse),
            "master" => Ok(PinType::Master),
            other => Err(ProtocolError::InvalidPinType(other.to_string())),
        }
    }
}

impl std::str::FromStr for PinType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_prefix(s)
    }
}

impl std::fmt::Display for PinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

// ── Derivation ────────────────────────────────────────────────────────────────

/// Derives the PIN at `index` for an arbitrary `prefix`.
///
/// This is the raw primitive; prefer [`derive_pin_for`], which only accepts
/// prefixes the device actually uses.
///
/// # Errors
///
/// * [`ProtocolError::InvalidKeyLength`] unless `key` is 32 bytes.
/// * [`ProtocolError::MessageTooLong`] if `"{prefix} {index}"` exceeds 64 bytes.
///
/// # Examples
///
/// ```rust
/// use boks_core::crypto::pin::derive_pin;
///
/// let pin = derive_pin(&[0u8; 32], "single-use", 0).unwrap();
/// assert_eq!(pin.as_str(), "AB5B58");
/// ```
pub fn derive_pin(key: &[u8], prefix: &str, index: u32) -> Result<Pin, ProtocolError> {
    if key.len() != SEED_LEN {
        return Err(ProtocolError::InvalidKeyLength {
            received: key.len(),
        });
    }

    let message = format!("{prefix} {index}");
    if message.len() > BLOCK_LEN {
        return Err(ProtocolError::MessageTooLong {
            len: message.len(),
            max: BLOCK_LEN,
        });
    }

    let mut h = IV;
    h[0] ^= PARAM_WORD;
    compress(&mut h, &padded_block(key), BLOCK_LEN as u32, false);
    compress(
        &mut h,
        &padded_block(message.as_bytes()),
        (BLOCK_LEN + message.len()) as u32,
        true,
    );

    let code: String = h
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .take(PIN_LEN)
        .map(|b| PIN_ALPHABET[(b as usize) % PIN_ALPHABET.len()] as char)
        .collect();
    Pin::new(&code)
}

/// Derives the PIN at `index` of one of the device's code tables.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidKeyLength`] unless `key` is 32 bytes.
pub fn derive_pin_for(key: &[u8], pin_type: PinType, index: u32) -> Result<Pin, ProtocolError> {
    derive_pin(key, pin_type.prefix(), index)
}

/// Derives consecutive PINs, pairing each with its index.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidKeyLength`] unless `key` is 32 bytes.
pub fn derive_pins(
    key: &[u8],
    pin_type: PinType,
    indices: std::ops::Range<u32>,
) -> Result<Vec<(u32, Pin)>, ProtocolError> {
    indices
        .map(|index| derive_pin_for(key, pin_type, index).map(|pin| (index, pin)))
        .collect()
}

// ── Compression ───────────────────────────────────────────────────────────────

fn padded_block(bytes: &[u8]) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    block[..bytes.len()].copy_from_slice(bytes);
    block
}

fn compress(h: &mut [u32; 8], block: &[u8; BLOCK_LEN], counter: u32, last: bool) {
    let mut m = [0u32; 16];
    for (word, chunk) in m.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let mut v = [0u32; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&IV);
    v[12] ^= counter;
    if last {
        v[14] ^= u32::MAX;
    }

    for s in &SIGMA {
        for (i, [a, b, c, d]) in G_LANES.iter().copied().enumerate() {
            g(&mut v, a, b, c, d, m[s[2 * i]], m[s[2 * i + 1]]);
        }
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

#[allow(clippy::many_single_char_names)]
fn g(v: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, x: u32, y: u32) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(12);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(8);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(7);
}
