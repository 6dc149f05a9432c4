//! Sign-bit quantization and Hamming distance
//!
//! A normalized vector of dimension `D` is reduced to one bit per component
//! (1 when the component is positive). The bit string is left-padded with
//! zeros to a whole number of bytes and packed MSB-first:
//!
//! ```text
//! D = 4, v = [0.5, -0.1, 0.7, 0.0]
//! bits     1010
//! padded   0000 1010
//! bytes    [0x0A]      hex "0A"
//! ```
//!
//! On the wire a code is its uppercase hex string, `ceil(D/8) * 2` characters.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantizeError {
    #[error("Binary code length mismatch: {left} bytes vs {right} bytes")]
    LengthMismatch { left: usize, right: usize },

    #[error("Invalid hex code: {0}")]
    InvalidHex(String),
}

/// Packed sign bits of a normalized vector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryCode {
    bytes: Vec<u8>,
}

impl BinaryCode {
    /// Wrap already-packed bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Parse an uppercase or lowercase hex string of even length
    pub fn from_hex(hex: &str) -> Result<Self, QuantizeError> {
        if hex.len() % 2 != 0 || !hex.is_ascii() {
            return Err(QuantizeError::InvalidHex(hex.to_string()));
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| QuantizeError::InvalidHex(hex.to_string()))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of packed bytes, `ceil(D/8)`
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Uppercase hex, two characters per byte
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.bytes.len() * 2);
        for b in &self.bytes {
            out.push_str(&format!("{:02X}", b));
        }
        out
    }
}

impl fmt::Display for BinaryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for BinaryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BinaryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        BinaryCode::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Quantize a normalized vector to its sign bits
pub fn quantize(normalized: &[f32]) -> BinaryCode {
    let num_bytes = normalized.len().div_ceil(8);
    let pad = num_bytes * 8 - normalized.len();
    let mut bytes = vec![0u8; num_bytes];

    for (i, &value) in normalized.iter().enumerate() {
        if value > 0.0 {
            let pos = pad + i;
            bytes[pos / 8] |= 0x80 >> (pos % 8);
        }
    }

    BinaryCode { bytes }
}

/// Number of differing bits between two codes of equal length
pub fn hamming_distance(a: &BinaryCode, b: &BinaryCode) -> Result<u32, QuantizeError> {
    if a.len() != b.len() {
        return Err(QuantizeError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.bytes
        .iter()
        .zip(&b.bytes)
        .map(|(x, y)| (x ^ y).count_ones())
        .sum())
}
