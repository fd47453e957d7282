//! 11-bit CAN identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{bits::Level, error::ProtoError};

/// Standard (CAN 2.0A) identifier.
///
/// Lower numeric values win arbitration: a `0` bit is dominant and the
/// identifier is transmitted MSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct CanId(u16);

impl CanId {
    /// Width of a standard identifier in bits.
    pub const BITS: usize = 11;

    /// Largest representable identifier.
    pub const MAX: u16 = 0x7FF;

    /// Create an identifier, rejecting values wider than 11 bits.
    pub fn new(raw: u16) -> Result<Self, ProtoError> {
        if raw > Self::MAX {
            return Err(ProtoError::IdentifierOutOfRange { raw: u32::from(raw) });
        }
        Ok(Self(raw))
    }

    /// Raw numeric value.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Identifier bits in transmission order (MSB first).
    pub fn bits(self) -> impl Iterator<Item = Level> {
        (0..Self::BITS).map(move |i| Level::from_bit((self.0 >> (Self::BITS - 1 - i)) & 1 == 1))
    }
}

impl TryFrom<u16> for CanId {
    type Error = ProtoError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<CanId> for u16 {
    fn from(id: CanId) -> Self {
        id.0
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_twelve_bit_values() {
        assert!(CanId::new(0x7FF).is_ok());
        assert_eq!(CanId::new(0x800), Err(ProtoError::IdentifierOutOfRange { raw: 0x800 }));
    }

    #[test]
    fn bits_are_msb_first() {
        let id = CanId::new(0x100).unwrap();
        let bits: Vec<u8> = id.bits().map(Level::as_bit).collect();
        assert_eq!(bits, vec![0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn display_is_three_hex_digits() {
        assert_eq!(CanId::new(0x10).unwrap().to_string(), "0x010");
    }

    #[test]
    fn deserialize_validates_range() {
        let ok: CanId = serde_json::from_str("256").unwrap();
        assert_eq!(ok.raw(), 0x100);
        assert!(serde_json::from_str::<CanId>("4096").is_err());
    }
}
