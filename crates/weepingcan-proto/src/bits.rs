//! Bus signal levels and bit serialization.
//!
//! The medium is a wired-AND: whenever any transmitter drives a dominant
//! level the whole bus reads dominant. Everything bit-level in the simulator
//! goes through [`wire_and`] and [`serialize`].

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::identifier::CanId;

/// Logical level of a single bit on the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Level {
    /// Logical `0`, overrides recessive.
    Dominant = 0,
    /// Logical `1`, the idle level of the bus.
    Recessive = 1,
}

impl Level {
    /// Map a raw bit (`true` = 1) to a level.
    pub fn from_bit(bit: bool) -> Self {
        if bit { Self::Recessive } else { Self::Dominant }
    }

    /// Numeric bit value (`0` for dominant, `1` for recessive).
    pub fn as_bit(self) -> u8 {
        self as u8
    }

    /// Whether this is the dominant level.
    pub fn is_dominant(self) -> bool {
        self == Self::Dominant
    }
}

/// Resolve two simultaneously driven levels.
pub fn wire_and(a: Level, b: Level) -> Level {
    if a.is_dominant() || b.is_dominant() { Level::Dominant } else { Level::Recessive }
}

/// Payload bytes as levels, MSB of each byte first.
pub fn payload_bits(payload: &[u8]) -> impl Iterator<Item = Level> + '_ {
    payload.iter().flat_map(|byte| (0..8).rev().map(move |i| Level::from_bit((byte >> i) & 1 == 1)))
}

/// Serialize identifier followed by payload into transmission order.
pub fn serialize(id: CanId, payload: &[u8]) -> Vec<Level> {
    let mut bits = Vec::with_capacity(CanId::BITS + payload.len() * 8);
    bits.extend(id.bits());
    bits.extend(payload_bits(payload));
    bits
}

/// Render levels as a compact `0`/`1` string for logs.
pub fn render(bits: &[Level]) -> String {
    bits.iter().map(|b| if b.is_dominant() { '0' } else { '1' }).collect()
}

/// Force the payload bit at `payload_offset` (bit index counted from the
/// first payload bit) to recessive.
///
/// Out-of-range offsets leave the payload untouched.
pub fn force_recessive(payload: &mut [u8], payload_offset: usize) {
    if let Some(byte) = payload.get_mut(payload_offset / 8) {
        *byte |= 0x80 >> (payload_offset % 8);
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn wire_and_truth_table() {
        use Level::{Dominant as D, Recessive as R};
        assert_eq!(wire_and(D, D), D);
        assert_eq!(wire_and(D, R), D);
        assert_eq!(wire_and(R, D), D);
        assert_eq!(wire_and(R, R), R);
    }

    #[test]
    fn serialize_places_payload_after_identifier() {
        let id = CanId::new(0x100).unwrap();
        let bits = serialize(id, &hex!("DEADBE01"));
        assert_eq!(bits.len(), 11 + 32);
        assert_eq!(render(&bits[..11]), "00100000000");
        assert_eq!(render(&bits[11..19]), "11011110");
        assert_eq!(render(&bits[35..]), "00000001");
    }

    #[test]
    fn force_recessive_sets_single_bit() {
        let mut payload = hex!("00 00");
        force_recessive(&mut payload, 9);
        assert_eq!(payload, hex!("00 40"));
    }

    #[test]
    fn force_recessive_ignores_out_of_range() {
        let mut payload = hex!("AA");
        force_recessive(&mut payload, 8);
        assert_eq!(payload, hex!("AA"));
    }

    #[test]
    fn level_serializes_as_bit() {
        assert_eq!(serde_json::to_string(&Level::Dominant).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Level::Recessive).unwrap(), "1");
    }

    proptest! {
        #[test]
        fn forcing_only_touches_target_bit(payload in proptest::collection::vec(any::<u8>(), 1..=8), offset in 0usize..64) {
            let offset = offset % (payload.len() * 8);
            let mut forced = payload.clone();
            force_recessive(&mut forced, offset);

            let before: Vec<Level> = payload_bits(&payload).collect();
            let after: Vec<Level> = payload_bits(&forced).collect();
            for (i, (b, a)) in before.iter().zip(&after).enumerate() {
                if i == offset {
                    prop_assert_eq!(*a, Level::Recessive);
                } else {
                    prop_assert_eq!(a, b);
                }
            }
        }
    }
}
