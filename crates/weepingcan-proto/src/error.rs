//! Frame construction errors.

use thiserror::Error;

/// Errors from building identifiers and frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// Identifier does not fit in 11 bits.
    #[error("identifier out of range: {raw:#x} exceeds 0x7ff")]
    IdentifierOutOfRange {
        /// The rejected raw value.
        raw: u32,
    },

    /// Payload longer than a classic CAN data field.
    #[error("payload too long: {len} bytes (max {max})")]
    PayloadTooLong {
        /// Offered payload length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// Injection position does not index into the payload region.
    #[error("injection position {position} outside payload bits {start}..{end}")]
    InjectionOutOfRange {
        /// Offered bit position.
        position: usize,
        /// First payload bit offset.
        start: usize,
        /// One past the last payload bit offset.
        end: usize,
    },
}
