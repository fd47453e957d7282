//! Operations for model-based testing.
//!
//! Generated by proptest in the integration tests and by libFuzzer in the
//! fuzz targets, then applied to both the model and a real bus.

use arbitrary::Arbitrary;

/// Which of the two participants an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Role {
    /// The periodic sender.
    Victim,
    /// The adversarial sender.
    Attacker,
}

/// Payload bit index of a four-byte victim frame, reduced modulo 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct PayloadBit(pub u8);

impl PayloadBit {
    /// Payload bits in a four-byte frame.
    pub const COUNT: usize = 32;

    /// Index into the payload, in `0..32`.
    pub fn index(self) -> usize {
        usize::from(self.0) % Self::COUNT
    }

    /// Absolute bit offset on the wire, after the 11 identifier bits.
    pub fn offset(self) -> usize {
        11 + self.index()
    }
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Victim sends its next frame while the attacker mirrors it with one
    /// payload bit forced recessive.
    Collide {
        /// Bit the attacker forces.
        bit: PayloadBit,
    },

    /// A participant sends one frame with nobody contending.
    Send {
        /// Sender.
        role: Role,
    },

    /// A participant is credited with a batch of uncontested frames.
    Clean {
        /// Sender.
        role: Role,
        /// Frames in the batch.
        count: u8,
    },
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with expected error.
    Error(OperationError),
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Victim is bus-off and refuses to build frames.
    VictimOffline,

    /// A bus-off node tried to transmit.
    SenderOffline,
}
