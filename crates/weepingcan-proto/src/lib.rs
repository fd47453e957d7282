//! WeepingCAN Protocol Model
//!
//! Value types for a CAN 2.0A bus as seen by the fault-confinement simulator:
//! 11-bit identifiers, dominant/recessive bit levels, the bit serialization of
//! identifier + payload, and the immutable [`Frame`] describing one
//! transmission attempt.
//!
//! # Bit Layout
//!
//! ```text
//! offset:  0 ............ 10 | 11 ........ 18 | 19 ........ 26 | ...
//!          identifier (MSB)  | payload byte 0 | payload byte 1 | ...
//! ```
//!
//! Stuff bits, control field, CRC and ACK slots are not modeled. Every bit
//! index handed around the workspace (injection positions, arbitration loss
//! points, error positions) refers to this layout.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bits;
pub mod error;
pub mod frame;
pub mod identifier;

pub use bits::{Level, serialize, wire_and};
pub use error::ProtoError;
pub use frame::{Frame, MAX_PAYLOAD, NodeId};
pub use identifier::CanId;
