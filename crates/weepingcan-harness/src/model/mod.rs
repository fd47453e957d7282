//! Reference model for model-based testing.
//!
//! The model tracks two bare counters and the victim's sequence byte. It
//! applies the fault-confinement arithmetic directly, without frames, bit
//! serialization or a bus, and serves as the oracle the real bus is checked
//! against.
//!
//! [`BusWorld`] wraps a real bus in the same interface, so property tests
//! and fuzz targets drive both with one operation sequence.
//!
//! # Design Principles
//!
//! - Simplicity: every rule is a line of integer arithmetic
//! - Independence: thresholds and payload bits are recomputed here, not
//!   borrowed from the crates under test
//! - Deterministic: same operations, same state

mod bus_world;
pub mod operation;
mod world;

pub use bus_world::BusWorld;
pub use operation::{Operation, OperationError, OperationResult, PayloadBit, Role};
pub use world::{ModelWorld, ObservableState};
