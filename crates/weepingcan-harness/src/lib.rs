//! Deterministic test harness for the WeepingCAN simulator.
//!
//! Injection sources that replay from a script or a seed, an in-memory event
//! recorder, and a scenario builder that wires them into a
//! [`Simulation`](weepingcan_core::Simulation).
//!
//! # Model-Based Testing
//!
//! The `model` module is a reference implementation of the counter rules.
//! Operations are applied to both the model and a real bus, and their
//! observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod injection;
pub mod model;
pub mod recording;
pub mod scenario;

pub use injection::{ScriptedInjection, SeededInjection, seeded};
pub use model::{
    BusWorld, ModelWorld, ObservableState, Operation, OperationError, OperationResult, PayloadBit,
    Role,
};
pub use recording::RecordingSink;
pub use scenario::{Scenario, ScenarioOutcome};
