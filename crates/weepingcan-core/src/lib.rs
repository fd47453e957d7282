//! WeepingCAN Core
//!
//! Fault confinement and the bus-off attack built on it. Every node carries a
//! transmit error counter (TEC) and an operating state derived from it; the
//! bus resolves concurrent transmissions with wired-AND semantics and applies
//! the counter rules; the victim and attacker roles drive it.
//!
//! # Architecture
//!
//! - [`Node`] is a pure state machine: counter changes return an optional
//!   [`StateTransition`] instead of logging or calling back
//! - [`Bus`] owns every node behind one lock and reports what happened to an
//!   injected [`EventSink`]
//! - [`Attacker`] draws injection positions from an injected
//!   [`InjectionSource`], so runs replay exactly from a seed
//! - [`Simulation`] ties one victim and one attacker to a bus and loops until
//!   a stop condition
//!
//! # Components
//!
//! - [`node`]: counter arithmetic and state thresholds
//! - [`bus`]: arbitration, bit errors, retransmission, clean batches
//! - [`victim`] / [`attacker`]: the two roles
//! - [`event`]: recorder events and sinks
//! - [`config`]: run parameters
//! - [`driver`]: the cycle loop and run report

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod attacker;
pub mod bus;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod injection;
pub mod node;
pub mod victim;

pub use attacker::{AttackStats, Attacker, CycleOutcome, DEFAULT_RECOVERY_BATCH, Recon};
pub use bus::{BitErrorReport, Bus, CleanBatch, Resolution, Retransmission};
pub use config::{ConfigError, RecoveryPolicy, SimConfig};
pub use driver::{RunReport, SimError, Simulation, Termination};
pub use error::{BusError, RoleError};
pub use event::{
    BusEvent, CycleSummary, ERROR_DELIMITER, ErrorFlag, EventSink, FanoutSink, InjectionTrace,
    NullSink, TracingSink,
};
pub use injection::{InjectionSource, RandomInjection};
pub use node::{
    CounterChange, ERROR_PENALTY, Node, NodeStatus, OFFLINE_THRESHOLD, OperatingState,
    PASSIVE_THRESHOLD, SUCCESS_CREDIT, StateTransition,
};
pub use victim::{DEFAULT_PAYLOAD_PREFIX, Victim};
