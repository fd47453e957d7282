//! Fault-confinement state machine.
//!
//! Every participant owns a transmit error counter (TEC). The operating state
//! is never stored independently: it is recomputed from the counter after each
//! mutation, and a [`StateTransition`] is returned only when the recomputed
//! state differs from the previous one.
//!
//! # Invariants
//!
//! - Bounds: the counter stays in `0..=256`, clamped on both ends
//! - Purity: `state == OperatingState::from_counter(counter)` at all times
//! - Terminal: once `Offline`, the counter is frozen at 256 and no transition
//!   leaves the state

use std::fmt;

use serde::Serialize;
use weepingcan_proto::NodeId;

/// Counter value at which a node becomes error-passive.
pub const PASSIVE_THRESHOLD: u16 = 128;

/// Counter value at which a node goes offline (bus-off).
pub const OFFLINE_THRESHOLD: u16 = 256;

/// Counter penalty applied to each participant of an error flag.
pub const ERROR_PENALTY: u16 = 8;

/// Counter credit for one successful transmission.
pub const SUCCESS_CREDIT: u16 = 1;

/// Fault-confinement state derived from the error counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OperatingState {
    /// Counter in `0..=127`, raises active (dominant) error flags.
    Active,
    /// Counter in `128..=255`, raises passive (recessive) error flags.
    Passive,
    /// Counter reached 256, disconnected from the bus.
    Offline,
}

impl OperatingState {
    /// State for a given counter value.
    pub fn from_counter(counter: u16) -> Self {
        if counter >= OFFLINE_THRESHOLD {
            Self::Offline
        } else if counter >= PASSIVE_THRESHOLD {
            Self::Passive
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "error-active",
            Self::Passive => "error-passive",
            Self::Offline => "bus-off",
        })
    }
}

/// A threshold crossing produced by a counter mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    /// Node whose state changed.
    pub node: NodeId,
    /// State before the mutation.
    pub from: OperatingState,
    /// State after the mutation.
    pub to: OperatingState,
    /// Counter after the mutation.
    pub counter: u16,
}

/// Counter value before and after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterChange {
    /// Value before.
    pub before: u16,
    /// Value after.
    pub after: u16,
}

/// Read-only snapshot of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    /// Node identity.
    pub id: NodeId,
    /// Error counter.
    pub counter: u16,
    /// Derived state.
    pub state: OperatingState,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] TEC={:>3} state={}", self.id, self.counter, self.state)
    }
}

/// Error counter plus derived operating state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    counter: u16,
    state: OperatingState,
}

impl Node {
    /// Fresh node: counter 0, `Active`.
    pub fn new(id: NodeId) -> Self {
        Self { id, counter: 0, state: OperatingState::Active }
    }

    /// Node identity.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Current error counter.
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Current operating state.
    pub fn state(&self) -> OperatingState {
        self.state
    }

    /// Snapshot for reporting.
    pub fn status(&self) -> NodeStatus {
        NodeStatus { id: self.id.clone(), counter: self.counter, state: self.state }
    }

    /// Add `amount`, clamped at [`OFFLINE_THRESHOLD`].
    pub fn increment(&mut self, amount: u16) -> Option<StateTransition> {
        let next = self.counter.saturating_add(amount).min(OFFLINE_THRESHOLD);
        self.apply(next)
    }

    /// Subtract `amount`, floored at 0.
    pub fn decrement(&mut self, amount: u16) -> Option<StateTransition> {
        let next = self.counter.saturating_sub(amount);
        self.apply(next)
    }

    fn apply(&mut self, next: u16) -> Option<StateTransition> {
        if self.state == OperatingState::Offline {
            return None;
        }

        let from = self.state;
        self.counter = next;
        self.state = OperatingState::from_counter(next);

        (from != self.state).then(|| StateTransition {
            node: self.id.clone(),
            from,
            to: self.state,
            counter: self.counter,
        })
    }
}
