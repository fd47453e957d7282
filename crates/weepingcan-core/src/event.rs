//! Structured events and the recorder seam.
//!
//! The bus and the roles never log through a global. They report
//! [`BusEvent`]s to an injected [`EventSink`], which may fan out to tracing,
//! files, or an in-memory buffer for tests. Recording is infallible from the
//! protocol's point of view.

use std::sync::Arc;

use serde::Serialize;
use weepingcan_proto::{CanId, Level, NodeId};

use crate::node::{CounterChange, NodeStatus, OperatingState, StateTransition};

/// Recessive bits closing every error flag.
pub const ERROR_DELIMITER: [Level; 8] = [Level::Recessive; 8];

/// Kind of error flag raised by the detecting node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorFlag {
    /// Six dominant bits, raised by an error-active node.
    Active,
    /// Six recessive bits, raised by an error-passive node.
    Passive,
}

impl ErrorFlag {
    /// Flag kind a node in `state` raises.
    pub fn for_state(state: OperatingState) -> Self {
        match state {
            OperatingState::Active => Self::Active,
            OperatingState::Passive | OperatingState::Offline => Self::Passive,
        }
    }

    /// Bit pattern driven onto the bus.
    pub fn bits(self) -> [Level; 6] {
        match self {
            Self::Active => [Level::Dominant; 6],
            Self::Passive => [Level::Recessive; 6],
        }
    }
}

/// The injected bit and what the bus made of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InjectionTrace {
    /// Bit offset of the injection.
    pub position: usize,
    /// Level driven by the adversarial sender.
    pub injected: Level,
    /// Level driven by the other sender.
    pub opposing: Level,
    /// Resolved wire level.
    pub resolved: Level,
}

/// Per-cycle summary row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// 1-based cycle index.
    pub cycle: u64,
    /// Victim after the cycle.
    pub victim: NodeStatus,
    /// Attacker after the cycle.
    pub attacker: NodeStatus,
    /// Whether the injection raised a bit error.
    pub effective: bool,
    /// Injection position used this cycle.
    pub injection: usize,
}

/// Everything the core reports to the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    /// A participant joined the bus.
    NodeRegistered {
        /// Registered identity.
        node: NodeId,
    },

    /// Two transmitters with the same identifier were resolved bit by bit.
    Resolution {
        /// Sender of the primary frame.
        primary: NodeId,
        /// Sender of the concurrent frame.
        concurrent: NodeId,
        /// Shared identifier.
        id: CanId,
        /// Identifier bits as transmitted.
        identifier_bits: Vec<Level>,
        /// Resolved wire sequence over identifier + payload.
        wire: Vec<Level>,
        /// Injection detail when one of the frames was adversarial.
        injection: Option<InjectionTrace>,
    },

    /// Different identifiers: one transmitter backed off.
    ArbitrationLost {
        /// Transmitter that kept the bus.
        winner: NodeId,
        /// Transmitter that backed off.
        loser: NodeId,
        /// Identifier bit where the loser read dominant over its recessive.
        bit: usize,
    },

    /// A transmitter read back a level it did not send.
    BitError {
        /// Node that detected the error and raised the flag.
        detector: NodeId,
        /// Node whose frame was destroyed by the flag.
        corrupted: NodeId,
        /// Bit offset of the mismatch.
        position: usize,
        /// Flag kind raised.
        flag: ErrorFlag,
        /// Detector's counter.
        detector_counter: CounterChange,
        /// Corrupted sender's counter.
        corrupted_counter: CounterChange,
    },

    /// The corrupted frame was sent again and succeeded.
    Retransmitted {
        /// Retransmitting node.
        node: NodeId,
        /// Counter after the success credit.
        counter: CounterChange,
    },

    /// The corrupted frame could not be retransmitted.
    RetransmissionSuppressed {
        /// Node that went offline.
        node: NodeId,
    },

    /// A frame reached the other participants.
    Delivered {
        /// Sending node.
        sender: NodeId,
        /// Frame identifier.
        id: CanId,
        /// Number of receiving nodes.
        recipients: usize,
    },

    /// Uncontested transmissions credited to a node.
    CleanBatch {
        /// Transmitting node.
        node: NodeId,
        /// Number of frames sent.
        count: u16,
        /// Counter before and after.
        counter: CounterChange,
    },

    /// A node crossed a fault-confinement threshold.
    StateChanged(StateTransition),

    /// Attacker reconnaissance result.
    TargetObserved {
        /// Attacker identity.
        attacker: NodeId,
        /// Target identifier.
        target: CanId,
        /// Observed period in milliseconds.
        period_ms: u64,
    },

    /// End-of-cycle summary.
    Cycle(CycleSummary),
}

/// Receiver of [`BusEvent`]s.
///
/// Implementations must not block the caller for long and must never fail:
/// errors are handled (or dropped) inside the sink.
///
/// The bus calls `record` after releasing its lock, so a sink may read the
/// bus (`Bus::status`, `Bus::statuses`) while handling an event.
pub trait EventSink: Send + Sync {
    /// Accept one event.
    fn record(&self, event: &BusEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn record(&self, event: &BusEvent) {
        (**self).record(event);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &BusEvent) {}
}

/// Forwards events to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: &BusEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink").field("sinks", &self.sinks.len()).finish()
    }
}

/// Emits each event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &BusEvent) {
        match event {
            BusEvent::NodeRegistered { node } => tracing::debug!(%node, "node registered"),
            BusEvent::Resolution { primary, concurrent, id, identifier_bits, wire, injection } => {
                tracing::debug!(
                    %primary,
                    %concurrent,
                    %id,
                    identifier = %weepingcan_proto::bits::render(identifier_bits),
                    wire = %weepingcan_proto::bits::render(wire),
                    "arbitration tie, both frames on the wire"
                );
                if let Some(trace) = injection {
                    tracing::debug!(
                        position = trace.position,
                        injected = trace.injected.as_bit(),
                        opposing = trace.opposing.as_bit(),
                        resolved = trace.resolved.as_bit(),
                        "injected bit resolved"
                    );
                }
            },
            BusEvent::ArbitrationLost { winner, loser, bit } => {
                tracing::debug!(%winner, %loser, bit, "arbitration lost");
            },
            BusEvent::BitError {
                detector,
                corrupted,
                position,
                flag,
                detector_counter,
                corrupted_counter,
            } => tracing::info!(
                %detector,
                %corrupted,
                position,
                ?flag,
                detector_before = detector_counter.before,
                detector_after = detector_counter.after,
                corrupted_before = corrupted_counter.before,
                corrupted_after = corrupted_counter.after,
                "bit error, error flag raised"
            ),
            BusEvent::Retransmitted { node, counter } => {
                tracing::debug!(%node, before = counter.before, after = counter.after, "retransmitted");
            },
            BusEvent::RetransmissionSuppressed { node } => {
                tracing::warn!(%node, "bus-off, retransmission suppressed");
            },
            BusEvent::Delivered { sender, id, recipients } => {
                tracing::trace!(%sender, %id, recipients, "frame delivered");
            },
            BusEvent::CleanBatch { node, count, counter } => tracing::debug!(
                %node,
                count,
                before = counter.before,
                after = counter.after,
                "clean transmissions"
            ),
            BusEvent::StateChanged(t) => {
                tracing::warn!(node = %t.node, from = %t.from, to = %t.to, counter = t.counter, "state transition");
            },
            BusEvent::TargetObserved { attacker, target, period_ms } => {
                tracing::info!(%attacker, %target, period_ms, "target pattern observed");
            },
            BusEvent::Cycle(summary) => tracing::info!(
                cycle = summary.cycle,
                victim_tec = summary.victim.counter,
                victim_state = %summary.victim.state,
                attacker_tec = summary.attacker.counter,
                attacker_state = %summary.attacker.state,
                effective = summary.effective,
                injection = summary.injection,
                "cycle complete"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Counting(Mutex<usize>);

    impl EventSink for Counting {
        fn record(&self, _event: &BusEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone()).with(Arc::new(NullSink));

        fanout.record(&BusEvent::NodeRegistered { node: NodeId::new("VICTIM") });

        assert_eq!(*a.0.lock().unwrap(), 1);
        assert_eq!(*b.0.lock().unwrap(), 1);
    }

    #[test]
    fn flag_kind_follows_state() {
        assert_eq!(ErrorFlag::for_state(OperatingState::Active), ErrorFlag::Active);
        assert_eq!(ErrorFlag::for_state(OperatingState::Passive), ErrorFlag::Passive);
        assert_eq!(ErrorFlag::Active.bits(), [Level::Dominant; 6]);
    }
}
