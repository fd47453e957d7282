//! Shared bus medium.
//!
//! The bus is the only authority that turns offered frames into wire levels
//! and counter deltas. Participants are registered by identity; the bus keeps
//! each participant's [`Node`] and receive buffer behind a single lock so that
//! [`Bus::resolve`] and [`Bus::transmit_clean`] never observe a half-applied
//! update.
//!
//! ## Resolution
//!
//! ```text
//! one frame            → deliver, sender −1
//! identifiers differ   → lowest identifier wins arbitration, deliver, winner −1
//! identifiers equal    → wire-AND over identifier + payload
//!   no mismatch        → deliver, no credit
//!   mismatch at bit i  → error flag: detector +8, other sender +8,
//!                        other sender retransmits (−1) unless bus-off
//! ```

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use weepingcan_proto::{CanId, Frame, Level, NodeId, wire_and};

use crate::{
    error::BusError,
    event::{BusEvent, ErrorFlag, EventSink, InjectionTrace},
    node::{
        CounterChange, ERROR_PENALTY, Node, NodeStatus, OperatingState, SUCCESS_CREDIT,
        StateTransition,
    },
};

/// Outcome of [`Bus::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Single frame delivered; sender credited.
    Delivered {
        /// Sending node.
        sender: NodeId,
        /// Nodes that received the frame.
        recipients: usize,
    },

    /// Identifiers differed; the winner was delivered and credited.
    Arbitrated {
        /// Node that kept the bus.
        winner: NodeId,
        /// Node that backed off (no counter change).
        loser: NodeId,
        /// Identifier bit where arbitration was decided.
        bit: usize,
        /// Nodes that received the winning frame.
        recipients: usize,
    },

    /// Identical identifiers and identical wire levels: both transmitters
    /// finished together, no counter changes.
    Coalesced {
        /// Nodes that received the frame.
        recipients: usize,
    },

    /// A transmitter detected a bit error and raised an error flag.
    BitError(BitErrorReport),
}

impl Resolution {
    /// Whether the resolution ended in an error flag.
    pub fn is_bit_error(&self) -> bool {
        matches!(self, Self::BitError(_))
    }
}

/// Details of an error-flag resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitErrorReport {
    /// Bit offset of the mismatch.
    pub position: usize,
    /// Node that read back a different level than it sent.
    pub detector: NodeId,
    /// Node whose frame was destroyed.
    pub corrupted: NodeId,
    /// Flag kind raised by the detector.
    pub flag: ErrorFlag,
    /// What happened to the destroyed frame.
    pub retransmission: Retransmission,
}

/// Fate of a frame destroyed by an error flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retransmission {
    /// Sent again uncontested and delivered.
    Delivered {
        /// Nodes that received it.
        recipients: usize,
    },
    /// Sender went bus-off and could not retry.
    Suppressed,
}

/// Result of [`Bus::transmit_clean`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanBatch {
    /// Transmitting node.
    pub node: NodeId,
    /// Number of frames requested.
    pub count: u16,
    /// Counter before and after.
    pub counter: CounterChange,
}

/// A registered node and its receive buffer.
#[derive(Debug)]
struct Participant {
    node: Node,
    inbox: Vec<Frame>,
}

#[derive(Debug, Default)]
struct BusState {
    participants: BTreeMap<NodeId, Participant>,
}

/// Shared medium with mutually exclusive resolution.
pub struct Bus {
    state: Mutex<BusState>,
    sink: Arc<dyn EventSink>,
}

impl Bus {
    /// Create an empty bus reporting to `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { state: Mutex::new(BusState::default()), sink }
    }

    /// Forward an event to the bus's recorder.
    pub fn record(&self, event: &BusEvent) {
        self.sink.record(event);
    }

    /// Add a participant.
    ///
    /// # Errors
    ///
    /// Returns `BusError::DuplicateNode` if the identity is already present.
    pub fn register(&self, node: Node) -> Result<(), BusError> {
        let mut state = self.lock();
        let id = node.id().clone();
        if state.participants.contains_key(&id) {
            return Err(BusError::DuplicateNode { node: id });
        }

        state.participants.insert(id.clone(), Participant { node, inbox: Vec::new() });
        drop(state);

        tracing::debug!(node = %id, "registered on bus");
        self.record(&BusEvent::NodeRegistered { node: id });
        Ok(())
    }

    /// Snapshot of one participant.
    pub fn status(&self, id: &NodeId) -> Result<NodeStatus, BusError> {
        self.lock().participant(id).map(|p| p.node.status())
    }

    /// Snapshots of every participant, ordered by identity.
    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.lock().participants.values().map(|p| p.node.status()).collect()
    }

    /// Take every frame delivered to `id` since the last call.
    pub fn drain_inbox(&self, id: &NodeId) -> Result<Vec<Frame>, BusError> {
        let mut state = self.lock();
        let participant = state.participant_mut(id)?;
        Ok(std::mem::take(&mut participant.inbox))
    }

    /// Resolve one or two simultaneously offered frames.
    ///
    /// `concurrent` is the frame racing `primary` from the same start of
    /// frame. Identical identifiers put both on the wire together; any level
    /// mismatch is then a bit error for the transmitter that sent recessive.
    ///
    /// # Errors
    ///
    /// Returns `BusError::UnknownNode` or `BusError::SenderOffline` for senders
    /// that cannot transmit, and `BusError::SelfCollision` if both frames come
    /// from the same node. No counters change on error.
    ///
    /// Events produced by the resolution reach the sink after the bus lock is
    /// released, in the order they happened.
    pub fn resolve(
        &self,
        primary: &Frame,
        concurrent: Option<&Frame>,
    ) -> Result<Resolution, BusError> {
        let mut events = Vec::new();
        let resolution = self.lock().resolve(primary, concurrent, &mut events)?;

        for event in &events {
            self.record(event);
        }
        Ok(resolution)
    }

    /// Credit `count` uncontested, successful transmissions to `id`.
    ///
    /// The counter drops by `min(count, counter)`; this never raises an error
    /// flag and never moves the node to a worse state.
    pub fn transmit_clean(&self, id: &NodeId, count: u16) -> Result<CleanBatch, BusError> {
        let mut state = self.lock();
        let (counter, transition) = state.mutate(id, |node| node.decrement(count))?;
        drop(state);

        self.record(&BusEvent::CleanBatch { node: id.clone(), count, counter });
        if let Some(t) = transition {
            self.record(&BusEvent::StateChanged(t));
        }
        Ok(CleanBatch { node: id.clone(), count, counter })
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus").field("participants", &self.lock().participants.len()).finish()
    }
}

impl BusState {
    fn resolve(
        &mut self,
        primary: &Frame,
        concurrent: Option<&Frame>,
        events: &mut Vec<BusEvent>,
    ) -> Result<Resolution, BusError> {
        self.check_sender(primary.sender())?;

        let Some(concurrent) = concurrent else {
            let recipients = self.deliver_credited(primary, events)?;
            return Ok(Resolution::Delivered { sender: primary.sender().clone(), recipients });
        };

        self.check_sender(concurrent.sender())?;
        if primary.sender() == concurrent.sender() {
            return Err(BusError::SelfCollision { node: primary.sender().clone() });
        }

        if primary.id() == concurrent.id() {
            self.resolve_tie(primary, concurrent, events)
        } else {
            self.arbitrate(primary, concurrent, events)
        }
    }

    fn participant(&self, id: &NodeId) -> Result<&Participant, BusError> {
        self.participants.get(id).ok_or_else(|| BusError::UnknownNode { node: id.clone() })
    }

    fn participant_mut(&mut self, id: &NodeId) -> Result<&mut Participant, BusError> {
        self.participants.get_mut(id).ok_or_else(|| BusError::UnknownNode { node: id.clone() })
    }

    fn state_of(&self, id: &NodeId) -> Result<OperatingState, BusError> {
        self.participant(id).map(|p| p.node.state())
    }

    fn check_sender(&self, id: &NodeId) -> Result<(), BusError> {
        if self.state_of(id)? == OperatingState::Offline {
            return Err(BusError::SenderOffline { node: id.clone() });
        }
        Ok(())
    }

    /// Apply a counter mutation and report the change.
    fn mutate(
        &mut self,
        id: &NodeId,
        f: impl FnOnce(&mut Node) -> Option<StateTransition>,
    ) -> Result<(CounterChange, Option<StateTransition>), BusError> {
        let node = &mut self.participant_mut(id)?.node;
        let before = node.counter();
        let transition = f(node);
        Ok((CounterChange { before, after: node.counter() }, transition))
    }

    /// Push `frame` into the inbox of every connected node not in `exclude`.
    fn deliver(&mut self, frame: &Frame, exclude: &[&NodeId]) -> usize {
        let mut recipients = 0;
        for (id, participant) in &mut self.participants {
            if exclude.contains(&id) || participant.node.state() == OperatingState::Offline {
                continue;
            }
            participant.inbox.push(frame.clone());
            recipients += 1;
        }
        recipients
    }

    /// Deliver a successful transmission and credit its sender.
    fn deliver_credited(
        &mut self,
        frame: &Frame,
        events: &mut Vec<BusEvent>,
    ) -> Result<usize, BusError> {
        let sender = frame.sender();
        let (_, transition) = self.mutate(sender, |node| node.decrement(SUCCESS_CREDIT))?;
        let recipients = self.deliver(frame, &[sender]);

        events.push(BusEvent::Delivered { sender: sender.clone(), id: frame.id(), recipients });
        emit_transition(events, transition);
        Ok(recipients)
    }

    fn arbitrate(
        &mut self,
        primary: &Frame,
        concurrent: &Frame,
        events: &mut Vec<BusEvent>,
    ) -> Result<Resolution, BusError> {
        // The first differing bit is the highest set bit of the XOR; whoever
        // holds a 0 there (the numerically smaller identifier) wins.
        let diff = primary.id().raw() ^ concurrent.id().raw();
        let bit = (diff.leading_zeros() as usize).saturating_sub(16 - CanId::BITS);
        let (winner, loser) =
            if primary.id() < concurrent.id() { (primary, concurrent) } else { (concurrent, primary) };

        tracing::debug!(winner = %winner.sender(), loser = %loser.sender(), bit, "arbitration decided");
        events.push(BusEvent::ArbitrationLost {
            winner: winner.sender().clone(),
            loser: loser.sender().clone(),
            bit,
        });

        let recipients = self.deliver_credited(winner, events)?;
        Ok(Resolution::Arbitrated {
            winner: winner.sender().clone(),
            loser: loser.sender().clone(),
            bit,
            recipients,
        })
    }

    fn resolve_tie(
        &mut self,
        primary: &Frame,
        concurrent: &Frame,
        events: &mut Vec<BusEvent>,
    ) -> Result<Resolution, BusError> {
        let primary_bits = primary.bits();
        let concurrent_bits = concurrent.bits();
        let len = primary_bits.len().max(concurrent_bits.len());
        let wire: Vec<Level> =
            (0..len).map(|i| wire_and(level(&primary_bits, i), level(&concurrent_bits, i))).collect();

        let candidates = [
            (concurrent, &concurrent_bits, &primary_bits),
            (primary, &primary_bits, &concurrent_bits),
        ];
        let injection = candidates
            .into_iter()
            .filter(|(frame, ..)| frame.is_adversarial())
            .find_map(|(frame, own, other)| {
                frame.injection().map(|position| InjectionTrace {
                    position,
                    injected: level(own, position),
                    opposing: level(other, position),
                    resolved: level(&wire, position),
                })
            });

        events.push(BusEvent::Resolution {
            primary: primary.sender().clone(),
            concurrent: concurrent.sender().clone(),
            id: primary.id(),
            identifier_bits: primary_bits.iter().copied().take(CanId::BITS).collect(),
            wire: wire.clone(),
            injection,
        });

        // A transmitter monitors the bus while sending; the first level it
        // reads back differently from what it drove is a bit error.
        let detection = wire.iter().enumerate().find_map(|(i, &resolved)| {
            if level(&primary_bits, i) != resolved {
                Some((i, primary, concurrent))
            } else if level(&concurrent_bits, i) != resolved {
                Some((i, concurrent, primary))
            } else {
                None
            }
        });

        let Some((position, detector, corrupted)) = detection else {
            let recipients = self.deliver(primary, &[primary.sender(), concurrent.sender()]);
            events.push(BusEvent::Delivered {
                sender: primary.sender().clone(),
                id: primary.id(),
                recipients,
            });
            return Ok(Resolution::Coalesced { recipients });
        };

        self.raise_error_flag(position, detector, corrupted, events).map(Resolution::BitError)
    }

    fn raise_error_flag(
        &mut self,
        position: usize,
        detector: &Frame,
        corrupted: &Frame,
        events: &mut Vec<BusEvent>,
    ) -> Result<BitErrorReport, BusError> {
        let flag = ErrorFlag::for_state(self.state_of(detector.sender())?);

        let (detector_counter, detector_transition) =
            self.mutate(detector.sender(), |node| node.increment(ERROR_PENALTY))?;
        let (corrupted_counter, corrupted_transition) =
            self.mutate(corrupted.sender(), |node| node.increment(ERROR_PENALTY))?;

        events.push(BusEvent::BitError {
            detector: detector.sender().clone(),
            corrupted: corrupted.sender().clone(),
            position,
            flag,
            detector_counter,
            corrupted_counter,
        });
        emit_transition(events, detector_transition);
        emit_transition(events, corrupted_transition);

        let retransmission = if self.state_of(corrupted.sender())? == OperatingState::Offline {
            events.push(BusEvent::RetransmissionSuppressed { node: corrupted.sender().clone() });
            Retransmission::Suppressed
        } else {
            let (counter, transition) =
                self.mutate(corrupted.sender(), |node| node.decrement(SUCCESS_CREDIT))?;
            events.push(BusEvent::Retransmitted { node: corrupted.sender().clone(), counter });
            emit_transition(events, transition);

            let recipients = self.deliver(corrupted, &[corrupted.sender()]);
            Retransmission::Delivered { recipients }
        };

        Ok(BitErrorReport {
            position,
            detector: detector.sender().clone(),
            corrupted: corrupted.sender().clone(),
            flag,
            retransmission,
        })
    }
}

/// Level at `i`, recessive past the end of the sequence (idle bus).
fn level(bits: &[Level], i: usize) -> Level {
    bits.get(i).copied().unwrap_or(Level::Recessive)
}

fn emit_transition(events: &mut Vec<BusEvent>, transition: Option<StateTransition>) {
    events.extend(transition.map(BusEvent::StateChanged));
}
