//! Attacker role: the inject-then-recover cycle.
//!
//! Each cycle mirrors the victim's frame exactly (same identifier, same
//! payload) so arbitration ties, then drives a recessive level at one
//! randomly chosen payload bit. If the victim's bit there is dominant the
//! attacker reads back a mismatch and raises an error flag, costing both
//! nodes 8. The attacker then sends a batch of uncontested frames to pay its
//! own share back, while the victim only earns 1 for its retransmission.
//!
//! ```text
//! per effective cycle:  victim +8 −1 = +7     attacker +8 −N
//! per wasted cycle:     victim  0             attacker  −N (floored at 0)
//! ```
//!
//! A fixed injection position would produce a periodic error signature;
//! drawing it from an [`InjectionSource`] trades hit rate for stealth.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use weepingcan_proto::{CanId, Frame, NodeId};

use crate::{
    bus::{Bus, CleanBatch, Resolution},
    config::RecoveryPolicy,
    error::RoleError,
    event::BusEvent,
    injection::InjectionSource,
    node::{Node, NodeStatus, OperatingState},
};

/// Uncontested frames sent after every cycle by default.
pub const DEFAULT_RECOVERY_BATCH: u16 = 5;

/// Reconnaissance about the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recon {
    /// Target identifier.
    pub target: CanId,
    /// Observed transmission period.
    pub period: Duration,
}

/// Running totals for one attacker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttackStats {
    /// Attack cycles executed.
    pub cycles: u64,
    /// Cycles that raised a bit error.
    pub effective: u64,
    /// Cycles that hit a recessive victim bit.
    pub wasted: u64,
    /// Uncontested recovery frames sent.
    pub clean_frames: u64,
}

/// Result of one [`Attacker::attack`] cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// 1-based attack cycle index.
    pub cycle: u64,
    /// Injection position used.
    pub injection: usize,
    /// Whether a bit error was raised.
    pub effective: bool,
    /// Bus resolution of the collision.
    pub resolution: Resolution,
    /// Recovery batch, if one was sent.
    pub recovery: Option<CleanBatch>,
    /// Attacker after recovery.
    pub attacker: NodeStatus,
}

/// Adversarial participant.
pub struct Attacker<I> {
    node: NodeId,
    bus: Arc<Bus>,
    injector: I,
    recovery_batch: u16,
    policy: RecoveryPolicy,
    recon: Option<Recon>,
    stats: AttackStats,
}

impl<I: InjectionSource> Attacker<I> {
    /// Register a fresh node named `node` on `bus`.
    pub fn attach(bus: Arc<Bus>, node: NodeId, injector: I) -> Result<Self, RoleError> {
        bus.register(Node::new(node.clone()))?;
        Ok(Self {
            node,
            bus,
            injector,
            recovery_batch: DEFAULT_RECOVERY_BATCH,
            policy: RecoveryPolicy::default(),
            recon: None,
            stats: AttackStats::default(),
        })
    }

    /// Override the recovery batch size and policy.
    #[must_use]
    pub fn with_recovery(mut self, batch: u16, policy: RecoveryPolicy) -> Self {
        self.recovery_batch = batch;
        self.policy = policy;
        self
    }

    /// Node identity.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Current counter and state.
    pub fn status(&self) -> Result<NodeStatus, RoleError> {
        Ok(self.bus.status(&self.node)?)
    }

    /// Totals so far.
    pub fn stats(&self) -> AttackStats {
        self.stats
    }

    /// Last recorded reconnaissance.
    pub fn recon(&self) -> Option<Recon> {
        self.recon
    }

    /// Record the target's identifier and period.
    ///
    /// Bookkeeping only: the attack always mirrors the identifier of the
    /// frame it is handed.
    pub fn observe(&mut self, target: CanId, period: Duration) {
        self.recon = Some(Recon { target, period });

        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(attacker = %self.node, %target, period_ms, "pattern analysis complete");
        self.bus.record(&BusEvent::TargetObserved { attacker: self.node.clone(), target, period_ms });
    }

    /// Run one attack cycle against `victim_frame`.
    ///
    /// # Errors
    ///
    /// - `RoleError::AttackModelViolated` if the attacker is not error-active
    ///   before the cycle or after its recovery batch
    /// - `RoleError::EmptyPayload` if there is no payload bit to inject into
    /// - `RoleError::Bus` if the bus rejects either transmission
    pub fn attack(&mut self, victim_frame: &Frame) -> Result<CycleOutcome, RoleError> {
        self.ensure_active()?;

        let span = victim_frame.payload_span();
        if span.is_empty() {
            return Err(RoleError::EmptyPayload { sender: victim_frame.sender().clone() });
        }

        if let Some(recon) = self.recon.filter(|r| r.target != victim_frame.id()) {
            tracing::warn!(
                expected = %recon.target,
                actual = %victim_frame.id(),
                "target identifier differs from reconnaissance"
            );
        }

        let injection = self.injector.pick(span);
        let adversarial = Frame::adversarial(
            victim_frame.id(),
            victim_frame.payload().to_vec(),
            self.node.clone(),
            injection,
        )?;
        tracing::debug!(attacker = %self.node, injection, "attack frame built");

        let resolution = self.bus.resolve(victim_frame, Some(&adversarial))?;
        self.stats.cycles += 1;
        let cycle = self.stats.cycles;
        let effective = resolution.is_bit_error();
        if effective {
            self.stats.effective += 1;
        } else {
            self.stats.wasted += 1;
        }

        let recovery = if self.policy.recovers(effective) {
            let batch = self.bus.transmit_clean(&self.node, self.recovery_batch)?;
            self.stats.clean_frames += u64::from(self.recovery_batch);
            Some(batch)
        } else {
            None
        };

        let attacker = self.ensure_active()?;
        tracing::debug!(attacker = %self.node, cycle, effective, tec = attacker.counter, "attack cycle finished");

        Ok(CycleOutcome { cycle, injection, effective, resolution, recovery, attacker })
    }

    fn ensure_active(&self) -> Result<NodeStatus, RoleError> {
        let status = self.status()?;
        if status.state != OperatingState::Active {
            tracing::warn!(attacker = %self.node, tec = status.counter, state = %status.state, "left error-active");
            return Err(RoleError::AttackModelViolated {
                node: self.node.clone(),
                counter: status.counter,
                state: status.state,
            });
        }
        Ok(status)
    }
}

impl<I> std::fmt::Debug for Attacker<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attacker")
            .field("node", &self.node)
            .field("recovery_batch", &self.recovery_batch)
            .field("policy", &self.policy)
            .field("recon", &self.recon)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use weepingcan_proto::ProtoError;

    use super::*;
    use crate::{event::NullSink, victim::Victim};

    /// Replays a fixed list of positions, cycling.
    struct Script(VecDeque<usize>);

    impl InjectionSource for Script {
        fn pick(&mut self, _span: std::ops::Range<usize>) -> usize {
            let next = self.0.pop_front().unwrap();
            self.0.push_back(next);
            next
        }
    }

    fn setup(positions: &[usize]) -> (Victim, Attacker<Script>) {
        let bus = Arc::new(Bus::new(Arc::new(NullSink)));
        let victim = Victim::attach(
            bus.clone(),
            NodeId::new("VICTIM"),
            CanId::new(0x100).unwrap(),
            Duration::from_millis(10),
        )
        .unwrap();
        let attacker =
            Attacker::attach(bus, NodeId::new("ATTACKER"), Script(positions.iter().copied().collect()))
                .unwrap();
        (victim, attacker)
    }

    #[test]
    fn effective_cycle_arithmetic() {
        let (mut victim, mut attacker) = setup(&[13]);
        let frame = victim.next_frame().unwrap();

        let outcome = attacker.attack(&frame).unwrap();

        assert!(outcome.effective);
        assert_eq!(outcome.injection, 13);
        assert_eq!(victim.status().unwrap().counter, 7);
        assert_eq!(outcome.attacker.counter, 3);
        assert_eq!(outcome.recovery.map(|b| b.count), Some(5));
    }

    #[test]
    fn wasted_cycle_leaves_victim_untouched() {
        let (mut victim, mut attacker) = setup(&[11]);
        let frame = victim.next_frame().unwrap();

        let outcome = attacker.attack(&frame).unwrap();

        assert!(!outcome.effective);
        assert_eq!(victim.status().unwrap().counter, 0);
        assert_eq!(outcome.attacker.counter, 0);
        assert_eq!(attacker.stats().wasted, 1);
    }

    #[test]
    fn recovery_runs_on_wasted_cycles_by_default() {
        let (mut victim, mut attacker) = setup(&[13, 11]);
        attacker.attack(&victim.next_frame().unwrap()).unwrap();
        let outcome = attacker.attack(&victim.next_frame().unwrap()).unwrap();

        assert!(outcome.recovery.is_some());
        assert_eq!(outcome.attacker.counter, 0);
        assert_eq!(attacker.stats().clean_frames, 10);
    }

    #[test]
    fn after_error_policy_skips_recovery_on_wasted_cycle() {
        let (mut victim, attacker) = setup(&[13, 11]);
        let mut attacker = attacker.with_recovery(5, RecoveryPolicy::AfterError);

        attacker.attack(&victim.next_frame().unwrap()).unwrap();
        let outcome = attacker.attack(&victim.next_frame().unwrap()).unwrap();

        assert!(outcome.recovery.is_none());
        assert_eq!(outcome.attacker.counter, 3);
    }

    #[test]
    fn insufficient_recovery_violates_model() {
        let (mut victim, attacker) = setup(&[13]);
        let mut attacker = attacker.with_recovery(0, RecoveryPolicy::Always);

        let mut result = Ok(());
        for _ in 0..16 {
            result = attacker.attack(&victim.next_frame().unwrap()).map(|_| ());
            if result.is_err() {
                break;
            }
        }

        assert_eq!(
            result,
            Err(RoleError::AttackModelViolated {
                node: NodeId::new("ATTACKER"),
                counter: 128,
                state: OperatingState::Passive,
            })
        );
        assert!(attacker.attack(&victim.next_frame().unwrap()).is_err());
        assert_eq!(attacker.stats().cycles, 16);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let (_, mut attacker) = setup(&[13]);
        let frame = Frame::new(CanId::new(0x100).unwrap(), Vec::new(), NodeId::new("VICTIM")).unwrap();
        assert_eq!(
            attacker.attack(&frame),
            Err(RoleError::EmptyPayload { sender: NodeId::new("VICTIM") })
        );
        assert_eq!(attacker.stats().cycles, 0);
    }

    #[test]
    fn failed_cycle_is_not_counted() {
        let (mut victim, mut attacker) = setup(&[5, 13]);
        let frame = victim.next_frame().unwrap();

        let result = attacker.attack(&frame);
        assert!(matches!(
            result,
            Err(RoleError::Frame(ProtoError::InjectionOutOfRange { position: 5, .. }))
        ));
        assert_eq!(attacker.stats(), AttackStats::default());

        let outcome = attacker.attack(&frame).unwrap();
        let stats = attacker.stats();
        assert_eq!(outcome.cycle, 1);
        assert_eq!(stats.cycles, stats.effective + stats.wasted);
    }

    #[test]
    fn observe_records_recon() {
        let (_, mut attacker) = setup(&[13]);
        attacker.observe(CanId::new(0x100).unwrap(), Duration::from_millis(10));
        assert_eq!(
            attacker.recon(),
            Some(Recon { target: CanId::new(0x100).unwrap(), period: Duration::from_millis(10) })
        );
    }
}
