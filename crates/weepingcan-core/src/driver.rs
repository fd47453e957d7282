//! Cycle driver.
//!
//! One cycle is: victim builds its periodic frame, attacker collides with it
//! and recovers, the driver records a summary row. The loop ends when the
//! victim is bus-off, when the attacker leaves error-active, or when the
//! cycle ceiling is reached. Only the first of these is a successful attack.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use weepingcan_proto::NodeId;

use crate::{
    attacker::{AttackStats, Attacker, CycleOutcome},
    bus::Bus,
    config::{ConfigError, SimConfig},
    error::RoleError,
    event::{BusEvent, CycleSummary, EventSink},
    injection::InjectionSource,
    node::{NodeStatus, OperatingState},
    victim::Victim,
};

/// Errors that abort a simulation instead of terminating it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Configuration rejected before the bus was built.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A role failed for a reason other than a normal stop.
    #[error(transparent)]
    Role(#[from] RoleError),
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// Victim reached bus-off.
    VictimOffline {
        /// Cycle in which it happened.
        cycle: u64,
    },
    /// Attacker left error-active.
    AttackModelViolated {
        /// Cycle in which it happened.
        cycle: u64,
        /// Attacker's counter at that point.
        counter: u16,
        /// Attacker's state at that point.
        state: OperatingState,
    },
    /// Ceiling reached with the victim still connected.
    CycleLimit {
        /// Cycles executed.
        cycles: u64,
    },
}

impl Termination {
    /// Whether the attack reached its goal.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::VictimOffline { .. })
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Cycles executed.
    pub cycles: u64,
    /// Per-cycle outcomes, in order. A cycle aborted by the attacker's
    /// post-check has no entry.
    pub outcomes: Vec<CycleOutcome>,
    /// Victim at the end of the run.
    pub victim: NodeStatus,
    /// Attacker at the end of the run.
    pub attacker: NodeStatus,
    /// Attacker totals.
    pub stats: AttackStats,
    /// Stop reason.
    pub termination: Termination,
}

/// A bus with one victim and one attacker.
#[derive(Debug)]
pub struct Simulation<I> {
    bus: Arc<Bus>,
    victim: Victim,
    attacker: Attacker<I>,
    max_cycles: u64,
}

impl<I: InjectionSource> Simulation<I> {
    /// Validate `config`, build the bus and attach both roles.
    ///
    /// The attacker observes the victim's identifier and period before the
    /// first cycle.
    pub fn new(config: &SimConfig, injector: I, sink: Arc<dyn EventSink>) -> Result<Self, SimError> {
        let id = config.validate()?;
        let bus = Arc::new(Bus::new(sink));

        let victim = Victim::attach(
            bus.clone(),
            NodeId::new(config.victim_name.clone()),
            id,
            config.victim_period,
        )?
        .with_prefix(config.payload_prefix.clone())?;

        let mut attacker =
            Attacker::attach(bus.clone(), NodeId::new(config.attacker_name.clone()), injector)?
                .with_recovery(config.recovery_batch, config.recovery_policy);
        attacker.observe(victim.id(), victim.period());

        tracing::info!(
            victim = %victim.node(),
            attacker = %attacker.node(),
            id = %id,
            recovery_batch = config.recovery_batch,
            max_cycles = config.max_cycles,
            "simulation ready"
        );

        Ok(Self { bus, victim, attacker, max_cycles: config.max_cycles })
    }

    /// Shared bus.
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Victim role.
    pub fn victim(&self) -> &Victim {
        &self.victim
    }

    /// Attacker role.
    pub fn attacker(&self) -> &Attacker<I> {
        &self.attacker
    }

    /// Run a single cycle and record its summary.
    ///
    /// # Errors
    ///
    /// Stop conditions surface as `RoleError::VictimOffline` and
    /// `RoleError::AttackModelViolated`; see [`RoleError::is_expected_stop`].
    pub fn step(&mut self) -> Result<CycleOutcome, RoleError> {
        let frame = self.victim.next_frame()?;
        let outcome = self.attacker.attack(&frame)?;
        let victim = self.victim.status()?;

        self.bus.record(&BusEvent::Cycle(CycleSummary {
            cycle: outcome.cycle,
            victim,
            attacker: outcome.attacker.clone(),
            effective: outcome.effective,
            injection: outcome.injection,
        }));

        Ok(outcome)
    }

    /// Run until a stop condition.
    pub fn run(&mut self) -> Result<RunReport, SimError> {
        self.run_with(|_| {})
    }

    /// Run until a stop condition, calling `on_cycle` after every completed
    /// cycle.
    pub fn run_with<F>(&mut self, mut on_cycle: F) -> Result<RunReport, SimError>
    where
        F: FnMut(&CycleOutcome),
    {
        let mut outcomes = Vec::new();

        let termination = loop {
            let cycles = self.attacker.stats().cycles;
            if cycles >= self.max_cycles {
                break Termination::CycleLimit { cycles };
            }

            match self.step() {
                Ok(outcome) => {
                    on_cycle(&outcome);
                    let cycle = outcome.cycle;
                    outcomes.push(outcome);
                    if self.victim.status()?.state == OperatingState::Offline {
                        break Termination::VictimOffline { cycle };
                    }
                },
                Err(RoleError::VictimOffline { .. }) => {
                    break Termination::VictimOffline { cycle: cycles };
                },
                Err(RoleError::AttackModelViolated { counter, state, .. }) => {
                    break Termination::AttackModelViolated {
                        cycle: self.attacker.stats().cycles,
                        counter,
                        state,
                    };
                },
                Err(e) => return Err(e.into()),
            }
        };

        let report = RunReport {
            cycles: self.attacker.stats().cycles,
            outcomes,
            victim: self.victim.status()?,
            attacker: self.attacker.status()?,
            stats: self.attacker.stats(),
            termination,
        };

        if report.termination.is_success() {
            tracing::info!(cycles = report.cycles, victim = %report.victim, "victim is bus-off");
        } else {
            tracing::warn!(cycles = report.cycles, termination = ?report.termination, "attack did not complete");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::{config::RecoveryPolicy, event::NullSink};

    struct Script(VecDeque<usize>);

    impl InjectionSource for Script {
        fn pick(&mut self, _span: std::ops::Range<usize>) -> usize {
            let next = self.0.pop_front().unwrap();
            self.0.push_back(next);
            next
        }
    }

    fn simulation(config: &SimConfig, positions: &[usize]) -> Simulation<Script> {
        Simulation::new(config, Script(positions.iter().copied().collect()), Arc::new(NullSink)).unwrap()
    }

    #[test]
    fn always_effective_run_takes_37_cycles() {
        let mut sim = simulation(&SimConfig::default(), &[13]);
        let report = sim.run().unwrap();

        assert_eq!(report.termination, Termination::VictimOffline { cycle: 37 });
        assert_eq!(report.victim.counter, 256);
        assert_eq!(report.victim.state, OperatingState::Offline);
        assert_eq!(report.attacker.counter, 111);
        assert_eq!(report.attacker.state, OperatingState::Active);
        assert_eq!(report.outcomes.len(), 37);
    }

    #[test]
    fn alternating_run_keeps_attacker_low() {
        let mut sim = simulation(&SimConfig::default(), &[13, 11]);
        let mut peak = 0;
        let report = sim.run_with(|o| peak = peak.max(o.attacker.counter)).unwrap();

        assert_eq!(report.termination, Termination::VictimOffline { cycle: 73 });
        assert_eq!(report.stats.effective, 37);
        assert_eq!(report.stats.wasted, 36);
        assert!(peak <= 3);
    }

    #[test]
    fn cycle_limit_stops_run() {
        let config = SimConfig { max_cycles: 10, ..SimConfig::default() };
        let mut sim = simulation(&config, &[13]);
        let report = sim.run().unwrap();

        assert_eq!(report.termination, Termination::CycleLimit { cycles: 10 });
        assert!(!report.termination.is_success());
        assert_eq!(report.victim.counter, 70);
    }

    #[test]
    fn missing_recovery_violates_attack_model() {
        let config = SimConfig {
            recovery_batch: 0,
            recovery_policy: RecoveryPolicy::Always,
            ..SimConfig::default()
        };
        let mut sim = simulation(&config, &[13]);
        let report = sim.run().unwrap();

        assert_eq!(
            report.termination,
            Termination::AttackModelViolated { cycle: 16, counter: 128, state: OperatingState::Passive }
        );
        assert_eq!(report.outcomes.len(), 15);
        assert_eq!(report.victim.counter, 112);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimConfig { victim_id: 0xFFFF, ..SimConfig::default() };
        let result = Simulation::new(&config, Script(VecDeque::from([13])), Arc::new(NullSink));
        assert!(matches!(result, Err(SimError::Config(ConfigError::Identifier(_)))));
    }

    #[test]
    fn attacker_observes_victim_on_setup() {
        let sim = simulation(&SimConfig::default(), &[13]);
        let recon = sim.attacker().recon().unwrap();
        assert_eq!(recon.target, sim.victim().id());
        assert_eq!(recon.period, sim.victim().period());
    }
}
