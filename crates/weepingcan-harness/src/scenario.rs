//! Scenario builder for end-to-end attack runs.
//!
//! ```text
//! Scenario::new()
//!     .positions([13, 11])      // or .seed(42)
//!     .recovery(5, RecoveryPolicy::Always)
//!     .run()?                   // -> report + recorded events
//! ```

use std::sync::Arc;

use weepingcan_core::{
    BusEvent, CycleSummary, InjectionSource, RecoveryPolicy, RunReport, SimConfig, SimError,
    Simulation,
};

use crate::{injection::ScriptedInjection, recording::RecordingSink, seeded};

#[derive(Debug, Clone)]
enum Injection {
    Scripted(Vec<usize>),
    Seeded(u64),
}

/// Builder for a single simulated run.
#[derive(Debug, Clone)]
pub struct Scenario {
    config: SimConfig,
    injection: Injection,
}

/// What a scenario produced.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// Driver report.
    pub report: RunReport,
    /// Every event the bus and driver recorded, in order.
    pub events: Vec<BusEvent>,
}

impl ScenarioOutcome {
    /// The per-cycle summary rows.
    pub fn cycles(&self) -> impl Iterator<Item = &CycleSummary> {
        self.events.iter().filter_map(|e| match e {
            BusEvent::Cycle(summary) => Some(summary),
            _ => None,
        })
    }

    /// Highest attacker counter seen at the end of any cycle.
    pub fn attacker_peak(&self) -> u16 {
        self.cycles().map(|c| c.attacker.counter).max().unwrap_or(0)
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    /// Default configuration with seed 0.
    pub fn new() -> Self {
        Self { config: SimConfig::default(), injection: Injection::Seeded(0) }
    }

    /// Replay these absolute bit positions, wrapping.
    #[must_use]
    pub fn positions(mut self, positions: impl Into<Vec<usize>>) -> Self {
        self.injection = Injection::Scripted(positions.into());
        self
    }

    /// Draw positions from a ChaCha8 stream seeded with `seed`.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self.injection = Injection::Seeded(seed);
        self
    }

    /// Recovery batch size and policy.
    #[must_use]
    pub fn recovery(mut self, batch: u16, policy: RecoveryPolicy) -> Self {
        self.config.recovery_batch = batch;
        self.config.recovery_policy = policy;
        self
    }

    /// Cycle ceiling.
    #[must_use]
    pub fn max_cycles(mut self, max_cycles: u64) -> Self {
        self.config.max_cycles = max_cycles;
        self
    }

    /// Arbitrary adjustments to the configuration.
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut SimConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Run to termination, recording every event.
    pub fn run(self) -> Result<ScenarioOutcome, SimError> {
        let sink = Arc::new(RecordingSink::new());
        let injector: Box<dyn InjectionSource> = match self.injection {
            Injection::Scripted(positions) => Box::new(ScriptedInjection::new(positions)),
            Injection::Seeded(seed) => Box::new(seeded(seed)),
        };

        let mut simulation = Simulation::new(&self.config, injector, sink.clone())?;
        let report = simulation.run()?;

        Ok(ScenarioOutcome { report, events: sink.take() })
    }
}
