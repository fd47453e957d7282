//! WeepingCAN simulator binary.
//!
//! # Usage
//!
//! ```bash
//! # Default run: victim 0x100, recovery batch 5, random seed
//! weepingcan-sim
//!
//! # Reproducible run with an event log
//! weepingcan-sim --seed 42 --events run.jsonl
//!
//! # Heal only after errors, paced for watching
//! weepingcan-sim --policy after-error --delay-ms 50 --log-level debug
//! ```

mod recorder;

use std::{error::Error, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use recorder::JsonLinesSink;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use weepingcan_core::{
    EventSink, FanoutSink, RandomInjection, RecoveryPolicy, SimConfig, Simulation, Termination,
    TracingSink,
};

/// WeepingCAN bus-off attack simulator
#[derive(Parser, Debug)]
#[command(name = "weepingcan-sim")]
#[command(about = "Simulate a stealthy bus-off attack on a CAN victim")]
#[command(version)]
struct Args {
    /// Victim frame identifier (decimal or 0x-prefixed hex, 11 bits)
    #[arg(long, default_value = "0x100", value_parser = parse_id)]
    victim_id: u16,

    /// Victim transmission period in milliseconds
    #[arg(long, default_value = "10")]
    period_ms: u64,

    /// Maximum attack cycles
    #[arg(long, default_value = "100")]
    max_cycles: u64,

    /// Uncontested frames sent after each cycle
    #[arg(long, default_value = "5")]
    recovery_batch: u16,

    /// When the recovery batch is sent
    #[arg(long, value_enum, default_value = "always")]
    policy: PolicyArg,

    /// Seed for injection positions (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Write every bus event as JSON lines to this file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Wall-clock pause between cycles in milliseconds
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Always,
    AfterError,
}

impl From<PolicyArg> for RecoveryPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Always => Self::Always,
            PolicyArg::AfterError => Self::AfterError,
        }
    }
}

fn parse_id(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Uniform injection positions seeded from `seed`.
pub(crate) fn injector(seed: u64) -> RandomInjection<ChaCha8Rng> {
    RandomInjection::new(ChaCha8Rng::seed_from_u64(seed))
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match run(args) {
        Ok(Termination::VictimOffline { .. }) => ExitCode::SUCCESS,
        Ok(Termination::CycleLimit { .. }) => ExitCode::from(1),
        Ok(Termination::AttackModelViolated { .. }) => ExitCode::from(2),
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            ExitCode::from(3)
        },
    }
}

fn run(args: Args) -> Result<Termination, Box<dyn Error>> {
    let seed = match args.seed {
        Some(seed) => seed,
        None => getrandom::u64()?,
    };

    let config = SimConfig {
        victim_id: args.victim_id,
        victim_period: Duration::from_millis(args.period_ms),
        recovery_batch: args.recovery_batch,
        recovery_policy: args.policy.into(),
        max_cycles: args.max_cycles,
        seed: Some(seed),
        ..SimConfig::default()
    };

    let recorder = args.events.as_deref().map(JsonLinesSink::create).transpose()?.map(Arc::new);
    let sink: Arc<dyn EventSink> = match &recorder {
        Some(json) => Arc::new(FanoutSink::new().with(Arc::new(TracingSink)).with(json.clone())),
        None => Arc::new(TracingSink),
    };

    tracing::info!(seed, victim_id = args.victim_id, policy = ?config.recovery_policy, "WeepingCAN simulation starting");

    let mut simulation = Simulation::new(&config, injector(seed), sink)?;
    let delay = Duration::from_millis(args.delay_ms);
    let report = simulation.run_with(|_| {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    })?;

    if let Some(json) = &recorder {
        json.flush()?;
    }

    let stats = report.stats;
    tracing::info!(
        cycles = report.cycles,
        effective = stats.effective,
        wasted = stats.wasted,
        clean_frames = stats.clean_frames,
        "attack statistics"
    );
    tracing::info!("final {}", report.victim);
    tracing::info!("final {}", report.attacker);
    match report.termination {
        Termination::VictimOffline { cycle } => {
            tracing::info!(cycle, "attack succeeded: victim is bus-off");
        },
        Termination::AttackModelViolated { cycle, counter, state } => {
            tracing::error!(cycle, counter, %state, "attack model violated: attacker left error-active");
        },
        Termination::CycleLimit { cycles } => {
            tracing::warn!(cycles, "cycle limit reached before bus-off");
        },
    }

    Ok(report.termination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_ids() {
        assert_eq!(parse_id("0x100"), Ok(0x100));
        assert_eq!(parse_id("0X7FF"), Ok(0x7FF));
        assert_eq!(parse_id("256"), Ok(256));
        assert!(parse_id("0xZZ").is_err());
    }

    #[test]
    fn cli_maps_onto_config_defaults() {
        let args = Args::parse_from(["weepingcan-sim"]);
        let defaults = SimConfig::default();

        assert_eq!(args.victim_id, defaults.victim_id);
        assert_eq!(args.max_cycles, defaults.max_cycles);
        assert_eq!(args.recovery_batch, defaults.recovery_batch);
        assert_eq!(RecoveryPolicy::from(args.policy), defaults.recovery_policy);
        assert_eq!(Duration::from_millis(args.period_ms), defaults.victim_period);
    }

    #[test]
    fn after_error_policy_flag() {
        let args = Args::parse_from(["weepingcan-sim", "--policy", "after-error", "--seed", "9"]);
        assert_eq!(RecoveryPolicy::from(args.policy), RecoveryPolicy::AfterError);
        assert_eq!(args.seed, Some(9));
    }

    #[test]
    fn seeded_run_ends_with_bus_off() {
        let args = Args::parse_from(["weepingcan-sim", "--seed", "3", "--max-cycles", "1000"]);
        assert!(matches!(run(args), Ok(Termination::VictimOffline { .. })));
    }
}
