//! Simulation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use weepingcan_proto::{CanId, MAX_PAYLOAD, ProtoError};

use crate::{attacker::DEFAULT_RECOVERY_BATCH, victim::DEFAULT_PAYLOAD_PREFIX};

/// When the attacker sends its recovery batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryPolicy {
    /// After every cycle, effective or not.
    #[default]
    Always,
    /// Only after cycles that raised a bit error.
    AfterError,
}

impl RecoveryPolicy {
    /// Whether a cycle with the given outcome is followed by recovery.
    pub fn recovers(self, effective: bool) -> bool {
        match self {
            Self::Always => true,
            Self::AfterError => effective,
        }
    }
}

/// Errors from [`SimConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Victim identifier is not an 11-bit value.
    #[error("invalid victim identifier: {0}")]
    Identifier(#[from] ProtoError),

    /// Prefix leaves no room for the sequence byte.
    #[error("payload prefix too long: {len} bytes (max {max})")]
    PrefixTooLong {
        /// Offered prefix length.
        len: usize,
        /// Largest accepted prefix.
        max: usize,
    },

    /// A run must have at least one cycle.
    #[error("max cycles must be at least 1")]
    NoCycles,

    /// Victim and attacker share a name.
    #[error("victim and attacker names must differ: {name}")]
    SameName {
        /// Shared name.
        name: String,
    },
}

/// Parameters of one simulated attack run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Victim node name.
    pub victim_name: String,
    /// Attacker node name.
    pub attacker_name: String,
    /// Raw 11-bit identifier of the victim's periodic frame.
    pub victim_id: u16,
    /// Victim transmission period (reconnaissance metadata).
    pub victim_period: Duration,
    /// Fixed bytes before the victim's sequence counter.
    pub payload_prefix: Vec<u8>,
    /// Uncontested frames the attacker sends per recovery.
    pub recovery_batch: u16,
    /// When recovery runs.
    pub recovery_policy: RecoveryPolicy,
    /// Hard ceiling on attack cycles.
    pub max_cycles: u64,
    /// RNG seed for injection positions; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            victim_name: "VICTIM".to_string(),
            attacker_name: "ATTACKER".to_string(),
            victim_id: 0x100,
            victim_period: Duration::from_millis(10),
            payload_prefix: DEFAULT_PAYLOAD_PREFIX.to_vec(),
            recovery_batch: DEFAULT_RECOVERY_BATCH,
            recovery_policy: RecoveryPolicy::Always,
            max_cycles: 100,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Check every field and return the validated victim identifier.
    pub fn validate(&self) -> Result<CanId, ConfigError> {
        let id = CanId::new(self.victim_id)?;

        if self.payload_prefix.len() >= MAX_PAYLOAD {
            return Err(ConfigError::PrefixTooLong {
                len: self.payload_prefix.len(),
                max: MAX_PAYLOAD - 1,
            });
        }
        if self.max_cycles == 0 {
            return Err(ConfigError::NoCycles);
        }
        if self.victim_name == self.attacker_name {
            return Err(ConfigError::SameName { name: self.victim_name.clone() });
        }

        Ok(id)
    }
}
