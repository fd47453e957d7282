//! Reproducible injection sources.

use std::ops::Range;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use weepingcan_core::{InjectionSource, RandomInjection};

/// Uniform positions from a ChaCha8 stream.
pub type SeededInjection = RandomInjection<ChaCha8Rng>;

/// Seeded uniform source: same seed, same positions.
pub fn seeded(seed: u64) -> SeededInjection {
    RandomInjection::new(ChaCha8Rng::seed_from_u64(seed))
}

/// Replays a fixed list of absolute bit positions, wrapping at the end.
///
/// Positions are returned as given, even outside the offered span, so tests
/// can provoke out-of-range injections. An empty script yields `span.start`.
#[derive(Debug, Clone)]
pub struct ScriptedInjection {
    positions: Vec<usize>,
    next: usize,
}

impl ScriptedInjection {
    /// Script from absolute bit offsets.
    pub fn new(positions: impl Into<Vec<usize>>) -> Self {
        Self { positions: positions.into(), next: 0 }
    }

    /// Number of picks made so far.
    pub fn picks(&self) -> usize {
        self.next
    }
}

impl InjectionSource for ScriptedInjection {
    fn pick(&mut self, span: Range<usize>) -> usize {
        if self.positions.is_empty() {
            return span.start;
        }
        let pos = self.positions[self.next % self.positions.len()];
        self.next += 1;
        pos
    }
}
