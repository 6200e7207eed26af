use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of randomized election timeouts.
///
/// Every draw is independent and uniform over `[min, max)`. Production nodes
/// seed from OS entropy so peers do not time out in lockstep; tests pass a
/// fixed seed to make the sequence reproducible.
#[derive(Debug, Clone)]
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
    rng: StdRng,
}

impl ElectionTimer {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self::with_rng(min_ms, max_ms, StdRng::from_entropy())
    }

    pub fn with_seed(min_ms: u64, max_ms: u64, seed: u64) -> Self {
        Self::with_rng(min_ms, max_ms, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min_ms: u64, max_ms: u64, rng: StdRng) -> Self {
        // An empty range would panic inside gen_range.
        let max_ms = max_ms.max(min_ms + 1);
        Self { min_ms, max_ms, rng }
    }

    /// Draw the next election timeout.
    pub fn next_timeout(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.min_ms..self.max_ms))
    }
}
