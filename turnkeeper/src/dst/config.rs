//! Seed and start time of a simulation.

use std::env;

/// Variable that overrides the seed of every simulation and property run.
pub const DST_SEED_ENV: &str = "DST_SEED";

/// Seed and clock origin for a [`Simulation`](super::Simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    seed: u64,
    start_ms: u64,
}

impl SimConfig {
    /// Config for `seed` with the clock at the epoch.
    ///
    /// ```
    /// use turnkeeper::dst::SimConfig;
    ///
    /// let config = SimConfig::with_seed(12345).with_start_ms(60_000);
    /// assert_eq!((config.seed(), config.start_ms()), (12345, 60_000));
    /// ```
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, start_ms: 0 }
    }

    /// Config for the `DST_SEED` seed if set, else `fallback`.
    ///
    /// # Panics
    /// Panics if `DST_SEED` is set but not a `u64`.
    #[must_use]
    pub fn from_env_or(fallback: u64) -> Self {
        Self::with_seed(Self::env_seed().unwrap_or(fallback))
    }

    /// Seed pinned through `DST_SEED`, if any.
    ///
    /// # Panics
    /// Panics if `DST_SEED` is set but not a `u64`.
    #[must_use]
    pub fn env_seed() -> Option<u64> {
        let raw = env::var(DST_SEED_ENV).ok()?;
        let seed = raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{DST_SEED_ENV} must be a u64, got {raw:?}"));
        tracing::info!(seed, "replaying pinned seed");
        Some(seed)
    }

    /// Start the clock at `start_ms`.
    #[must_use]
    pub fn with_start_ms(mut self, start_ms: u64) -> Self {
        self.start_ms = start_ms;
        self
    }

    /// Seed of the run.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Initial clock reading.
    #[must_use]
    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }
}
