//! Simulation harness.
//!
//! `TigerStyle`: One seed fixes the clock origin, the test body's RNG and
//! every fault roll, so a failing run replays from its seed alone.

use std::future::Future;
use std::sync::Arc;

use super::clock::SimClock;
use super::config::SimConfig;
use super::fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
use super::rng::DeterministicRng;
use crate::config::MemoryConfig;
use crate::error::MemoryResult;
use crate::manager::MemoryManager;
use crate::summarizer::SimSummarizer;

/// What a simulation body gets to work with.
#[derive(Debug)]
pub struct SimEnvironment {
    /// Seed and clock origin of the run
    pub config: SimConfig,
    /// Clock shared with every manager built here
    pub clock: SimClock,
    /// Stream for the body's own random choices
    pub rng: DeterministicRng,
    /// Faults shared with every summarizer built here
    pub faults: Arc<FaultInjector>,
}

impl SimEnvironment {
    /// Move the shared clock forward.
    pub fn advance_time_ms(&self, ms: u64) -> u64 {
        self.clock.advance_ms(ms)
    }

    /// Shared clock reading.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Fresh summarizer rolling this environment's faults.
    pub fn summarizer(&mut self) -> SimSummarizer {
        SimSummarizer::with_seed(self.rng.next_u64()).with_faults(Arc::clone(&self.faults))
    }

    /// Manager on the shared clock with a fresh [`summarizer`](Self::summarizer).
    ///
    /// # Errors
    /// Returns `MemoryError::InvalidConfig` if `config` does not validate.
    pub fn create_manager(&mut self, config: MemoryConfig) -> MemoryResult<MemoryManager> {
        let summarizer = self.summarizer();
        MemoryManager::builder()
            .with_config(config)
            .with_clock(self.clock.clone())
            .with_summarizer(Arc::new(summarizer))
            .build()
    }
}

/// Builder for a seeded [`SimEnvironment`].
///
/// ```
/// use turnkeeper::dst::{FaultConfig, FaultType, SimConfig, Simulation};
/// use turnkeeper::{MemoryConfig, MemoryError, Role, TurnOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), MemoryError> {
/// Simulation::new(SimConfig::with_seed(42))
///     .with_fault(FaultConfig::new(FaultType::SummarizerTimeout, 0.2))
///     .run(|mut env| async move {
///         let mut memory = env.create_manager(MemoryConfig::new())?;
///         memory.append(Role::User, "hello", TurnOptions::default()).await?;
///         env.advance_time_ms(60_000);
///         Ok(())
///     })
///     .await
/// # }
/// ```
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    faults: Vec<FaultConfig>,
}

impl Simulation {
    /// Simulation with no faults.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            faults: Vec::new(),
        }
    }

    /// Add a fault rule.
    #[must_use]
    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.faults.push(fault);
        self
    }

    /// Add timeout and unavailable rules at `probability` each.
    #[must_use]
    pub fn with_summarizer_faults(self, probability: f64) -> Self {
        [FaultType::SummarizerTimeout, FaultType::SummarizerUnavailable]
            .into_iter()
            .fold(self, |sim, fault| {
                sim.with_fault(FaultConfig::new(fault, probability))
            })
    }

    /// Build the environment.
    ///
    /// The fault stream is forked before the body's stream, so adding draws
    /// to a test body never changes which calls fail.
    #[must_use]
    pub fn build(self) -> SimEnvironment {
        let mut root = DeterministicRng::new(self.config.seed());
        let faults = self
            .faults
            .into_iter()
            .fold(FaultInjectorBuilder::new(root.fork()), FaultInjectorBuilder::with_fault)
            .build();

        SimEnvironment {
            clock: SimClock::at_ms(self.config.start_ms()),
            rng: root.fork(),
            faults: Arc::new(faults),
            config: self.config,
        }
    }

    /// Build the environment and run `body` in it.
    ///
    /// # Errors
    /// Returns whatever `body` returns.
    pub async fn run<F, Fut, E>(self, body: F) -> Result<(), E>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        body(self.build()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::{Role, TurnOptions};

    #[test]
    fn test_clock_starts_at_configured_time() {
        let env = Simulation::new(SimConfig::with_seed(1).with_start_ms(5_000)).build();

        assert_eq!(env.now_ms(), 5_000);
        assert_eq!(env.advance_time_ms(250), 5_250);
    }

    #[test]
    fn test_environment_replays_from_seed() {
        let mut a = Simulation::new(SimConfig::with_seed(99)).build();
        let mut b = Simulation::new(SimConfig::with_seed(99)).build();

        assert_eq!(a.rng.next_u64(), b.rng.next_u64());
        assert_eq!(a.summarizer().seed(), b.summarizer().seed());
    }

    #[test]
    fn test_summarizer_faults_register_two_rules() {
        let env = Simulation::new(SimConfig::with_seed(5))
            .with_summarizer_faults(1.0)
            .build();

        assert!(env.faults.has_faults());
        assert_eq!(
            env.faults.should_inject("summarize_turn"),
            Some(FaultType::SummarizerTimeout)
        );
    }

    #[tokio::test]
    async fn test_created_manager_uses_shared_clock() {
        Simulation::new(SimConfig::with_seed(3).with_start_ms(10_000))
            .run(|mut env| async move {
                let mut memory = env.create_manager(MemoryConfig::new())?;
                env.advance_time_ms(500);

                let appended = memory
                    .append(Role::User, "hello there", TurnOptions::default())
                    .await?;

                let turn = memory.get(appended.id).map(crate::turn::Turn::created_at_ms);
                assert_eq!(turn, Some(10_500));
                Ok::<_, crate::MemoryError>(())
            })
            .await
            .unwrap();
    }
}
