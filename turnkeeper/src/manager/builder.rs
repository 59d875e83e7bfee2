//! Builder for [`MemoryManager`].

use std::collections::VecDeque;
use std::sync::Arc;

use crate::compression::Compressor;
use crate::config::MemoryConfig;
use crate::dst::SimClock;
use crate::error::MemoryResult;
use crate::eviction::{EvictionPolicy, ScoredEvictionPolicy};
use crate::observer::{MemoryObserver, TracingObserver};
use crate::scoring::ImportanceScorer;
use crate::summarizer::Summarizer;
use crate::token::{CharRatioCounter, TokenCounter};

use super::MemoryManager;

/// Assembles a [`MemoryManager`] from its components.
///
/// Anything not supplied gets a default: a clock following system time,
/// the chars/4 token counter, the scored policy built from the config,
/// truncation-only compression and the tracing observer.
///
/// # Example
///
/// ```rust
/// use turnkeeper::{MemoryConfig, MemoryManager, SimClock};
///
/// let manager = MemoryManager::builder()
///     .with_config(MemoryConfig::new().with_budget(4096, 512))
///     .with_clock(SimClock::new())
///     .build()
///     .unwrap();
/// assert_eq!(manager.budget_tokens(), 3584);
/// ```
#[derive(Debug, Default)]
pub struct MemoryManagerBuilder {
    config: MemoryConfig,
    clock: Option<SimClock>,
    counter: Option<Arc<dyn TokenCounter>>,
    policy: Option<Arc<dyn EvictionPolicy>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    observer: Option<Arc<dyn MemoryObserver>>,
}

impl MemoryManagerBuilder {
    /// Builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config`.
    #[must_use]
    pub fn with_config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Read time from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: SimClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Count tokens with `counter`.
    #[must_use]
    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Replace the eviction policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn EvictionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Compress and merge with `summarizer`.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Report events to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn MemoryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration and build.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn build(self) -> MemoryResult<MemoryManager> {
        self.config.validate()?;

        let counter = self
            .counter
            .unwrap_or_else(|| Arc::new(CharRatioCounter::default()));
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(ScoredEvictionPolicy::from_config(&self.config)));
        let compressor = Compressor::new(
            Arc::clone(&counter),
            self.summarizer,
            self.config.summarizer_deadline(),
        );

        tracing::debug!(
            ceiling = self.config.ceiling_tokens,
            reserve = self.config.reserve_tokens,
            counter = counter.name(),
            policy = policy.name(),
            "memory manager built"
        );

        Ok(MemoryManager {
            scorer: ImportanceScorer::new(self.config.scoring.clone()),
            clock: self.clock.unwrap_or_else(SimClock::from_system_time),
            observer: self.observer.unwrap_or_else(|| Arc::new(TracingObserver)),
            counter,
            policy,
            compressor,
            turns: Vec::new(),
            log: VecDeque::new(),
            next_seq: 0,
            config: self.config,
        })
    }
}
