//! Summarizer fault injection.
//!
//! `TigerStyle`: Faults are rolled from a seeded RNG, so a failing seed fails
//! the same way every time.
//!
//! [`SimSummarizer`](crate::summarizer::SimSummarizer) asks the injector once
//! per call, naming the call `summarize_turn` (one turn) or `summarize_batch`
//! (a merge). Rules are checked in registration order and the first one that
//! fires wins.

use std::sync::{Mutex, PoisonError};

use super::rng::DeterministicRng;
use crate::constants::DST_FAULT_PROBABILITY_MAX;

/// Summarizer failure modes the simulation can force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// No answer until the deadline has passed
    SummarizerTimeout,
    /// Immediate `Unavailable` error
    SummarizerUnavailable,
    /// Empty text
    SummarizerEmpty,
    /// Input echoed back, ignoring the token limit
    SummarizerOversized,
    /// Extra delay before an otherwise normal answer
    SummarizerLatencySpike,
}

impl FaultType {
    /// Snake-case name for logs and assertion messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SummarizerTimeout => "summarizer_timeout",
            Self::SummarizerUnavailable => "summarizer_unavailable",
            Self::SummarizerEmpty => "summarizer_empty",
            Self::SummarizerOversized => "summarizer_oversized",
            Self::SummarizerLatencySpike => "summarizer_latency_spike",
        }
    }
}

/// One injection rule.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Fault produced when the rule fires
    pub fault_type: FaultType,
    /// Chance of firing per matching call
    pub probability: f64,
    /// Only calls whose name contains this substring match
    pub operation_filter: Option<String>,
    /// Stop firing after this many injections
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Rule firing `fault_type` with `probability` on every call.
    ///
    /// # Panics
    /// Panics if `probability` is outside [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        assert!(
            (0.0..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, {DST_FAULT_PROBABILITY_MAX}], got {probability}"
        );
        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Restrict to calls whose name contains `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Fire at most `max` times.
    ///
    /// # Panics
    /// Panics if `max` is zero.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }

    fn matches(&self, operation: &str) -> bool {
        self.operation_filter
            .as_deref()
            .map_or(true, |filter| operation.contains(filter))
    }
}

#[derive(Debug)]
struct Rolls {
    rng: DeterministicRng,
    /// Injections per rule, parallel to `FaultInjector::rules`
    fired: Vec<u64>,
}

/// Seeded rule set shared, behind an `Arc`, by a simulation and its summarizers.
#[derive(Debug)]
pub struct FaultInjector {
    rules: Vec<FaultConfig>,
    rolls: Mutex<Rolls>,
}

impl FaultInjector {
    /// Roll the rules for one call named `operation`.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        let mut rolls = self.rolls.lock().unwrap_or_else(PoisonError::into_inner);
        let Rolls { rng, fired } = &mut *rolls;

        for (rule, count) in self.rules.iter().zip(fired.iter_mut()) {
            if !rule.matches(operation) || rule.max_injections.is_some_and(|max| *count >= max) {
                continue;
            }
            if rng.next_bool(rule.probability) {
                *count += 1;
                return Some(rule.fault_type);
            }
        }
        None
    }

    /// Injections of `fault` so far, across all rules producing it.
    #[must_use]
    pub fn injections(&self, fault: FaultType) -> u64 {
        let rolls = self.rolls.lock().unwrap_or_else(PoisonError::into_inner);
        self.rules
            .iter()
            .zip(&rolls.fired)
            .filter(|(rule, _)| rule.fault_type == fault)
            .map(|(_, count)| count)
            .sum()
    }

    /// Injections of any kind so far.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        let rolls = self.rolls.lock().unwrap_or_else(PoisonError::into_inner);
        rolls.fired.iter().sum()
    }

    /// Check if any rule is registered.
    #[must_use]
    pub fn has_faults(&self) -> bool {
        !self.rules.is_empty()
    }
}

/// Collects rules for a [`FaultInjector`].
#[derive(Debug)]
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    rules: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Builder whose rolls come from `rng`.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            rules: Vec::new(),
        }
    }

    /// Add a rule.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.rules.push(config);
        self
    }

    /// Add timeout, unavailable, empty and oversized rules at `probability` each.
    #[must_use]
    pub fn with_summarizer_faults(self, probability: f64) -> Self {
        [
            FaultType::SummarizerTimeout,
            FaultType::SummarizerUnavailable,
            FaultType::SummarizerEmpty,
            FaultType::SummarizerOversized,
        ]
        .into_iter()
        .fold(self, |builder, fault| {
            builder.with_fault(FaultConfig::new(fault, probability))
        })
    }

    /// Freeze the rules.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let fired = vec![0; self.rules.len()];
        FaultInjector {
            rules: self.rules,
            rolls: Mutex::new(Rolls {
                rng: self.rng,
                fired,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injector(rules: &[FaultConfig]) -> FaultInjector {
        rules
            .iter()
            .cloned()
            .fold(FaultInjectorBuilder::new(DeterministicRng::new(42)), |b, rule| {
                b.with_fault(rule)
            })
            .build()
    }

    #[test]
    fn test_empty_injector_never_fires() {
        let faults = injector(&[]);
        assert!(!faults.has_faults());
        assert!((0..100).all(|_| faults.should_inject("summarize_turn").is_none()));
        assert_eq!(faults.total_injections(), 0);
    }

    #[test]
    fn test_certain_rule_fires() {
        let faults = injector(&[FaultConfig::new(FaultType::SummarizerTimeout, 1.0)]);

        assert_eq!(
            faults.should_inject("summarize_turn"),
            Some(FaultType::SummarizerTimeout)
        );
        assert_eq!(faults.injections(FaultType::SummarizerTimeout), 1);
        assert_eq!(faults.injections(FaultType::SummarizerEmpty), 0);
    }

    #[test]
    fn test_filter_scopes_rule_to_batches() {
        let faults = injector(&[
            FaultConfig::new(FaultType::SummarizerEmpty, 1.0).with_filter("batch")
        ]);

        assert_eq!(faults.should_inject("summarize_turn"), None);
        assert_eq!(
            faults.should_inject("summarize_batch"),
            Some(FaultType::SummarizerEmpty)
        );
    }

    #[test]
    fn test_exhausted_rule_yields_to_next() {
        let faults = injector(&[
            FaultConfig::new(FaultType::SummarizerUnavailable, 1.0).with_max_injections(2),
            FaultConfig::new(FaultType::SummarizerOversized, 1.0),
        ]);

        assert_eq!(faults.should_inject("x"), Some(FaultType::SummarizerUnavailable));
        assert_eq!(faults.should_inject("x"), Some(FaultType::SummarizerUnavailable));
        assert_eq!(faults.should_inject("x"), Some(FaultType::SummarizerOversized));
        assert_eq!(faults.total_injections(), 3);
    }

    #[test]
    fn test_same_seed_same_rolls() {
        let make = || {
            FaultInjectorBuilder::new(DeterministicRng::new(9))
                .with_summarizer_faults(0.3)
                .build()
        };
        let (a, b) = (make(), make());
        for _ in 0..200 {
            assert_eq!(a.should_inject("summarize_turn"), b.should_inject("summarize_turn"));
        }
        assert!(a.total_injections() > 0);
    }

    #[test]
    #[should_panic(expected = "probability must be in")]
    fn test_invalid_probability() {
        let _ = FaultConfig::new(FaultType::SummarizerTimeout, 2.0);
    }
}
