//! Property runs - seeded operation sequences checked step by step.
//!
//! `TigerStyle`: The seed is the whole reproduction recipe.
//!
//! A [`PropertyTest`] draws operations from a [`DeterministicRng`], applies
//! them to a model, may move a [`SimClock`] forward before each step, and
//! checks the model's invariants after every step. The first violation stops
//! the run and is reported with the seed, the clock reading and the last few
//! operations that led up to it.

use std::collections::VecDeque;
use std::fmt::{self, Debug};

use super::clock::SimClock;
use super::config::SimConfig;
use super::rng::DeterministicRng;
use crate::constants::DST_SIMULATION_STEPS_MAX;

/// Operations kept in a failure report.
const PROPERTY_TRACE_COUNT_MAX: usize = 8;

/// Steps per run unless configured.
const PROPERTY_STEPS_COUNT_DEFAULT: u64 = 100;

/// A model that random operation sequences can drive.
pub trait PropertyTestable {
    /// One step of the model.
    type Operation: Debug + Clone;

    /// Draw the next operation. May look at the current state.
    fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation;

    /// Apply `op`. `clock` is the clock the run advances.
    fn apply_operation(&mut self, op: &Self::Operation, clock: &SimClock);

    /// Check the model's invariants.
    ///
    /// # Errors
    /// Describes the first violated invariant.
    fn check_invariants(&self) -> Result<(), String>;

    /// One-line summary used in failure reports.
    fn describe_state(&self) -> String {
        String::from("(no description)")
    }
}

/// How the run moves the clock before each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeAdvanceConfig {
    /// Clock stays put.
    None,
    /// Every step advances by this many ms.
    Fixed(u64),
    /// With `probability`, advance by a uniform amount in `[min_ms, max_ms]`.
    Random {
        /// Smallest advance
        min_ms: u64,
        /// Largest advance
        max_ms: u64,
        /// Chance of advancing at a given step
        probability: f64,
    },
}

impl Default for TimeAdvanceConfig {
    fn default() -> Self {
        Self::random(0, 1000, 0.5)
    }
}

impl TimeAdvanceConfig {
    /// Clock stays put.
    #[must_use]
    pub fn none() -> Self {
        Self::None
    }

    /// Advance by `ms` every step.
    #[must_use]
    pub fn fixed(ms: u64) -> Self {
        Self::Fixed(ms)
    }

    /// Advance by a random amount with the given probability.
    ///
    /// # Panics
    /// Panics if `min_ms > max_ms` or `probability` is outside [0, 1].
    #[must_use]
    pub fn random(min_ms: u64, max_ms: u64, probability: f64) -> Self {
        assert!(min_ms <= max_ms, "time advance range inverted: {min_ms} > {max_ms}");
        assert!(
            (0.0..=1.0).contains(&probability),
            "time advance probability {probability} outside [0, 1]"
        );
        Self::Random {
            min_ms,
            max_ms,
            probability,
        }
    }

    fn draw(self, rng: &mut DeterministicRng) -> u64 {
        match self {
            Self::None => 0,
            Self::Fixed(ms) => ms,
            Self::Random {
                min_ms,
                max_ms,
                probability,
            } => {
                if rng.next_bool(probability) {
                    rng.next_u64_in(min_ms, max_ms)
                } else {
                    0
                }
            }
        }
    }
}

/// Where and why a run stopped.
#[derive(Debug, Clone)]
pub struct PropertyTestFailure {
    /// Zero-based step; `None` if the initial state was already invalid
    pub step: Option<u64>,
    /// Invariant message from the model
    pub violation: String,
    /// Model summary at the point of failure
    pub state: String,
    /// Clock reading at the point of failure
    pub clock_ms: u64,
    /// Most recent operations, oldest first, ending with the failing one
    pub trace: Vec<String>,
}

impl fmt::Display for PropertyTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => writeln!(f, "invariant violated after step {step}: {}", self.violation)?,
            None => writeln!(f, "initial state invalid: {}", self.violation)?,
        }
        writeln!(f, "  clock: {} ms", self.clock_ms)?;
        writeln!(f, "  state: {}", self.state)?;
        for (i, op) in self.trace.iter().enumerate() {
            writeln!(f, "  op[-{}]: {op}", self.trace.len() - i)?;
        }
        Ok(())
    }
}

/// Outcome of [`PropertyTest::run`].
#[derive(Debug, Clone)]
pub struct PropertyTestResult {
    /// Seed of the run
    pub seed: u64,
    /// Steps applied, including a failing one
    pub steps: u64,
    /// First violation, if any
    pub failure: Option<PropertyTestFailure>,
}

impl PropertyTestResult {
    /// Check if every step kept the invariants.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Panic with the reproduction report if the run failed.
    ///
    /// # Panics
    /// Panics if the run failed.
    pub fn assert_success(self) {
        if let Some(failure) = self.failure {
            panic!("property run failed with seed {} (set DST_SEED to replay)\n{failure}", self.seed);
        }
    }
}

/// Seeded runner for a [`PropertyTestable`] model.
#[derive(Debug)]
pub struct PropertyTest {
    seed: u64,
    max_steps: u64,
    time: TimeAdvanceConfig,
    clock: SimClock,
}

impl PropertyTest {
    /// Runner with a private clock at 0 and default time advance.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_steps: PROPERTY_STEPS_COUNT_DEFAULT,
            time: TimeAdvanceConfig::default(),
            clock: SimClock::new(),
        }
    }

    /// Number of steps to run.
    ///
    /// # Panics
    /// Panics if `max` exceeds `DST_SIMULATION_STEPS_MAX`.
    #[must_use]
    pub fn with_max_operations(mut self, max: u64) -> Self {
        assert!(
            max <= DST_SIMULATION_STEPS_MAX,
            "max steps {max} exceeds {DST_SIMULATION_STEPS_MAX}"
        );
        self.max_steps = max;
        self
    }

    /// How to move the clock between steps.
    #[must_use]
    pub fn with_time_advance(mut self, time: TimeAdvanceConfig) -> Self {
        self.time = time;
        self
    }

    /// Advance `clock` instead of a private one.
    ///
    /// Pass the clock the model reads from so aging is visible to it.
    #[must_use]
    pub fn with_clock(mut self, clock: SimClock) -> Self {
        self.clock = clock;
        self
    }

    /// Run until the step limit or the first violation.
    #[must_use]
    pub fn run<T: PropertyTestable>(self, mut model: T) -> PropertyTestResult {
        let mut rng = DeterministicRng::new(self.seed);
        let mut trace: VecDeque<String> = VecDeque::with_capacity(PROPERTY_TRACE_COUNT_MAX);

        if let Err(violation) = model.check_invariants() {
            return self.failed(0, None, violation, &model, trace);
        }

        for step in 0..self.max_steps {
            let advance = self.time.draw(&mut rng);
            if advance > 0 {
                self.clock.advance_ms(advance);
            }

            let op = model.generate_operation(&mut rng);
            if trace.len() == PROPERTY_TRACE_COUNT_MAX {
                trace.pop_front();
            }
            trace.push_back(format!("{op:?}"));
            model.apply_operation(&op, &self.clock);

            if let Err(violation) = model.check_invariants() {
                return self.failed(step + 1, Some(step), violation, &model, trace);
            }
        }

        PropertyTestResult {
            seed: self.seed,
            steps: self.max_steps,
            failure: None,
        }
    }

    /// Run and panic on the first violation.
    ///
    /// # Panics
    /// Panics if any invariant is violated.
    pub fn run_and_assert<T: PropertyTestable>(self, model: T) {
        self.run(model).assert_success();
    }

    fn failed<T: PropertyTestable>(
        &self,
        steps: u64,
        step: Option<u64>,
        violation: String,
        model: &T,
        trace: VecDeque<String>,
    ) -> PropertyTestResult {
        PropertyTestResult {
            seed: self.seed,
            steps,
            failure: Some(PropertyTestFailure {
                step,
                violation,
                state: model.describe_state(),
                clock_ms: self.clock.now_ms(),
                trace: trace.into(),
            }),
        }
    }
}

/// Seeds for multi-seed runs: 0, 1 and 42, then seeds derived from a fixed root.
///
/// With `DST_SEED` set, only that seed is returned.
///
/// # Panics
/// Panics if `count` is below 3.
#[must_use]
pub fn test_seeds(count: usize) -> Vec<u64> {
    assert!(count >= 3, "need at least 3 seeds, got {count}");
    if let Some(seed) = SimConfig::env_seed() {
        return vec![seed];
    }

    let mut rng = DeterministicRng::new(0x7E57_5EED);
    [0, 1, 42]
        .into_iter()
        .chain(std::iter::repeat_with(|| rng.next_u64()))
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Token tally that must stay at or under `budget`.
    struct Tally {
        total: u64,
        budget: u64,
        enforce: bool,
    }

    #[derive(Debug, Clone)]
    enum TallyOp {
        Add(u64),
        Reset,
    }

    impl PropertyTestable for Tally {
        type Operation = TallyOp;

        fn generate_operation(&self, rng: &mut DeterministicRng) -> TallyOp {
            if rng.next_bool(0.9) {
                TallyOp::Add(rng.next_u64_in(1, 20))
            } else {
                TallyOp::Reset
            }
        }

        fn apply_operation(&mut self, op: &TallyOp, _clock: &SimClock) {
            match op {
                TallyOp::Add(n) => {
                    self.total += n;
                    if self.enforce && self.total > self.budget {
                        self.total = self.budget;
                    }
                }
                TallyOp::Reset => self.total = 0,
            }
        }

        fn check_invariants(&self) -> Result<(), String> {
            if self.total > self.budget {
                return Err(format!("total {} over budget {}", self.total, self.budget));
            }
            Ok(())
        }

        fn describe_state(&self) -> String {
            format!("total={} budget={}", self.total, self.budget)
        }
    }

    fn tally(enforce: bool) -> Tally {
        Tally {
            total: 0,
            budget: 50,
            enforce,
        }
    }

    #[test]
    fn test_run_passes_when_invariant_holds() {
        let result = PropertyTest::new(42)
            .with_max_operations(500)
            .with_time_advance(TimeAdvanceConfig::none())
            .run(tally(true));

        assert!(result.is_success());
        assert_eq!(result.steps, 500);
    }

    #[test]
    fn test_run_reports_violation_with_trace() {
        let result = PropertyTest::new(42)
            .with_max_operations(500)
            .run(tally(false));

        let failure = result.failure.expect("unbounded tally must overflow");
        assert!(failure.violation.contains("over budget"));
        assert!(failure.state.contains("budget=50"));
        assert_eq!(failure.step, Some(result.steps - 1));
        assert!(!failure.trace.is_empty() && failure.trace.len() <= PROPERTY_TRACE_COUNT_MAX);
        assert!(failure.to_string().contains("op[-1]"));
    }

    #[test]
    fn test_invalid_initial_state() {
        let model = Tally {
            total: 60,
            budget: 50,
            enforce: true,
        };

        let result = PropertyTest::new(1).run(model);

        assert_eq!(result.steps, 0);
        assert_eq!(result.failure.unwrap().step, None);
    }

    #[test]
    fn test_shared_clock_is_advanced() {
        let clock = SimClock::new();

        PropertyTest::new(7)
            .with_max_operations(10)
            .with_time_advance(TimeAdvanceConfig::fixed(100))
            .with_clock(clock.clone())
            .run_and_assert(tally(true));

        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn test_seeds_are_stable() {
        if SimConfig::env_seed().is_some() {
            return;
        }
        let seeds = test_seeds(6);
        assert_eq!(&seeds[..3], &[0, 1, 42]);
        assert_eq!(seeds.len(), 6);
        assert_eq!(seeds, test_seeds(6));
    }
}
