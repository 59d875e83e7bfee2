//! `SimSummarizer` - deterministic extractive summarizer.
//!
//! Keeps the first sentence of every turn, prefixed by its role when several
//! turns are merged, and cuts the result at a word boundary to fit the
//! requested size. Fault injection and
//! optional latency make it a stand-in for a model-backed summarizer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{Summarizer, SummarizerError};
use crate::constants::{
    SIM_SUMMARIZER_LATENCY_MS_MAX, SIM_SUMMARIZER_LATENCY_MS_MIN, TOKEN_CHARS_PER_TOKEN_DEFAULT,
};
use crate::dst::{DeterministicRng, FaultInjector, FaultType};
use crate::turn::Turn;

/// Simulation summarizer.
///
/// # Example
///
/// ```rust
/// use turnkeeper::summarizer::{SimSummarizer, Summarizer};
/// use turnkeeper::{CharRatioCounter, Role, Turn};
/// use std::time::Duration;
///
/// # tokio_test_block_on(async {
/// let counter = CharRatioCounter::default();
/// let turns = [Turn::new(Role::User, "Book a table. For two people.", &counter, 0, 0)];
/// let text = SimSummarizer::with_seed(42)
///     .summarize(&turns, 64, Duration::from_secs(1))
///     .await
///     .unwrap();
/// assert_eq!(text, "Book a table.");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SimSummarizer {
    seed: u64,
    rng: Arc<Mutex<DeterministicRng>>,
    faults: Option<Arc<FaultInjector>>,
    latency_ms: Option<(u64, u64)>,
}

impl SimSummarizer {
    /// Create a summarizer with no faults and no latency.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: Arc::new(Mutex::new(DeterministicRng::new(seed))),
            faults: None,
            latency_ms: None,
        }
    }

    /// Consult `faults` before every call.
    #[must_use]
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Sleep for a seeded duration in [min_ms, max_ms] on every call.
    ///
    /// Uses `tokio::time`, so paused-time tests stay instant.
    ///
    /// # Panics
    /// Panics if the range is empty or outside the simulated latency limits.
    #[must_use]
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        assert!(min_ms <= max_ms, "latency range inverted: {min_ms} > {max_ms}");
        assert!(
            min_ms >= SIM_SUMMARIZER_LATENCY_MS_MIN && max_ms <= SIM_SUMMARIZER_LATENCY_MS_MAX,
            "latency must be in [{SIM_SUMMARIZER_LATENCY_MS_MIN}, {SIM_SUMMARIZER_LATENCY_MS_MAX}]"
        );
        self.latency_ms = Some((min_ms, max_ms));
        self
    }

    /// Seed used by this summarizer.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn sample_latency_ms(&self) -> Option<u64> {
        let (min, max) = self.latency_ms?;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Some(rng.next_u64_in(min, max))
    }

    /// Extractive summary of `turns` capped at roughly `max_tokens`.
    fn extract(turns: &[Turn], max_tokens: usize) -> String {
        let joined = match turns {
            [single] => first_sentence(single.content()).to_string(),
            _ => turns
                .iter()
                .map(|t| format!("{}: {}", t.role(), first_sentence(t.content())))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        cut_at_word(&joined, max_tokens.saturating_mul(TOKEN_CHARS_PER_TOKEN_DEFAULT))
    }
}

fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    match text.find(['.', '?', '!', '\n']) {
        Some(end) => {
            let end = end + text[end..].chars().next().map_or(0, char::len_utf8);
            text[..end].trim_end()
        }
        None => text,
    }
}

fn cut_at_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let byte_end = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(i, _)| i);
    let prefix = &text[..byte_end];
    match prefix.rfind(char::is_whitespace) {
        Some(space) if space > 0 => prefix[..space].trim_end().to_string(),
        _ => prefix.to_string(),
    }
}

#[async_trait]
impl Summarizer for SimSummarizer {
    #[tracing::instrument(skip(self, turns), fields(turns = turns.len(), seed = self.seed))]
    async fn summarize(
        &self,
        turns: &[Turn],
        max_tokens: usize,
        deadline: Duration,
    ) -> Result<String, SummarizerError> {
        let operation = if turns.len() == 1 {
            "summarize_turn"
        } else {
            "summarize_batch"
        };
        if let Some(fault) = self.faults.as_ref().and_then(|f| f.should_inject(operation)) {
            match fault {
                FaultType::SummarizerTimeout => {
                    tokio::time::sleep(deadline).await;
                    return Err(SummarizerError::timeout(deadline));
                }
                FaultType::SummarizerUnavailable => {
                    return Err(SummarizerError::unavailable("injected fault"));
                }
                FaultType::SummarizerEmpty => return Ok(String::new()),
                FaultType::SummarizerOversized => {
                    return Ok(turns.iter().map(Turn::content).collect::<Vec<_>>().join("\n"));
                }
                FaultType::SummarizerLatencySpike => {
                    tokio::time::sleep(Duration::from_millis(SIM_SUMMARIZER_LATENCY_MS_MAX)).await;
                }
            }
        }

        if let Some(latency) = self.sample_latency_ms() {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        Ok(Self::extract(turns, max_tokens))
    }

    fn name(&self) -> &'static str {
        "sim"
    }

    fn is_simulation(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::{FaultConfig, FaultInjectorBuilder};
    use crate::token::{CharRatioCounter, TokenCounter};
    use crate::turn::Role;

    fn turns() -> Vec<Turn> {
        let counter = CharRatioCounter::default();
        vec![
            Turn::new(Role::User, "Where is my order? It was due Monday.", &counter, 0, 0),
            Turn::new(Role::Assistant, "Checking now. One moment please.", &counter, 0, 1),
        ]
    }

    #[test]
    fn test_first_sentence() {
        assert_eq!(first_sentence("  One. Two."), "One.");
        assert_eq!(first_sentence("no terminator"), "no terminator");
        assert_eq!(first_sentence("line one\nline two"), "line one");
    }

    #[test]
    fn test_cut_at_word() {
        assert_eq!(cut_at_word("alpha beta gamma", 100), "alpha beta gamma");
        assert_eq!(cut_at_word("alpha beta gamma", 12), "alpha beta");
        assert_eq!(cut_at_word("abcdefgh", 3), "abc");
    }

    #[tokio::test]
    async fn test_extractive_summary() {
        let summarizer = SimSummarizer::with_seed(42);

        let text = summarizer
            .summarize(&turns(), 100, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(text, "user: Where is my order?\nassistant: Checking now.");
    }

    #[tokio::test]
    async fn test_summary_respects_limit() {
        let summarizer = SimSummarizer::with_seed(42);
        let counter = CharRatioCounter::default();

        let text = summarizer
            .summarize(&turns(), 5, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(counter.count(&text) <= 5, "got {text:?}");
        assert!(!text.is_empty());
    }

    #[tokio::test]
    async fn test_deterministic() {
        let a = SimSummarizer::with_seed(1);
        let b = SimSummarizer::with_seed(1);
        let deadline = Duration::from_secs(1);
        assert_eq!(
            a.summarize(&turns(), 50, deadline).await,
            b.summarize(&turns(), 50, deadline).await
        );
    }

    #[tokio::test]
    async fn test_unavailable_fault() {
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(42))
            .with_fault(FaultConfig::new(FaultType::SummarizerUnavailable, 1.0))
            .build();
        let summarizer = SimSummarizer::with_seed(42).with_faults(Arc::new(faults));

        let result = summarizer.summarize(&turns(), 50, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(SummarizerError::Unavailable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fault_waits_for_deadline() {
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(42))
            .with_fault(FaultConfig::new(FaultType::SummarizerTimeout, 1.0))
            .build();
        let summarizer = SimSummarizer::with_seed(42).with_faults(Arc::new(faults));
        let start = tokio::time::Instant::now();

        let result = summarizer
            .summarize(&turns(), 50, Duration::from_millis(300))
            .await;

        assert_eq!(result, Err(SummarizerError::Timeout { deadline_ms: 300 }));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_empty_and_oversized_faults() {
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(42))
            .with_fault(FaultConfig::new(FaultType::SummarizerEmpty, 1.0).with_max_injections(1))
            .with_fault(FaultConfig::new(FaultType::SummarizerOversized, 1.0))
            .build();
        let summarizer = SimSummarizer::with_seed(42).with_faults(Arc::new(faults));
        let deadline = Duration::from_secs(1);

        assert_eq!(summarizer.summarize(&turns(), 2, deadline).await, Ok(String::new()));
        let oversized = summarizer.summarize(&turns(), 2, deadline).await.unwrap();
        assert!(oversized.contains("It was due Monday."));
    }

    #[tokio::test]
    async fn test_batch_only_fault_spares_single_turns() {
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(42))
            .with_fault(FaultConfig::new(FaultType::SummarizerUnavailable, 1.0).with_filter("batch"))
            .build();
        let summarizer = SimSummarizer::with_seed(42).with_faults(Arc::new(faults));
        let deadline = Duration::from_secs(1);
        let all = turns();

        assert!(summarizer.summarize(&all[..1], 50, deadline).await.is_ok());
        assert!(summarizer.summarize(&all, 50, deadline).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_uses_tokio_time() {
        let summarizer = SimSummarizer::with_seed(7).with_latency(100, 200);
        let start = tokio::time::Instant::now();

        let _ = summarizer.summarize(&turns(), 50, Duration::from_secs(5)).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed <= Duration::from_millis(250));
    }
}
