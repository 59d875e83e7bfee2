//! Compression - shrinking turns to a token target.
//!
//! `TigerStyle`: One summarizer attempt under a deadline, then truncation.
//! Truncation always succeeds, so every call makes progress and never
//! returns more tokens than it was given.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::constants::COMPRESSION_TRUNCATION_MARKER;
use crate::summarizer::{Summarizer, SummarizerError};
use crate::token::TokenCounter;
use crate::turn::{Provenance, Turn};

/// Why the truncation fallback was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionDegraded {
    /// No summarizer configured
    NoSummarizer,
    /// The summarizer call failed, timed out, or returned unusable text
    Summarizer(SummarizerError),
}

impl fmt::Display for CompressionDegraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSummarizer => f.write_str("no summarizer configured"),
            Self::Summarizer(err) => err.fmt(f),
        }
    }
}

/// Result of compressing one turn.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// The compressed turn (same id, provenance `Compressed`)
    pub turn: Turn,
    /// Tokens before compression
    pub tokens_before: usize,
    /// Set when truncation replaced the summarizer
    pub degraded: Option<CompressionDegraded>,
}

/// Result of merging several turns into one.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// New synthetic turn (provenance `Summary`)
    pub turn: Turn,
    /// Tokens held by the merged turns
    pub tokens_before: usize,
    /// Set when the truncated transcript replaced the summarizer
    pub degraded: Option<CompressionDegraded>,
}

/// Shrinks turns with an optional summarizer and a truncation fallback.
#[derive(Debug, Clone)]
pub struct Compressor {
    counter: Arc<dyn TokenCounter>,
    summarizer: Option<Arc<dyn Summarizer>>,
    deadline: Duration,
}

impl Compressor {
    /// Create a compressor.
    #[must_use]
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        summarizer: Option<Arc<dyn Summarizer>>,
        deadline: Duration,
    ) -> Self {
        Self {
            counter,
            summarizer,
            deadline,
        }
    }

    /// Summarizer deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Compress `turn` to at most `target_tokens`.
    ///
    /// # Postconditions
    /// - Result has the same id and provenance `Compressed`
    /// - Result tokens <= original tokens
    /// - Result tokens <= `target_tokens` (truncation can always reach it)
    pub async fn compress(&self, turn: &Turn, target_tokens: usize) -> CompressionOutcome {
        let tokens_before = turn.token_count();
        let limit = target_tokens.min(tokens_before);

        let (content, degraded) = match self.try_summarize(std::slice::from_ref(turn), limit).await {
            Ok(text) => (text, None),
            Err(reason) => {
                debug!(turn_id = %turn.id(), %reason, "compressing by truncation");
                (
                    truncate_to_tokens(turn.content(), limit, self.counter.as_ref()),
                    Some(reason),
                )
            }
        };

        let mut compressed = turn.clone();
        compressed.replace_content(content, Provenance::Compressed, self.counter.as_ref());

        // Postconditions
        assert!(
            compressed.token_count() <= tokens_before,
            "compression grew turn: {} > {}",
            compressed.token_count(),
            tokens_before
        );
        assert!(compressed.token_count() <= limit, "compression missed target");

        CompressionOutcome {
            turn: compressed,
            tokens_before,
            degraded,
        }
    }

    /// Merge `turns` into one summary turn of at most `target_tokens`.
    ///
    /// # Panics
    /// Panics if `turns` is empty.
    pub async fn summarize_batch(&self, turns: &[Turn], target_tokens: usize) -> BatchSummary {
        assert!(!turns.is_empty(), "summarize_batch needs turns");

        let tokens_before: usize = turns.iter().map(Turn::token_count).sum();
        let limit = target_tokens.min(tokens_before);

        let (content, degraded) = match self.try_summarize(turns, limit).await {
            Ok(text) => (text, None),
            Err(reason) => {
                debug!(turns = turns.len(), %reason, "summarizing by truncated transcript");
                let transcript = turns
                    .iter()
                    .map(|t| format!("{}: {}", t.role(), t.content()))
                    .collect::<Vec<_>>()
                    .join("\n");
                (
                    truncate_to_tokens(&transcript, limit, self.counter.as_ref()),
                    Some(reason),
                )
            }
        };

        let turn = Turn::summary_of(turns, content, self.counter.as_ref());

        // Postcondition
        assert!(turn.token_count() <= limit, "summary missed target");

        BatchSummary {
            turn,
            tokens_before,
            degraded,
        }
    }

    /// One summarizer attempt, validated against `limit`.
    async fn try_summarize(&self, turns: &[Turn], limit: usize) -> Result<String, CompressionDegraded> {
        let Some(summarizer) = self.summarizer.as_ref() else {
            return Err(CompressionDegraded::NoSummarizer);
        };

        let text = match tokio::time::timeout(
            self.deadline,
            summarizer.summarize(turns, limit, self.deadline),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => return Err(CompressionDegraded::Summarizer(err)),
            Err(_elapsed) => {
                return Err(CompressionDegraded::Summarizer(SummarizerError::timeout(
                    self.deadline,
                )))
            }
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(CompressionDegraded::Summarizer(SummarizerError::EmptyResult));
        }
        let tokens = self.counter.count(&text);
        if tokens > limit {
            return Err(CompressionDegraded::Summarizer(SummarizerError::Oversized {
                tokens,
                max_tokens: limit,
            }));
        }
        Ok(text)
    }
}

// =============================================================================
// Truncation
// =============================================================================

/// Cut `text` to at most `target_tokens`.
///
/// Cuts at the longest character prefix that still fits with the truncation
/// marker, backing off to the preceding word boundary unless that would drop
/// more than half the kept text. Without room for the marker a bare prefix
/// (possibly empty) is returned. Text that already fits is returned unchanged.
/// The result never exceeds `target_tokens` as measured by `counter`.
#[must_use]
pub fn truncate_to_tokens(text: &str, target_tokens: usize, counter: &dyn TokenCounter) -> String {
    if counter.count(text) <= target_tokens {
        return text.to_string();
    }

    let with_marker =
        |end: usize| format!("{}{}", text[..end].trim_end(), COMPRESSION_TRUNCATION_MARKER);
    let fits = |candidate: &str| counter.count(candidate) <= target_tokens;

    let char_ends: Vec<usize> = text
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .collect();

    if let Some(n) = largest_fitting(char_ends.len(), |n| fits(&with_marker(char_ends[n - 1]))) {
        let cut = char_ends[n - 1];
        let at_boundary = text[cut..].starts_with(char::is_whitespace);
        if !at_boundary {
            if let Some(space) = text[..cut].rfind(char::is_whitespace) {
                let candidate = with_marker(space);
                if space > 0 && space >= cut / 2 && fits(&candidate) {
                    return candidate;
                }
            }
        }
        return with_marker(cut);
    }

    match largest_fitting(char_ends.len(), |n| fits(&text[..char_ends[n - 1]])) {
        Some(n) => text[..char_ends[n - 1]].to_string(),
        None => String::new(),
    }
}

/// Largest `i` in `1..=n` with `fits(i)`, assuming `fits` is monotone
/// decreasing (true then false).
fn largest_fitting(n: usize, fits: impl Fn(usize) -> bool) -> Option<usize> {
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    (lo > 0).then_some(lo)
}

// =============================================================================
// Tests
// =============================================================================
