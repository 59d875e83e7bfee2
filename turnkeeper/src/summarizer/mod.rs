//! Summarizer - pluggable condensation capability.
//!
//! `TigerStyle`: Simulation-first. [`SimSummarizer`] is the default for tests
//! and development; hosts plug a model-backed implementation in through the
//! [`Summarizer`] trait.
//!
//! The memory manager makes exactly one attempt per remediation action and
//! treats every failure as a reason to fall back to truncation. No retries.

mod sim;

pub use sim::SimSummarizer;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::turn::Turn;

// =============================================================================
// Error Types
// =============================================================================

/// Summarizer failure modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummarizerError {
    /// No answer before the deadline
    #[error("summarizer timed out after {deadline_ms}ms")]
    Timeout {
        /// Deadline that elapsed
        deadline_ms: u64,
    },

    /// Backend unavailable
    #[error("summarizer unavailable: {message}")]
    Unavailable {
        /// Reason reported by the backend
        message: String,
    },

    /// Backend returned no text
    #[error("summarizer returned an empty result")]
    EmptyResult,

    /// Backend returned more tokens than allowed
    #[error("summary has {tokens} tokens, limit was {max_tokens}")]
    Oversized {
        /// Tokens in the returned text
        tokens: usize,
        /// Requested limit
        max_tokens: usize,
    },

    /// Any other backend failure
    #[error("summarizer failed: {message}")]
    Failed {
        /// Failure description
        message: String,
    },
}

impl SummarizerError {
    /// Create a timeout error.
    #[must_use]
    pub fn timeout(deadline: Duration) -> Self {
        Self::Timeout {
            deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a generic failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Check if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// =============================================================================
// Summarizer Trait
// =============================================================================

/// Condenses turns into shorter text.
///
/// Implementations should respect `max_tokens` and `deadline`, but callers
/// verify both: an oversized answer is rejected and the call is wrapped in a
/// timeout.
#[async_trait]
pub trait Summarizer: Send + Sync + Debug {
    /// Summarize `turns` (one turn for compression, several for a merge).
    ///
    /// # Errors
    /// Any [`SummarizerError`]; the caller falls back to truncation.
    async fn summarize(
        &self,
        turns: &[Turn],
        max_tokens: usize,
        deadline: Duration,
    ) -> Result<String, SummarizerError>;

    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Check if this is a simulation implementation.
    fn is_simulation(&self) -> bool {
        false
    }
}
