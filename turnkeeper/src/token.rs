//! Token counting.
//!
//! Every token cost in the crate comes from one [`TokenCounter`]: the manager
//! counts appended content, the compressor checks its own output, and the
//! eviction policy reads the cached counts. Mixing counters would let the
//! ceiling drift, so the manager owns exactly one.

use std::fmt::Debug;

use crate::constants::{
    TOKEN_CHARS_PER_TOKEN_DEFAULT, TOKEN_WORD_RATIO_DENOMINATOR, TOKEN_WORD_RATIO_NUMERATOR,
};

/// Maps text to an approximate token cost.
///
/// Implementations must be deterministic and monotonic: appending text never
/// lowers the count. Empty text costs zero.
pub trait TokenCounter: Send + Sync + Debug {
    /// Count the tokens in `text`.
    fn count(&self, text: &str) -> usize;

    /// Name for logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// CharRatioCounter
// =============================================================================

/// Default counter: one token per `chars_per_token` characters, rounded up.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioCounter {
    chars_per_token: usize,
}

impl CharRatioCounter {
    /// Create a counter with a custom ratio.
    ///
    /// # Panics
    /// Panics if `chars_per_token` is zero.
    #[must_use]
    pub fn new(chars_per_token: usize) -> Self {
        assert!(chars_per_token > 0, "chars_per_token must be positive");
        Self { chars_per_token }
    }

    /// Characters per token.
    #[must_use]
    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }
}

impl Default for CharRatioCounter {
    fn default() -> Self {
        Self::new(TOKEN_CHARS_PER_TOKEN_DEFAULT)
    }
}

impl TokenCounter for CharRatioCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    fn name(&self) -> &'static str {
        "char_ratio"
    }
}

// =============================================================================
// WordCounter
// =============================================================================

/// Whitespace word count scaled by 4/3, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words * TOKEN_WORD_RATIO_NUMERATOR).div_ceil(TOKEN_WORD_RATIO_DENOMINATOR)
    }

    fn name(&self) -> &'static str {
        "word"
    }
}
