//! Memory manager configuration.
//!
//! Loaded once at construction. Every field has a default, so a JSON document
//! only needs the values it changes:
//!
//! ```rust
//! use turnkeeper::MemoryConfig;
//!
//! let config = MemoryConfig::from_json_str(r#"{ "ceiling_tokens": 4096, "reserve_tokens": 512 }"#)
//!     .unwrap();
//! assert_eq!(config.budget_tokens(), 3584);
//! assert_eq!(config.summarize_batch_min, 3);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BUDGET_CEILING_TOKENS_DEFAULT, BUDGET_CEILING_TOKENS_MAX, BUDGET_RESERVE_TOKENS_DEFAULT,
    CONSOLIDATION_LOG_COUNT_DEFAULT, CONSOLIDATION_LOG_COUNT_MAX,
    REMEDIATION_COMPRESSED_TOKENS_MIN, REMEDIATION_COMPRESSION_RATIO_DEFAULT,
    REMEDIATION_COMPRESSION_THRESHOLD_DEFAULT, REMEDIATION_SUMMARIZE_BATCH_COUNT_MIN,
    REMEDIATION_SUMMARY_RATIO_DEFAULT, REMEDIATION_SUMMARY_TOKENS_MAX,
    SUMMARIZER_DEADLINE_MS_DEFAULT, SUMMARIZER_DEADLINE_MS_MAX,
};
use crate::error::ConfigError;
use crate::scoring::ScoringConfig;

/// Configuration for a [`crate::MemoryManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum tokens the working set may occupy.
    ///
    /// Default: 8192
    pub ceiling_tokens: usize,

    /// Tokens kept free for the model response.
    ///
    /// Default: 1024
    pub reserve_tokens: usize,

    /// Importance above which turns are compressed instead of evicted.
    ///
    /// Default: 0.4
    pub compression_threshold: f64,

    /// Compressed turns keep at most this fraction of their tokens.
    ///
    /// Default: 0.5
    pub compression_ratio: f64,

    /// Compression targets below this evict instead.
    ///
    /// Default: 8
    pub compressed_tokens_min: usize,

    /// Adjacent low-importance turns needed to summarize them together.
    ///
    /// Default: 3
    pub summarize_batch_min: usize,

    /// Summaries keep at most this fraction of the merged tokens.
    ///
    /// Default: 0.25
    pub summary_ratio: f64,

    /// Hard cap on one summary.
    ///
    /// Default: 512
    pub summary_tokens_max: usize,

    /// Deadline for one summarizer call.
    ///
    /// Default: 5000 ms
    pub summarizer_deadline_ms: u64,

    /// Consolidation records kept for diagnostics.
    ///
    /// Default: 64
    pub consolidation_log_max: usize,

    /// Importance scoring parameters.
    pub scoring: ScoringConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ceiling_tokens: BUDGET_CEILING_TOKENS_DEFAULT,
            reserve_tokens: BUDGET_RESERVE_TOKENS_DEFAULT,
            compression_threshold: REMEDIATION_COMPRESSION_THRESHOLD_DEFAULT,
            compression_ratio: REMEDIATION_COMPRESSION_RATIO_DEFAULT,
            compressed_tokens_min: REMEDIATION_COMPRESSED_TOKENS_MIN,
            summarize_batch_min: REMEDIATION_SUMMARIZE_BATCH_COUNT_MIN,
            summary_ratio: REMEDIATION_SUMMARY_RATIO_DEFAULT,
            summary_tokens_max: REMEDIATION_SUMMARY_TOKENS_MAX,
            summarizer_deadline_ms: SUMMARIZER_DEADLINE_MS_DEFAULT,
            consolidation_log_max: CONSOLIDATION_LOG_COUNT_DEFAULT,
            scoring: ScoringConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `Parse` for malformed JSON or the first validation error.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    /// Returns `Parse` if the file cannot be read, otherwise as [`Self::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Set ceiling and reserve.
    #[must_use]
    pub fn with_budget(mut self, ceiling_tokens: usize, reserve_tokens: usize) -> Self {
        self.ceiling_tokens = ceiling_tokens;
        self.reserve_tokens = reserve_tokens;
        self
    }

    /// Set the compression threshold.
    #[must_use]
    pub fn with_compression_threshold(mut self, threshold: f64) -> Self {
        self.compression_threshold = threshold;
        self
    }

    /// Set the summarize batch threshold.
    #[must_use]
    pub fn with_summarize_batch_min(mut self, batch_min: usize) -> Self {
        self.summarize_batch_min = batch_min;
        self
    }

    /// Set the summarizer deadline.
    #[must_use]
    pub fn with_summarizer_deadline_ms(mut self, ms: u64) -> Self {
        self.summarizer_deadline_ms = ms;
        self
    }

    /// Set the diagnostics log size.
    #[must_use]
    pub fn with_consolidation_log_max(mut self, max: usize) -> Self {
        self.consolidation_log_max = max;
        self
    }

    /// Set scoring parameters.
    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Usable budget: ceiling minus reserve.
    #[must_use]
    pub fn budget_tokens(&self) -> usize {
        self.ceiling_tokens.saturating_sub(self.reserve_tokens)
    }

    /// Summarizer deadline as a `Duration`.
    #[must_use]
    pub fn summarizer_deadline(&self) -> Duration {
        Duration::from_millis(self.summarizer_deadline_ms)
    }

    /// Validate every field.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ceiling_tokens > BUDGET_CEILING_TOKENS_MAX {
            return Err(ConfigError::CeilingTooLarge {
                value: self.ceiling_tokens,
                max: BUDGET_CEILING_TOKENS_MAX,
            });
        }
        if self.reserve_tokens >= self.ceiling_tokens {
            return Err(ConfigError::ReserveNotBelowCeiling {
                reserve: self.reserve_tokens,
                ceiling: self.ceiling_tokens,
            });
        }

        check_fraction("compression_threshold", self.compression_threshold, true)?;
        check_fraction("compression_ratio", self.compression_ratio, false)?;
        check_fraction("summary_ratio", self.summary_ratio, false)?;

        check_min("compressed_tokens_min", self.compressed_tokens_min as u64, 1)?;
        check_min("summarize_batch_min", self.summarize_batch_min as u64, 2)?;
        check_min("summary_tokens_max", self.summary_tokens_max as u64, 1)?;
        check_min("summarizer_deadline_ms", self.summarizer_deadline_ms, 1)?;
        check_min("consolidation_log_max", self.consolidation_log_max as u64, 1)?;

        if self.summarizer_deadline_ms > SUMMARIZER_DEADLINE_MS_MAX {
            return Err(ConfigError::TooLarge {
                field: "summarizer_deadline_ms",
                value: self.summarizer_deadline_ms,
                max: SUMMARIZER_DEADLINE_MS_MAX,
            });
        }
        if self.consolidation_log_max > CONSOLIDATION_LOG_COUNT_MAX {
            return Err(ConfigError::TooLarge {
                field: "consolidation_log_max",
                value: self.consolidation_log_max as u64,
                max: CONSOLIDATION_LOG_COUNT_MAX as u64,
            });
        }

        self.scoring.validate()
    }
}

/// Check `value` is in [0, 1] (`inclusive`) or (0, 1) otherwise.
fn check_fraction(field: &'static str, value: f64, inclusive: bool) -> Result<(), ConfigError> {
    let ok = if inclusive {
        (0.0..=1.0).contains(&value)
    } else {
        value > 0.0 && value < 1.0
    };
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

fn check_min(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::TooSmall { field, value, min });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MemoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.budget_tokens(), 8192 - 1024);
        assert_eq!(config.summarizer_deadline(), Duration::from_secs(5));
    }

    #[test]
    fn test_builder_methods() {
        let config = MemoryConfig::new()
            .with_budget(1000, 100)
            .with_compression_threshold(0.6)
            .with_summarize_batch_min(4)
            .with_summarizer_deadline_ms(250)
            .with_consolidation_log_max(8);

        assert_eq!(config.budget_tokens(), 900);
        assert!((config.compression_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.summarize_batch_min, 4);
        assert_eq!(config.summarizer_deadline_ms, 250);
        assert_eq!(config.consolidation_log_max, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reserve_must_be_below_ceiling() {
        let config = MemoryConfig::new().with_budget(100, 100);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReserveNotBelowCeiling {
                reserve: 100,
                ceiling: 100
            })
        );
    }

    #[test]
    fn test_ratios_exclusive() {
        let mut config = MemoryConfig::new();
        config.compression_ratio = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "compression_ratio",
                ..
            })
        ));
    }

    #[test]
    fn test_batch_min_at_least_two() {
        let config = MemoryConfig::new().with_summarize_batch_min(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooSmall {
                field: "summarize_batch_min",
                ..
            })
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_values() {
        let config = MemoryConfig::new().with_budget(2048, 256);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(MemoryConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_json_partial_and_invalid() {
        let config = MemoryConfig::from_json_str(
            r#"{ "scoring": { "intent_keywords": ["refund"], "decay_halflife_ms": 1000 } }"#,
        )
        .unwrap();
        assert_eq!(config.scoring.intent_keywords, vec!["refund".to_string()]);
        assert_eq!(config.scoring.decay_halflife_ms, 1000);
        assert_eq!(config.ceiling_tokens, BUDGET_CEILING_TOKENS_DEFAULT);

        assert!(matches!(
            MemoryConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(MemoryConfig::from_json_str(r#"{ "reserve_tokens": 9000 }"#).is_err());
    }
}
