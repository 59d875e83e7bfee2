//! Error types.
//!
//! Only [`MemoryError`] crosses the public API. Summarizer failures are
//! absorbed by the compressor (see [`crate::summarizer::SummarizerError`]).

use thiserror::Error;

use crate::turn::TurnId;

/// Errors surfaced to the host agent.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MemoryError {
    /// Pinned content alone does not fit the usable budget.
    #[error(
        "budget exceeded: pinned turns need {pinned_tokens} tokens with ceiling \
         {ceiling} and reserve {reserve}; minimum ceiling is {required_ceiling}"
    )]
    BudgetExceeded {
        /// Smallest ceiling that would have allowed the operation
        required_ceiling: usize,
        /// Configured ceiling
        ceiling: usize,
        /// Configured reserve
        reserve: usize,
        /// Tokens held by pinned turns if the operation had gone through
        pinned_tokens: usize,
    },

    /// No turn with this id exists in the working set.
    #[error("turn not found: {id}")]
    TurnNotFound {
        /// Requested id
        id: TurnId,
    },

    /// Construction-time configuration problem.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl MemoryError {
    /// Create a `BudgetExceeded` error for the given pinned load.
    #[must_use]
    pub fn budget_exceeded(pinned_tokens: usize, ceiling: usize, reserve: usize) -> Self {
        Self::BudgetExceeded {
            required_ceiling: pinned_tokens.saturating_add(reserve),
            ceiling,
            reserve,
            pinned_tokens,
        }
    }

    /// Check if this is a budget error.
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }

    /// Minimum ceiling carried by a budget error.
    #[must_use]
    pub fn required_ceiling(&self) -> Option<usize> {
        match self {
            Self::BudgetExceeded {
                required_ceiling, ..
            } => Some(*required_ceiling),
            _ => None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Reserve leaves no usable budget.
    #[error("reserve ({reserve}) must be less than ceiling ({ceiling})")]
    ReserveNotBelowCeiling {
        /// Configured reserve
        reserve: usize,
        /// Configured ceiling
        ceiling: usize,
    },

    /// Ceiling above the supported maximum.
    #[error("ceiling {value} exceeds maximum {max}")]
    CeilingTooLarge {
        /// Configured ceiling
        value: usize,
        /// Maximum
        max: usize,
    },

    /// A fractional parameter outside its range.
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        /// Field name
        field: &'static str,
        /// Configured value
        value: f64,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// A weight that is negative or not finite.
    #[error("{field} must be finite and non-negative, got {value}")]
    InvalidWeight {
        /// Field name
        field: &'static str,
        /// Configured value
        value: f64,
    },

    /// Every weight in a group is zero.
    #[error("{group} weights must not all be zero")]
    ZeroWeights {
        /// Weight group name
        group: &'static str,
    },

    /// An integer parameter below its minimum.
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        /// Field name
        field: &'static str,
        /// Configured value
        value: u64,
        /// Minimum
        min: u64,
    },

    /// An integer parameter above its maximum.
    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        /// Field name
        field: &'static str,
        /// Configured value
        value: u64,
        /// Maximum
        max: u64,
    },

    /// Length sweet spot bounds are inverted.
    #[error("length sweet spot min ({min}) exceeds max ({max})")]
    InvertedSweetSpot {
        /// Lower edge
        min: usize,
        /// Upper edge
        max: usize,
    },

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exceeded_carries_required_ceiling() {
        let err = MemoryError::budget_exceeded(80, 200, 150);

        assert!(err.is_budget_exceeded());
        assert_eq!(err.required_ceiling(), Some(230));
        let msg = err.to_string();
        assert!(msg.contains("80 tokens"));
        assert!(msg.contains("reserve 150"));
        assert!(msg.contains("minimum ceiling is 230"));
    }

    #[test]
    fn test_turn_not_found_is_not_budget() {
        let err = MemoryError::TurnNotFound { id: TurnId::new() };
        assert!(!err.is_budget_exceeded());
        assert_eq!(err.required_ceiling(), None);
    }

    #[test]
    fn test_config_error_converts() {
        let err: MemoryError = ConfigError::ZeroWeights { group: "signal" }.into();
        assert!(matches!(err, MemoryError::InvalidConfig(_)));
        assert!(err.to_string().contains("signal weights"));
    }
}
