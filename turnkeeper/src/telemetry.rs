//! Tracing setup for hosts and examples.
//!
//! `TigerStyle`: Never panics. A second initialization returns an error
//! instead of replacing the installed subscriber.
//!
//! ```rust,no_run
//! use turnkeeper::telemetry::{init_tracing, TelemetryConfig};
//!
//! init_tracing(TelemetryConfig::default().with_filter("turnkeeper=debug")).ok();
//! ```

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const TELEMETRY_FILTER_DEFAULT: &str = "turnkeeper=info";

/// Tracing setup errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The filter directive did not parse
    #[error("invalid filter directive {directive:?}: {reason}")]
    InvalidFilter {
        /// Offending directive
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("tracing already initialized: {reason}")]
    AlreadyInitialized {
        /// Message from the subscriber registry
        reason: String,
    },
}

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Colored output
    pub ansi: bool,
    /// Print event targets
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: TELEMETRY_FILTER_DEFAULT.to_string(),
            ansi: true,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Set the fallback filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enable or disable colored output.
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Build the filter: `RUST_LOG` if set, else the configured directive.
    ///
    /// # Errors
    /// Returns `InvalidFilter` if the configured directive does not parse.
    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.filter).map_err(|e| TelemetryError::InvalidFilter {
            directive: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install a global fmt subscriber.
///
/// # Errors
/// Returns `InvalidFilter` for a bad directive and `AlreadyInitialized` if a
/// global subscriber exists.
pub fn init_tracing(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(config.with_target)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized {
            reason: e.to_string(),
        })
}
