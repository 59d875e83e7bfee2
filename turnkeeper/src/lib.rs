//! # Turnkeeper
//!
//! Token-bounded conversational memory for AI agents, with deterministic
//! simulation testing.
//!
//! A [`MemoryManager`] owns the turns of one conversation and keeps their
//! token total under a configured ceiling minus a reserve. When an append
//! pushes the total over, the manager scores every turn for importance and
//! evicts, compresses or merges the least valuable ones. Pinned turns are
//! never touched.
//!
//! ## Quick Start
//!
//! ```rust
//! use turnkeeper::{MemoryConfig, MemoryManager, Role, TurnOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut memory = MemoryManager::new(MemoryConfig::new().with_budget(4096, 512))?;
//!
//! memory
//!     .append(Role::System, "You are a booking assistant.", TurnOptions::pinned())
//!     .await?;
//! memory
//!     .append(Role::User, "Book a table for two at eight.", TurnOptions::default())
//!     .await?;
//!
//! let context = memory.get_context(None)?;
//! assert_eq!(context.len(), 2);
//! assert!(memory.total_tokens() <= memory.budget_tokens());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      MemoryManager                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  TokenCounter  │ ImportanceScorer │ EvictionPolicy        │
//! ├──────────────────────────────────────────────────────────┤
//! │  Compressor ──► Summarizer (optional, deadline-bounded)   │
//! │            └──► truncation fallback                       │
//! ├──────────────────────────────────────────────────────────┤
//! │  MemoryObserver           │ tracing by default            │
//! ├──────────────────────────────────────────────────────────┤
//! │  DST Framework            │ SimClock, faults, properties  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Simulation-First
//!
//! Time comes from a [`SimClock`] and the bundled [`SimSummarizer`] is
//! deterministic per seed, so every remediation decision replays exactly:
//!
//! ```rust
//! use turnkeeper::dst::{SimConfig, Simulation};
//! use turnkeeper::{MemoryConfig, Role, TurnOptions};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sim = Simulation::new(SimConfig::from_env_or(42)).with_summarizer_faults(0.2);
//!
//! sim.run(|mut env| async move {
//!     let config = MemoryConfig::new()
//!         .with_budget(600, 100)
//!         .with_summarizer_deadline_ms(20);
//!     let mut memory = env.create_manager(config)?;
//!     for _ in 0..20 {
//!         memory.append(Role::User, "status update ".repeat(20), TurnOptions::default()).await?;
//!         env.advance_time_ms(60_000);
//!     }
//!     assert!(memory.total_tokens() <= memory.budget_tokens());
//!     Ok::<_, turnkeeper::MemoryError>(())
//! })
//! .await
//! .unwrap();
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod compression;
pub mod config;
pub mod constants;
pub mod dst;
pub mod error;
pub mod eviction;
pub mod manager;
pub mod observer;
pub mod scoring;
pub mod summarizer;
pub mod telemetry;
pub mod token;
pub mod turn;

// Re-export common types
pub use constants::*;
pub use dst::{
    test_seeds, DeterministicRng, FaultConfig, FaultInjector, FaultType, PropertyTest,
    PropertyTestFailure, PropertyTestResult, PropertyTestable, SimClock, SimConfig,
    SimEnvironment, Simulation, TimeAdvanceConfig,
};

pub use config::MemoryConfig;
pub use error::{ConfigError, MemoryError, MemoryResult};
pub use token::{CharRatioCounter, TokenCounter, WordCounter};
pub use turn::{Provenance, Role, Turn, TurnId, TurnOptions};

// Scoring and policy
pub use eviction::{
    EvictionPolicy, OldestFirstEvictionPolicy, Remediation, RemediationAction, RemediationPlan,
    ScoredEvictionPolicy,
};
pub use scoring::{
    ImportanceScore, ImportanceScorer, RoleWeights, ScoreContext, ScorerFallback, ScoringConfig,
};

// Compression
pub use compression::{truncate_to_tokens, CompressionDegraded, Compressor};
pub use summarizer::{SimSummarizer, Summarizer, SummarizerError};

// Manager (main API)
pub use manager::{
    AppendResult, ConsolidationRecord, ConsolidationStrategy, Diagnostics, MemoryManager,
    MemoryManagerBuilder, SharedMemoryManager,
};
pub use observer::{MemoryObserver, NoopObserver, TracingObserver};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
