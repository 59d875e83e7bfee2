//! Observer seam for logging and metrics.
//!
//! The manager reports what it did through a [`MemoryObserver`] after each
//! operation commits. Observers are write-only sinks: nothing they do feeds
//! back into memory decisions.

use std::fmt::Debug;

use tracing::{debug, warn};

use crate::compression::CompressionDegraded;
use crate::manager::ConsolidationRecord;
use crate::scoring::ScorerFallback;
use crate::turn::TurnId;

/// Receives consolidation and degradation events.
///
/// All methods default to doing nothing.
pub trait MemoryObserver: Send + Sync + Debug {
    /// A remediation action was committed.
    fn on_consolidation(&self, _record: &ConsolidationRecord) {}

    /// A turn was scored with the neutral fallback.
    fn on_scorer_fallback(&self, _turn_id: TurnId, _reason: &ScorerFallback) {}

    /// Compression or summarization fell back to truncation.
    fn on_compression_degraded(&self, _turn_ids: &[TurnId], _reason: &CompressionDegraded) {}
}

/// Emits every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MemoryObserver for TracingObserver {
    fn on_consolidation(&self, record: &ConsolidationRecord) {
        debug!(
            strategy = record.strategy.as_str(),
            tokens_before = record.tokens_before,
            tokens_after = record.tokens_after,
            turns_affected = record.turns_affected,
            "consolidation"
        );
    }

    fn on_scorer_fallback(&self, turn_id: TurnId, reason: &ScorerFallback) {
        warn!(%turn_id, ?reason, "importance scoring fell back to neutral");
    }

    fn on_compression_degraded(&self, turn_ids: &[TurnId], reason: &CompressionDegraded) {
        warn!(turns = turn_ids.len(), %reason, "compression degraded to truncation");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MemoryObserver for NoopObserver {}
