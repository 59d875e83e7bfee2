//! Turn - one unit of conversational content.
//!
//! `TigerStyle`: `content` and `token_count` change together or not at all.
//! The only mutator is [`Turn::replace_content`], which recounts.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dst::ms_to_datetime;
use crate::token::TokenCounter;

// =============================================================================
// Identity and enums
// =============================================================================

/// Opaque, immutable turn identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for TurnId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System prompt or synthetic summary
    System,
    /// End user
    User,
    /// Model response
    Assistant,
}

impl Role {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether content is verbatim or derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Verbatim as appended
    #[default]
    Original,
    /// Shortened by the compressor
    Compressed,
    /// Synthetic turn replacing several merged turns
    Summary,
}

/// Caller-supplied options for `append`.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// Never evict or compress this turn
    pub pinned: bool,
    /// Free-form caller metadata, carried unchanged
    pub metadata: HashMap<String, String>,
}

impl TurnOptions {
    /// Options for a pinned turn.
    #[must_use]
    pub fn pinned() -> Self {
        Self {
            pinned: true,
            ..Self::default()
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Importance score cached at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CachedImportance {
    /// Score in [0, 1]
    pub value: f64,
    /// Clock time the score was computed at
    pub scored_at_ms: u64,
}

// =============================================================================
// Turn
// =============================================================================

/// One message in the working set.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: String,
    token_count: usize,
    created_at_ms: u64,
    seq: u64,
    last_accessed_ms: u64,
    access_count: u64,
    #[serde(skip)]
    importance: Option<CachedImportance>,
    pinned: bool,
    provenance: Provenance,
    metadata: HashMap<String, String>,
}

impl Turn {
    /// Create an original turn, counting its tokens with `counter`.
    ///
    /// `seq` breaks ties between turns created in the same millisecond.
    #[must_use]
    pub fn new(
        role: Role,
        content: impl Into<String>,
        counter: &dyn TokenCounter,
        now_ms: u64,
        seq: u64,
    ) -> Self {
        let content = content.into();
        let token_count = counter.count(&content);
        Self {
            id: TurnId::new(),
            role,
            content,
            token_count,
            created_at_ms: now_ms,
            seq,
            last_accessed_ms: now_ms,
            access_count: 0,
            importance: None,
            pinned: false,
            provenance: Provenance::Original,
            metadata: HashMap::new(),
        }
    }

    /// Apply append options.
    #[must_use]
    pub fn with_options(mut self, options: TurnOptions) -> Self {
        self.pinned = options.pinned;
        self.metadata = options.metadata;
        self
    }

    /// Create a synthetic summary turn standing in for `merged`.
    ///
    /// It takes the position of the earliest merged turn and the strongest
    /// access history among them.
    ///
    /// # Panics
    /// Panics if `merged` is empty.
    #[must_use]
    pub fn summary_of(merged: &[Turn], content: String, counter: &dyn TokenCounter) -> Self {
        assert!(!merged.is_empty(), "summary needs at least one turn");

        let first = merged
            .iter()
            .min_by_key(|t| (t.created_at_ms, t.seq))
            .unwrap_or(&merged[0]);
        let last_accessed_ms = merged.iter().map(|t| t.last_accessed_ms).max().unwrap_or(0);
        let access_count = merged.iter().map(|t| t.access_count).max().unwrap_or(0);
        let token_count = counter.count(&content);

        Self {
            id: TurnId::new(),
            role: Role::System,
            content,
            token_count,
            created_at_ms: first.created_at_ms,
            seq: first.seq,
            last_accessed_ms,
            access_count,
            importance: None,
            pinned: false,
            provenance: Provenance::Summary,
            metadata: HashMap::new(),
        }
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> TurnId {
        self.id
    }

    /// Role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Text payload.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Token cost of `content`.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Creation time (ms).
    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.created_at_ms)
    }

    /// Insertion sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Chronological sort key.
    #[must_use]
    pub fn order_key(&self) -> (u64, u64) {
        (self.created_at_ms, self.seq)
    }

    /// Last time this turn was returned in a context (ms).
    #[must_use]
    pub fn last_accessed_ms(&self) -> u64 {
        self.last_accessed_ms
    }

    /// Last access time.
    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.last_accessed_ms)
    }

    /// Number of context assemblies this turn was part of.
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Whether the turn is protected from remediation.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Content origin.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Caller metadata.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Cached importance, if it was computed at exactly `now_ms`.
    ///
    /// Any clock movement invalidates the cache.
    #[must_use]
    pub fn cached_importance(&self, now_ms: u64) -> Option<f64> {
        self.importance
            .filter(|cached| cached.scored_at_ms == now_ms)
            .map(|cached| cached.value)
    }

    /// Raw cache entry.
    #[must_use]
    pub fn importance_cache(&self) -> Option<CachedImportance> {
        self.importance
    }

    pub(crate) fn cache_importance(&mut self, value: f64, now_ms: u64) {
        debug_assert!((0.0..=1.0).contains(&value), "importance out of range");
        self.importance = Some(CachedImportance {
            value,
            scored_at_ms: now_ms,
        });
    }

    /// Replace content and recount tokens in one step.
    pub(crate) fn replace_content(
        &mut self,
        content: String,
        provenance: Provenance,
        counter: &dyn TokenCounter,
    ) {
        self.token_count = counter.count(&content);
        self.content = content;
        self.provenance = provenance;
        self.importance = None;
    }

    /// Record inclusion in an assembled context.
    pub(crate) fn record_access(&mut self, now_ms: u64) {
        self.last_accessed_ms = self.last_accessed_ms.max(now_ms);
        self.access_count = self.access_count.saturating_add(1);
        self.importance = None;
    }

    pub(crate) fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
        self.importance = None;
    }

    #[cfg(test)]
    pub(crate) fn set_last_accessed_ms(&mut self, ms: u64) {
        self.last_accessed_ms = ms;
        self.importance = None;
    }
}
