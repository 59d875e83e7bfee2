//! MemoryManager - token-bounded working set.
//!
//! `TigerStyle`: The ceiling is checked after every mutation, mutations run on
//! a staged copy that is committed only on success, and every remediation
//! step leaves a [`ConsolidationRecord`].
//!
//! # Flow
//!
//! ```text
//! append ─► count tokens ─► stage copy ─► over budget? ─► policy plan ─► execute
//!                                              │                            │
//!                                              └──── within budget ◄────────┘
//!                                                        │
//!                                                     commit
//! ```

mod builder;
mod shared;

pub use builder::MemoryManagerBuilder;
pub use shared::SharedMemoryManager;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compression::{CompressionDegraded, Compressor};
use crate::config::MemoryConfig;
use crate::constants::REMEDIATION_ROUNDS_COUNT_MAX;
use crate::dst::SimClock;
use crate::error::{MemoryError, MemoryResult};
use crate::eviction::{EvictionPolicy, Remediation, RemediationAction, RemediationPlan};
use crate::observer::MemoryObserver;
use crate::scoring::{ImportanceScorer, ScoreContext, ScorerFallback};
use crate::token::TokenCounter;
use crate::turn::{Role, Turn, TurnId, TurnOptions};

// =============================================================================
// Records and results
// =============================================================================

/// Which remediation strategy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStrategy {
    /// Turn removed
    Evict,
    /// Turn shrunk by the summarizer
    Compress,
    /// Turns merged by the summarizer
    Summarize,
    /// Compression or merge fell back to truncation
    TruncateFallback,
}

impl ConsolidationStrategy {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evict => "evict",
            Self::Compress => "compress",
            Self::Summarize => "summarize",
            Self::TruncateFallback => "truncate_fallback",
        }
    }
}

/// Audit entry for one executed remediation action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidationRecord {
    /// Strategy used
    pub strategy: ConsolidationStrategy,
    /// Working-set tokens before the action
    pub tokens_before: usize,
    /// Working-set tokens after the action
    pub tokens_after: usize,
    /// Number of turns removed, shrunk or merged
    pub turns_affected: usize,
    /// Ids of those turns
    pub turn_ids: Vec<TurnId>,
    /// Clock time of the action
    pub at_ms: u64,
    /// Why truncation was used, for `TruncateFallback`
    #[serde(skip)]
    pub degraded: Option<CompressionDegraded>,
}

impl ConsolidationRecord {
    /// Tokens freed by the action.
    #[must_use]
    pub fn tokens_freed(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// Outcome of [`MemoryManager::append`].
#[derive(Debug, Clone)]
pub struct AppendResult {
    /// Id assigned to the appended turn
    pub id: TurnId,
    /// The turn as stored after remediation; `None` if it was evicted or merged
    pub turn: Option<Turn>,
    /// Remediation performed by this append, in execution order
    pub records: Vec<ConsolidationRecord>,
}

impl AppendResult {
    /// Check if the appended turn is still in the working set.
    #[must_use]
    pub fn turn_retained(&self) -> bool {
        self.turn.is_some()
    }

    /// Check if remediation ran.
    #[must_use]
    pub fn remediated(&self) -> bool {
        !self.records.is_empty()
    }
}

/// Read-only snapshot from [`MemoryManager::diagnostics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Tokens in the working set
    pub total_tokens: usize,
    /// Turns in the working set
    pub turn_count: usize,
    /// Tokens held by pinned turns
    pub pinned_tokens: usize,
    /// Ceiling minus reserve
    pub budget_tokens: usize,
    /// Most recent consolidation records, oldest first
    pub recent_consolidations: Vec<ConsolidationRecord>,
}

/// Events gathered while staging, delivered to the observer on commit.
#[derive(Debug, Default)]
struct StagedEvents {
    records: Vec<ConsolidationRecord>,
    fallbacks: Vec<(TurnId, ScorerFallback)>,
}

// =============================================================================
// MemoryManager
// =============================================================================

/// Owns one session's working set and keeps it under budget.
///
/// Not internally synchronized: mutations take `&mut self`. Wrap in a
/// [`SharedMemoryManager`] to share across tasks.
#[derive(Debug)]
pub struct MemoryManager {
    config: MemoryConfig,
    clock: SimClock,
    counter: Arc<dyn TokenCounter>,
    scorer: ImportanceScorer,
    policy: Arc<dyn EvictionPolicy>,
    compressor: Compressor,
    observer: Arc<dyn MemoryObserver>,
    turns: Vec<Turn>,
    log: VecDeque<ConsolidationRecord>,
    next_seq: u64,
}

impl MemoryManager {
    /// Start a builder.
    #[must_use]
    pub fn builder() -> MemoryManagerBuilder {
        MemoryManagerBuilder::new()
    }

    /// Create a manager with default components.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` does not validate.
    pub fn new(config: MemoryConfig) -> MemoryResult<Self> {
        MemoryManagerBuilder::new().with_config(config).build()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a turn, remediating if the budget is exceeded.
    ///
    /// # Errors
    /// Returns `BudgetExceeded` if pinned content cannot fit; the working set
    /// is then unchanged.
    #[tracing::instrument(skip(self, content, options), fields(role = %role, pinned = options.pinned))]
    pub async fn append(
        &mut self,
        role: Role,
        content: impl Into<String>,
        options: TurnOptions,
    ) -> MemoryResult<AppendResult> {
        let now_ms = self.clock.now_ms();
        let turn = Turn::new(role, content, self.counter.as_ref(), now_ms, self.next_seq)
            .with_options(options);
        let id = turn.id();

        if turn.is_pinned() {
            self.check_pinned_fits(self.pinned_tokens() + turn.token_count())?;
        }

        let mut staged = self.turns.clone();
        staged.push(turn);
        let events = self.remediate(&mut staged, now_ms).await?;

        self.next_seq += 1;
        self.commit(staged, events.fallbacks, &events.records);

        let turn = self.get(id).cloned();
        info!(
            %id,
            retained = turn.is_some(),
            total_tokens = self.total_tokens(),
            actions = events.records.len(),
            "turn appended"
        );

        Ok(AppendResult {
            id,
            turn,
            records: events.records,
        })
    }

    /// Mark a turn non-evictable.
    ///
    /// # Errors
    /// `TurnNotFound` for unknown ids; `BudgetExceeded` if pinned content
    /// would exceed the budget (the flag is then unchanged).
    pub fn pin(&mut self, id: TurnId) -> MemoryResult<()> {
        let pos = self.position(id)?;
        if self.turns[pos].is_pinned() {
            return Ok(());
        }

        self.check_pinned_fits(self.pinned_tokens() + self.turns[pos].token_count())?;
        self.turns[pos].set_pinned(true);
        debug!(%id, pinned_tokens = self.pinned_tokens(), "turn pinned");
        Ok(())
    }

    /// Clear the pinned flag.
    ///
    /// # Errors
    /// `TurnNotFound` for unknown ids.
    pub fn unpin(&mut self, id: TurnId) -> MemoryResult<()> {
        let pos = self.position(id)?;
        self.turns[pos].set_pinned(false);
        debug!(%id, "turn unpinned");
        Ok(())
    }

    /// Remove a turn, pinned or not.
    ///
    /// # Errors
    /// `TurnNotFound` for unknown ids.
    pub fn remove(&mut self, id: TurnId) -> MemoryResult<Turn> {
        let pos = self.position(id)?;
        Ok(self.turns.remove(pos))
    }

    /// Drop every non-pinned turn. Returns how many were dropped.
    pub fn clear_unpinned(&mut self) -> usize {
        let before = self.turns.len();
        self.turns.retain(Turn::is_pinned);
        before - self.turns.len()
    }

    // =========================================================================
    // Context assembly
    // =========================================================================

    /// Assemble context in chronological order.
    ///
    /// Without a target the whole working set is returned. With a smaller
    /// target the policy picks the best-fitting subset; the working set is
    /// not changed. Every returned turn is marked as accessed.
    ///
    /// # Errors
    /// `BudgetExceeded` if pinned turns alone exceed `target_tokens`.
    #[tracing::instrument(skip(self))]
    pub fn get_context(&mut self, target_tokens: Option<usize>) -> MemoryResult<Vec<Turn>> {
        let now_ms = self.clock.now_ms();
        let total = self.total_tokens();

        let selected: Vec<usize> = match target_tokens {
            Some(target) if target < total => {
                let pinned = self.pinned_tokens();
                if pinned > target {
                    return Err(MemoryError::budget_exceeded(
                        pinned,
                        self.config.ceiling_tokens,
                        self.config.reserve_tokens,
                    ));
                }

                let fallbacks = self.scorer.refresh(&mut self.turns, now_ms);
                self.report_fallbacks(&fallbacks);
                let ctx = ScoreContext::new(now_ms, self.turns.len());
                let picked = self
                    .policy
                    .select_context(&self.turns, target, &self.scorer, ctx);
                self.fit_selection(picked, target)
            }
            _ => (0..self.turns.len()).collect(),
        };

        let mut context: Vec<Turn> = selected
            .into_iter()
            .filter_map(|i| {
                let turn = self.turns.get_mut(i)?;
                turn.record_access(now_ms);
                Some(turn.clone())
            })
            .collect();
        context.sort_by_key(Turn::order_key);

        // Postconditions
        let used: usize = context.iter().map(Turn::token_count).sum();
        assert!(
            target_tokens.map_or(true, |t| used <= t),
            "context of {used} tokens exceeds target {target_tokens:?}"
        );

        debug!(turns = context.len(), tokens = used, "context assembled");
        Ok(context)
    }

    /// Context rendered as `role: content` lines.
    ///
    /// # Errors
    /// As [`Self::get_context`].
    pub fn render_context(&mut self, target_tokens: Option<usize>) -> MemoryResult<String> {
        Ok(self
            .get_context(target_tokens)?
            .iter()
            .map(|t| format!("{}: {}", t.role(), t.content()))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    // =========================================================================
    // Read-only accessors
    // =========================================================================

    /// Snapshot of totals and recent consolidations.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            total_tokens: self.total_tokens(),
            turn_count: self.turns.len(),
            pinned_tokens: self.pinned_tokens(),
            budget_tokens: self.budget_tokens(),
            recent_consolidations: self.log.iter().cloned().collect(),
        }
    }

    /// Look up a turn.
    #[must_use]
    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id() == id)
    }

    /// Working set in chronological order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if the working set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Tokens in the working set.
    #[must_use]
    pub fn total_tokens(&self) -> usize {
        total_tokens(&self.turns)
    }

    /// Tokens held by pinned turns.
    #[must_use]
    pub fn pinned_tokens(&self) -> usize {
        pinned_tokens(&self.turns)
    }

    /// Usable budget (ceiling minus reserve).
    #[must_use]
    pub fn budget_tokens(&self) -> usize {
        self.config.budget_tokens()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Clock the manager reads.
    #[must_use]
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Token counter in use.
    #[must_use]
    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn position(&self, id: TurnId) -> MemoryResult<usize> {
        self.turns
            .iter()
            .position(|t| t.id() == id)
            .ok_or(MemoryError::TurnNotFound { id })
    }

    fn check_pinned_fits(&self, pinned_tokens: usize) -> MemoryResult<()> {
        if pinned_tokens > self.budget_tokens() {
            warn!(
                pinned_tokens,
                budget = self.budget_tokens(),
                "pinned content exceeds budget"
            );
            return Err(MemoryError::budget_exceeded(
                pinned_tokens,
                self.config.ceiling_tokens,
                self.config.reserve_tokens,
            ));
        }
        Ok(())
    }

    /// Clamp a policy's context selection to valid indices within `target`.
    ///
    /// Pinned turns are always kept. If the policy overshot, the newest of its
    /// other picks are kept while they fit.
    fn fit_selection(&self, mut picked: Vec<usize>, target: usize) -> Vec<usize> {
        picked.retain(|&i| i < self.turns.len());
        picked.sort_unstable();
        picked.dedup();

        let used: usize = picked.iter().map(|&i| self.turns[i].token_count()).sum();
        let pinned_missing = self
            .turns
            .iter()
            .enumerate()
            .any(|(i, t)| t.is_pinned() && picked.binary_search(&i).is_err());
        if used <= target && !pinned_missing {
            return picked;
        }

        warn!(
            policy = self.policy.name(),
            used,
            target,
            pinned_missing,
            "context selection violates target; trimming"
        );
        let mut room = target.saturating_sub(self.pinned_tokens());
        let mut kept: Vec<usize> = (0..self.turns.len())
            .filter(|&i| self.turns[i].is_pinned())
            .collect();
        for &i in picked.iter().rev() {
            let turn = &self.turns[i];
            if !turn.is_pinned() && turn.token_count() <= room {
                room -= turn.token_count();
                kept.push(i);
            }
        }
        kept.sort_unstable();
        kept
    }

    /// Bring `staged` under budget.
    async fn remediate(&self, staged: &mut Vec<Turn>, now_ms: u64) -> MemoryResult<StagedEvents> {
        let budget = self.budget_tokens();
        let mut events = StagedEvents::default();

        for round in 0..REMEDIATION_ROUNDS_COUNT_MAX {
            let total = total_tokens(staged);
            if total <= budget {
                break;
            }
            let required = total - budget;

            events.fallbacks.extend(self.scorer.refresh(staged, now_ms));
            let ctx = ScoreContext::new(now_ms, staged.len());
            match self
                .policy
                .select_remediation(staged, required, &self.scorer, ctx)
            {
                Remediation::Plan(plan) => {
                    debug!(
                        round,
                        required,
                        actions = plan.actions.len(),
                        policy = self.policy.name(),
                        "executing remediation plan"
                    );
                    self.execute(staged, plan, now_ms, &mut events).await;
                }
                Remediation::Infeasible {
                    required_reduction,
                    achievable_reduction,
                } => {
                    warn!(required_reduction, achievable_reduction, "remediation infeasible");
                    return Err(MemoryError::budget_exceeded(
                        pinned_tokens(staged),
                        self.config.ceiling_tokens,
                        self.config.reserve_tokens,
                    ));
                }
            }
        }

        self.sweep(staged, now_ms, &mut events);

        if pinned_tokens(staged) > budget || total_tokens(staged) > budget {
            return Err(MemoryError::budget_exceeded(
                pinned_tokens(staged),
                self.config.ceiling_tokens,
                self.config.reserve_tokens,
            ));
        }
        Ok(events)
    }

    /// Evict oldest non-pinned turns until `staged` fits.
    ///
    /// Only runs when plan execution missed its estimates.
    fn sweep(&self, staged: &mut Vec<Turn>, now_ms: u64, events: &mut StagedEvents) {
        let budget = self.budget_tokens();
        while total_tokens(staged) > budget {
            let Some(pos) = staged
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.is_pinned())
                .min_by_key(|(_, t)| t.order_key())
                .map(|(i, _)| i)
            else {
                return;
            };

            let before = total_tokens(staged);
            let evicted = staged.remove(pos);
            warn!(id = %evicted.id(), "sweep evicted turn after plan fell short");
            events.records.push(ConsolidationRecord {
                strategy: ConsolidationStrategy::Evict,
                tokens_before: before,
                tokens_after: total_tokens(staged),
                turns_affected: 1,
                turn_ids: vec![evicted.id()],
                at_ms: now_ms,
                degraded: None,
            });
        }
    }

    /// Apply a plan to `staged` in order.
    async fn execute(
        &self,
        staged: &mut Vec<Turn>,
        plan: RemediationPlan,
        now_ms: u64,
        events: &mut StagedEvents,
    ) {
        events.fallbacks.extend(plan.scorer_fallbacks);

        for action in plan.actions {
            if action
                .turn_ids()
                .iter()
                .any(|id| staged.iter().any(|t| t.id() == *id && t.is_pinned()))
            {
                warn!(?action, "skipping action on pinned turn");
                continue;
            }

            let tokens_before = total_tokens(staged);
            let record = match action {
                RemediationAction::Evict { id } => {
                    let Some(pos) = staged.iter().position(|t| t.id() == id) else {
                        continue;
                    };
                    staged.remove(pos);
                    ConsolidationRecord {
                        strategy: ConsolidationStrategy::Evict,
                        tokens_before,
                        tokens_after: total_tokens(staged),
                        turns_affected: 1,
                        turn_ids: vec![id],
                        at_ms: now_ms,
                        degraded: None,
                    }
                }
                RemediationAction::Compress { id, target_tokens } => {
                    let Some(pos) = staged.iter().position(|t| t.id() == id) else {
                        continue;
                    };
                    let outcome = self.compressor.compress(&staged[pos], target_tokens).await;
                    staged[pos] = outcome.turn;
                    ConsolidationRecord {
                        strategy: if outcome.degraded.is_some() {
                            ConsolidationStrategy::TruncateFallback
                        } else {
                            ConsolidationStrategy::Compress
                        },
                        tokens_before,
                        tokens_after: total_tokens(staged),
                        turns_affected: 1,
                        turn_ids: vec![id],
                        at_ms: now_ms,
                        degraded: outcome.degraded,
                    }
                }
                RemediationAction::Summarize { ids, target_tokens } => {
                    let mut positions: Vec<usize> = ids
                        .iter()
                        .filter_map(|id| staged.iter().position(|t| t.id() == *id))
                        .collect();
                    positions.sort_unstable();
                    let Some(&first) = positions.first() else {
                        continue;
                    };

                    let merged: Vec<Turn> = positions.iter().map(|&p| staged[p].clone()).collect();
                    let summary = self.compressor.summarize_batch(&merged, target_tokens).await;
                    for &p in positions.iter().rev() {
                        staged.remove(p);
                    }
                    staged.insert(first, summary.turn);

                    ConsolidationRecord {
                        strategy: if summary.degraded.is_some() {
                            ConsolidationStrategy::TruncateFallback
                        } else {
                            ConsolidationStrategy::Summarize
                        },
                        tokens_before,
                        tokens_after: total_tokens(staged),
                        turns_affected: merged.len(),
                        turn_ids: merged.iter().map(Turn::id).collect(),
                        at_ms: now_ms,
                        degraded: summary.degraded,
                    }
                }
            };
            events.records.push(record);
        }
    }

    /// Install a staged working set and deliver its events.
    fn commit(
        &mut self,
        staged: Vec<Turn>,
        fallbacks: Vec<(TurnId, ScorerFallback)>,
        records: &[ConsolidationRecord],
    ) {
        // Preconditions
        assert!(
            total_tokens(&staged) <= self.budget_tokens(),
            "staged working set over budget"
        );
        debug_assert!(
            staged
                .iter()
                .all(|t| t.token_count() == self.counter.count(t.content())),
            "stale token count"
        );
        debug_assert!(
            staged.windows(2).all(|w| w[0].order_key() <= w[1].order_key()),
            "working set out of order"
        );

        self.turns = staged;
        self.report_fallbacks(&fallbacks);

        for record in records {
            if let Some(reason) = &record.degraded {
                self.observer.on_compression_degraded(&record.turn_ids, reason);
            }
            self.observer.on_consolidation(record);

            if self.log.len() == self.config.consolidation_log_max {
                self.log.pop_front();
            }
            self.log.push_back(record.clone());
        }

        // Postcondition
        assert!(
            self.log.len() <= self.config.consolidation_log_max,
            "consolidation log over bound"
        );
    }

    fn report_fallbacks(&self, fallbacks: &[(TurnId, ScorerFallback)]) {
        for (id, reason) in fallbacks {
            self.observer.on_scorer_fallback(*id, reason);
        }
    }
}

fn total_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(Turn::token_count).sum()
}

fn pinned_tokens(turns: &[Turn]) -> usize {
    turns
        .iter()
        .filter(|t| t.is_pinned())
        .map(Turn::token_count)
        .sum()
}

// =============================================================================
// Tests
// =============================================================================
