//! Remediation planning.
//!
//! `TigerStyle`: Pinned turns are never candidates, selection is deterministic
//! (score, then creation order), and every plan is checked against the
//! reduction it promises before it is returned.
//!
//! An [`EvictionPolicy`] turns "free N tokens" into an ordered list of
//! [`RemediationAction`]s. It does not touch the working set; the manager
//! executes the plan on a staged copy.

use std::cmp::Ordering;
use std::fmt::Debug;

use crate::config::MemoryConfig;
use crate::constants::{
    REMEDIATION_COMPRESSED_TOKENS_MIN, REMEDIATION_COMPRESSION_RATIO_DEFAULT,
    REMEDIATION_COMPRESSION_THRESHOLD_DEFAULT, REMEDIATION_SUMMARIZE_BATCH_COUNT_MIN,
    REMEDIATION_SUMMARY_RATIO_DEFAULT, REMEDIATION_SUMMARY_TOKENS_MAX,
};
use crate::scoring::{ImportanceScorer, ScoreContext, ScorerFallback};
use crate::turn::{Turn, TurnId};

// =============================================================================
// Plans
// =============================================================================

/// One step of a remediation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationAction {
    /// Remove the turn.
    Evict {
        /// Turn to remove
        id: TurnId,
    },
    /// Shrink the turn to at most `target_tokens`.
    Compress {
        /// Turn to compress
        id: TurnId,
        /// Token target for the compressed content
        target_tokens: usize,
    },
    /// Replace adjacent turns with one summary turn.
    Summarize {
        /// Merged turns, chronological
        ids: Vec<TurnId>,
        /// Token target for the summary
        target_tokens: usize,
    },
}

impl RemediationAction {
    /// Turns touched by this action.
    #[must_use]
    pub fn turn_ids(&self) -> &[TurnId] {
        match self {
            Self::Evict { id } | Self::Compress { id, .. } => std::slice::from_ref(id),
            Self::Summarize { ids, .. } => ids,
        }
    }
}

/// Ordered actions that free at least the requested tokens when executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemediationPlan {
    /// Actions in execution order
    pub actions: Vec<RemediationAction>,
    /// Tokens the plan frees if every target is met
    pub estimated_reduction: usize,
    /// Turns scored with the neutral fallback while planning
    pub scorer_fallbacks: Vec<(TurnId, ScorerFallback)>,
}

impl RemediationPlan {
    /// Check if the plan does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Check if any action touches `id`.
    #[must_use]
    pub fn touches(&self, id: TurnId) -> bool {
        self.actions.iter().any(|a| a.turn_ids().contains(&id))
    }
}

/// Policy outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Remediation {
    /// A plan that meets the requested reduction
    Plan(RemediationPlan),
    /// Non-pinned turns cannot free enough tokens
    Infeasible {
        /// Tokens requested
        required_reduction: usize,
        /// Tokens freed by evicting every non-pinned turn
        achievable_reduction: usize,
    },
}

// =============================================================================
// Policy trait
// =============================================================================

/// Chooses remediation for an over-budget working set.
pub trait EvictionPolicy: Send + Sync + Debug {
    /// Plan actions that free at least `required_reduction` tokens.
    ///
    /// # Postconditions
    /// - `required_reduction == 0` yields an empty plan
    /// - No pinned turn appears in any action
    fn select_remediation(
        &self,
        turns: &[Turn],
        required_reduction: usize,
        scorer: &ImportanceScorer,
        ctx: ScoreContext,
    ) -> Remediation;

    /// Pick the turns to include in a context of at most `target_tokens`.
    ///
    /// Non-destructive. Pinned turns are always included. Returns indices into
    /// `turns` in ascending order.
    fn select_context(
        &self,
        turns: &[Turn],
        target_tokens: usize,
        scorer: &ImportanceScorer,
        ctx: ScoreContext,
    ) -> Vec<usize> {
        let mut used: usize = turns
            .iter()
            .filter(|t| t.is_pinned())
            .map(Turn::token_count)
            .sum();
        let mut keep: Vec<usize> = (0..turns.len()).filter(|&i| turns[i].is_pinned()).collect();

        let mut ranked: Vec<(usize, f64)> = turns
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_pinned())
            .map(|(i, t)| (i, scorer.score(t, ctx).value))
            .collect();
        // Most important first, newer first on ties
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| turns[b.0].order_key().cmp(&turns[a.0].order_key()))
        });

        for (index, _) in ranked {
            let tokens = turns[index].token_count();
            if used + tokens <= target_tokens {
                used += tokens;
                keep.push(index);
            }
        }

        keep.sort_unstable();
        keep
    }

    /// Policy name for logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// ScoredEvictionPolicy
// =============================================================================

/// Importance-driven policy: evict the least important, compress the
/// moderately important, summarize runs of adjacent unimportant turns.
#[derive(Debug, Clone)]
pub struct ScoredEvictionPolicy {
    compression_threshold: f64,
    compression_ratio: f64,
    compressed_tokens_min: usize,
    summarize_batch_min: usize,
    summary_ratio: f64,
    summary_tokens_max: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    id: TurnId,
    tokens: usize,
    score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanMode {
    Full,
    NoSummaries,
    EvictOnly,
}

impl Default for ScoredEvictionPolicy {
    fn default() -> Self {
        Self {
            compression_threshold: REMEDIATION_COMPRESSION_THRESHOLD_DEFAULT,
            compression_ratio: REMEDIATION_COMPRESSION_RATIO_DEFAULT,
            compressed_tokens_min: REMEDIATION_COMPRESSED_TOKENS_MIN,
            summarize_batch_min: REMEDIATION_SUMMARIZE_BATCH_COUNT_MIN,
            summary_ratio: REMEDIATION_SUMMARY_RATIO_DEFAULT,
            summary_tokens_max: REMEDIATION_SUMMARY_TOKENS_MAX,
        }
    }
}

impl ScoredEvictionPolicy {
    /// Policy with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy using the remediation settings of a validated config.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            compression_threshold: config.compression_threshold,
            compression_ratio: config.compression_ratio,
            compressed_tokens_min: config.compressed_tokens_min,
            summarize_batch_min: config.summarize_batch_min,
            summary_ratio: config.summary_ratio,
            summary_tokens_max: config.summary_tokens_max,
        }
    }

    /// Set the importance above which turns are compressed.
    ///
    /// # Panics
    /// Panics if threshold is outside [0, 1].
    #[must_use]
    pub fn with_compression_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "compression_threshold must be in [0, 1], got {threshold}"
        );
        self.compression_threshold = threshold;
        self
    }

    /// Set the adjacent-run length that triggers summarization.
    ///
    /// # Panics
    /// Panics if batch_min is below 2.
    #[must_use]
    pub fn with_summarize_batch_min(mut self, batch_min: usize) -> Self {
        assert!(batch_min >= 2, "summarize_batch_min must be >= 2, got {batch_min}");
        self.summarize_batch_min = batch_min;
        self
    }

    fn compress_target(&self, tokens: usize, remaining: usize) -> Option<usize> {
        let by_ratio = (tokens as f64 * self.compression_ratio).floor() as usize;
        let target = tokens.saturating_sub(remaining).min(by_ratio);
        (target >= self.compressed_tokens_min && target < tokens).then_some(target)
    }

    fn summary_target(&self, merged_tokens: usize) -> Option<usize> {
        let target = ((merged_tokens as f64 * self.summary_ratio).floor() as usize)
            .min(self.summary_tokens_max);
        (target >= self.compressed_tokens_min && target < merged_tokens).then_some(target)
    }

    /// Build actions for the selected candidates (in selection order).
    ///
    /// Returns the actions and the tokens they free.
    fn build_plan(
        &self,
        selected: &[Candidate],
        required: usize,
        mode: PlanMode,
    ) -> (Vec<RemediationAction>, usize) {
        let mut slots: Vec<Option<RemediationAction>> = Vec::with_capacity(selected.len());
        let mut low: Vec<usize> = Vec::new();
        let mut freed = 0usize;

        for (pos, c) in selected.iter().enumerate() {
            let compress = if mode != PlanMode::EvictOnly && c.score > self.compression_threshold {
                self.compress_target(c.tokens, required.saturating_sub(freed))
            } else {
                None
            };

            match compress {
                Some(target_tokens) => {
                    freed += c.tokens - target_tokens;
                    slots.push(Some(RemediationAction::Compress {
                        id: c.id,
                        target_tokens,
                    }));
                }
                None => {
                    freed += c.tokens;
                    if c.score <= self.compression_threshold {
                        low.push(pos);
                    }
                    slots.push(Some(RemediationAction::Evict { id: c.id }));
                }
            }
        }

        if mode == PlanMode::Full && low.len() >= self.summarize_batch_min {
            low.sort_by_key(|&pos| selected[pos].index);

            let mut run_start = 0;
            for end in 1..=low.len() {
                let run_continues = end < low.len()
                    && selected[low[end]].index == selected[low[end - 1]].index + 1;
                if run_continues {
                    continue;
                }

                let run = &low[run_start..end];
                run_start = end;
                if run.len() < self.summarize_batch_min {
                    continue;
                }

                let merged_tokens: usize = run.iter().map(|&pos| selected[pos].tokens).sum();
                let Some(target_tokens) = self.summary_target(merged_tokens) else {
                    continue;
                };

                let ids = run.iter().map(|&pos| selected[pos].id).collect();
                let first_pos = run.iter().copied().min().unwrap_or(run[0]);
                for &pos in run {
                    slots[pos] = None;
                }
                slots[first_pos] = Some(RemediationAction::Summarize { ids, target_tokens });
                freed -= target_tokens;
            }
        }

        (slots.into_iter().flatten().collect(), freed)
    }
}

impl EvictionPolicy for ScoredEvictionPolicy {
    fn select_remediation(
        &self,
        turns: &[Turn],
        required_reduction: usize,
        scorer: &ImportanceScorer,
        ctx: ScoreContext,
    ) -> Remediation {
        if required_reduction == 0 {
            return Remediation::Plan(RemediationPlan::default());
        }

        let mut scorer_fallbacks = Vec::new();
        let mut candidates: Vec<Candidate> = turns
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_pinned())
            .map(|(index, t)| {
                let score = scorer.score(t, ctx);
                if let Some(reason) = score.fallback {
                    scorer_fallbacks.push((t.id(), reason));
                }
                Candidate {
                    index,
                    id: t.id(),
                    tokens: t.token_count(),
                    score: score.value,
                }
            })
            .collect();

        // Least important first, oldest first on ties
        candidates.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| turns[a.index].order_key().cmp(&turns[b.index].order_key()))
        });

        let achievable_reduction: usize = candidates.iter().map(|c| c.tokens).sum();
        if achievable_reduction < required_reduction {
            return Remediation::Infeasible {
                required_reduction,
                achievable_reduction,
            };
        }

        for mode in [PlanMode::Full, PlanMode::NoSummaries, PlanMode::EvictOnly] {
            for n in 1..=candidates.len() {
                let (actions, freed) = self.build_plan(&candidates[..n], required_reduction, mode);
                if freed >= required_reduction {
                    let plan = RemediationPlan {
                        actions,
                        estimated_reduction: freed,
                        scorer_fallbacks,
                    };

                    // Postcondition
                    assert!(
                        turns.iter().filter(|t| t.is_pinned()).all(|t| !plan.touches(t.id())),
                        "plan must not touch pinned turns"
                    );
                    return Remediation::Plan(plan);
                }
            }
        }

        // Evicting every candidate frees `achievable_reduction`, checked above
        Remediation::Infeasible {
            required_reduction,
            achievable_reduction,
        }
    }

    fn name(&self) -> &'static str {
        "scored"
    }
}

// =============================================================================
// OldestFirstEvictionPolicy
// =============================================================================

/// Sliding window: evict the oldest non-pinned turns, never compress.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestFirstEvictionPolicy;

impl EvictionPolicy for OldestFirstEvictionPolicy {
    fn select_remediation(
        &self,
        turns: &[Turn],
        required_reduction: usize,
        _scorer: &ImportanceScorer,
        _ctx: ScoreContext,
    ) -> Remediation {
        if required_reduction == 0 {
            return Remediation::Plan(RemediationPlan::default());
        }

        let mut candidates: Vec<&Turn> = turns.iter().filter(|t| !t.is_pinned()).collect();
        candidates.sort_by_key(|t| t.order_key());

        let mut actions = Vec::new();
        let mut freed = 0usize;
        for turn in candidates {
            if freed >= required_reduction {
                break;
            }
            freed += turn.token_count();
            actions.push(RemediationAction::Evict { id: turn.id() });
        }

        if freed < required_reduction {
            return Remediation::Infeasible {
                required_reduction,
                achievable_reduction: freed,
            };
        }

        Remediation::Plan(RemediationPlan {
            actions,
            estimated_reduction: freed,
            scorer_fallbacks: Vec::new(),
        })
    }

    fn select_context(
        &self,
        turns: &[Turn],
        target_tokens: usize,
        _scorer: &ImportanceScorer,
        _ctx: ScoreContext,
    ) -> Vec<usize> {
        let mut used: usize = turns
            .iter()
            .filter(|t| t.is_pinned())
            .map(Turn::token_count)
            .sum();
        let mut keep: Vec<usize> = (0..turns.len()).filter(|&i| turns[i].is_pinned()).collect();

        let mut newest_first: Vec<usize> = (0..turns.len()).filter(|&i| !turns[i].is_pinned()).collect();
        newest_first.sort_by_key(|&i| std::cmp::Reverse(turns[i].order_key()));

        for index in newest_first {
            let tokens = turns[index].token_count();
            if used + tokens > target_tokens {
                break;
            }
            used += tokens;
            keep.push(index);
        }

        keep.sort_unstable();
        keep
    }

    fn name(&self) -> &'static str {
        "oldest_first"
    }
}

// =============================================================================
// Tests
// =============================================================================
