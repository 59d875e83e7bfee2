//! Importance scoring.
//!
//! `TigerStyle`: Deterministic scoring from turn fields and an explicit
//! `now_ms`. The scorer never fails; malformed input yields the neutral
//! score together with a [`ScorerFallback`] describing why.
//!
//! The score is a weighted average of four signals, each in [0, 1]:
//!
//! - role: per-role baseline (system > user > assistant by default)
//! - recency: `0.5^(age / halflife)` where age is time since last access
//! - content: length sweet spot, question mark, intent keywords
//! - frequency: `ln(1 + accesses) / ln(1 + saturation)`, capped at 1

use serde::{Deserialize, Serialize};

use crate::constants::{
    IMPORTANCE_MAX, IMPORTANCE_MIN, IMPORTANCE_NEUTRAL, SCORING_DECAY_HALFLIFE_MS_DEFAULT,
    SCORING_FREQUENCY_SATURATION_COUNT, SCORING_INTENT_KEYWORDS_COUNT_MAX,
    SCORING_KEYWORD_SHARE_DEFAULT, SCORING_LENGTH_SHARE_DEFAULT, SCORING_LENGTH_SWEET_TOKENS_MAX,
    SCORING_LENGTH_SWEET_TOKENS_MIN, SCORING_QUESTION_SHARE_DEFAULT, SCORING_ROLE_ASSISTANT_DEFAULT,
    SCORING_ROLE_SYSTEM_DEFAULT, SCORING_ROLE_USER_DEFAULT, SCORING_WEIGHT_CONTENT_DEFAULT,
    SCORING_WEIGHT_FREQUENCY_DEFAULT, SCORING_WEIGHT_RECENCY_DEFAULT, SCORING_WEIGHT_ROLE_DEFAULT,
};
use crate::error::ConfigError;
use crate::turn::{Role, Turn, TurnId};

// =============================================================================
// Configuration
// =============================================================================

/// Baseline importance per role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleWeights {
    /// System turns
    pub system: f64,
    /// User turns
    pub user: f64,
    /// Assistant turns
    pub assistant: f64,
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self {
            system: SCORING_ROLE_SYSTEM_DEFAULT,
            user: SCORING_ROLE_USER_DEFAULT,
            assistant: SCORING_ROLE_ASSISTANT_DEFAULT,
        }
    }
}

impl RoleWeights {
    /// Baseline for `role`.
    #[must_use]
    pub fn for_role(&self, role: Role) -> f64 {
        match role {
            Role::System => self.system,
            Role::User => self.user,
            Role::Assistant => self.assistant,
        }
    }
}

/// Scoring parameters. Every weight is configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Per-role baselines.
    ///
    /// Default: system 1.0, user 0.6, assistant 0.4
    pub roles: RoleWeights,

    /// Weight of the role signal. Default: 0.3
    pub weight_role: f64,

    /// Weight of the recency signal. Default: 0.3
    pub weight_recency: f64,

    /// Weight of the content signal. Default: 0.2
    pub weight_content: f64,

    /// Weight of the access frequency signal. Default: 0.2
    pub weight_frequency: f64,

    /// Recency half-life in milliseconds. Default: 10 minutes
    pub decay_halflife_ms: u64,

    /// Lower edge of the length sweet spot. Default: 10 tokens
    pub length_sweet_min_tokens: usize,

    /// Upper edge of the length sweet spot. Default: 200 tokens
    pub length_sweet_max_tokens: usize,

    /// Share of the content signal from length. Default: 0.5
    pub length_share: f64,

    /// Share of the content signal from a question mark. Default: 0.25
    pub question_share: f64,

    /// Share of the content signal from intent keywords. Default: 0.25
    pub keyword_share: f64,

    /// Access count at which frequency saturates. Default: 10
    pub frequency_saturation_count: u64,

    /// Case-insensitive keywords that mark a turn as carrying intent.
    pub intent_keywords: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            roles: RoleWeights::default(),
            weight_role: SCORING_WEIGHT_ROLE_DEFAULT,
            weight_recency: SCORING_WEIGHT_RECENCY_DEFAULT,
            weight_content: SCORING_WEIGHT_CONTENT_DEFAULT,
            weight_frequency: SCORING_WEIGHT_FREQUENCY_DEFAULT,
            decay_halflife_ms: SCORING_DECAY_HALFLIFE_MS_DEFAULT,
            length_sweet_min_tokens: SCORING_LENGTH_SWEET_TOKENS_MIN,
            length_sweet_max_tokens: SCORING_LENGTH_SWEET_TOKENS_MAX,
            length_share: SCORING_LENGTH_SHARE_DEFAULT,
            question_share: SCORING_QUESTION_SHARE_DEFAULT,
            keyword_share: SCORING_KEYWORD_SHARE_DEFAULT,
            frequency_saturation_count: SCORING_FREQUENCY_SATURATION_COUNT,
            intent_keywords: Vec::new(),
        }
    }
}

impl ScoringConfig {
    /// Set the four signal weights (role, recency, content, frequency).
    #[must_use]
    pub fn with_signal_weights(mut self, role: f64, recency: f64, content: f64, frequency: f64) -> Self {
        self.weight_role = role;
        self.weight_recency = recency;
        self.weight_content = content;
        self.weight_frequency = frequency;
        self
    }

    /// Set per-role baselines.
    #[must_use]
    pub fn with_roles(mut self, roles: RoleWeights) -> Self {
        self.roles = roles;
        self
    }

    /// Set the recency half-life.
    #[must_use]
    pub fn with_decay_halflife_ms(mut self, ms: u64) -> Self {
        self.decay_halflife_ms = ms;
        self
    }

    /// Set the intent keywords.
    #[must_use]
    pub fn with_intent_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intent_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Validate ranges and weight groups.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("roles.system", self.roles.system),
            ("roles.user", self.roles.user),
            ("roles.assistant", self.roles.assistant),
        ] {
            if !(IMPORTANCE_MIN..=IMPORTANCE_MAX).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: IMPORTANCE_MIN,
                    max: IMPORTANCE_MAX,
                });
            }
        }

        check_weight_group(
            "signal",
            &[
                ("weight_role", self.weight_role),
                ("weight_recency", self.weight_recency),
                ("weight_content", self.weight_content),
                ("weight_frequency", self.weight_frequency),
            ],
        )?;
        check_weight_group(
            "content",
            &[
                ("length_share", self.length_share),
                ("question_share", self.question_share),
                ("keyword_share", self.keyword_share),
            ],
        )?;

        if self.decay_halflife_ms == 0 {
            return Err(ConfigError::TooSmall {
                field: "decay_halflife_ms",
                value: 0,
                min: 1,
            });
        }
        if self.frequency_saturation_count == 0 {
            return Err(ConfigError::TooSmall {
                field: "frequency_saturation_count",
                value: 0,
                min: 1,
            });
        }
        if self.length_sweet_min_tokens > self.length_sweet_max_tokens {
            return Err(ConfigError::InvertedSweetSpot {
                min: self.length_sweet_min_tokens,
                max: self.length_sweet_max_tokens,
            });
        }
        if self.intent_keywords.len() > SCORING_INTENT_KEYWORDS_COUNT_MAX {
            return Err(ConfigError::TooLarge {
                field: "intent_keywords",
                value: self.intent_keywords.len() as u64,
                max: SCORING_INTENT_KEYWORDS_COUNT_MAX as u64,
            });
        }
        Ok(())
    }
}

fn check_weight_group(group: &'static str, weights: &[(&'static str, f64)]) -> Result<(), ConfigError> {
    for &(field, value) in weights {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::InvalidWeight { field, value });
        }
    }
    if weights.iter().all(|&(_, value)| value == 0.0) {
        return Err(ConfigError::ZeroWeights { group });
    }
    Ok(())
}

// =============================================================================
// Scores
// =============================================================================

/// Inputs shared by every score in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreContext {
    /// Current clock time
    pub now_ms: u64,
    /// Number of turns in the working set being scored
    pub working_set_size: usize,
}

impl ScoreContext {
    /// Create a context.
    #[must_use]
    pub fn new(now_ms: u64, working_set_size: usize) -> Self {
        Self {
            now_ms,
            working_set_size,
        }
    }
}

/// Why the neutral score was used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScorerFallback {
    /// Turn claims an access after `now`
    AccessedInFuture {
        /// Recorded access time
        last_accessed_ms: u64,
        /// Scoring time
        now_ms: u64,
    },
    /// Turn claims a creation time after `now`
    CreatedInFuture {
        /// Recorded creation time
        created_at_ms: u64,
        /// Scoring time
        now_ms: u64,
    },
    /// Context says the working set is empty while scoring a member of it
    EmptyWorkingSet,
    /// Weighted sum was NaN or infinite
    NonFinite,
}

/// A score and, if it is the neutral default, the reason.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceScore {
    /// Score in [0, 1]
    pub value: f64,
    /// Set when the neutral default replaced the computed value
    pub fallback: Option<ScorerFallback>,
}

impl ImportanceScore {
    fn computed(value: f64) -> Self {
        Self {
            value,
            fallback: None,
        }
    }

    fn neutral(reason: ScorerFallback) -> Self {
        Self {
            value: IMPORTANCE_NEUTRAL,
            fallback: Some(reason),
        }
    }
}

// =============================================================================
// Scorer
// =============================================================================

/// Weighted multi-signal importance scorer.
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    config: ScoringConfig,
    keywords: Vec<String>,
    weight_total: f64,
    share_total: f64,
}

impl ImportanceScorer {
    /// Create a scorer.
    ///
    /// # Panics
    /// Panics if the configuration does not validate.
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid scoring config: {err}");
        }

        let keywords = config
            .intent_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let weight_total = config.weight_role
            + config.weight_recency
            + config.weight_content
            + config.weight_frequency;
        let share_total = config.length_share + config.question_share + config.keyword_share;

        Self {
            config,
            keywords,
            weight_total,
            share_total,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a turn. Never fails.
    ///
    /// Pinned turns score 1.0 without evaluating signals. A cached score taken
    /// at `ctx.now_ms` is reused.
    #[must_use]
    pub fn score(&self, turn: &Turn, ctx: ScoreContext) -> ImportanceScore {
        if turn.is_pinned() {
            return ImportanceScore::computed(IMPORTANCE_MAX);
        }
        if let Some(value) = turn.cached_importance(ctx.now_ms) {
            return ImportanceScore::computed(value);
        }

        if ctx.working_set_size == 0 {
            return ImportanceScore::neutral(ScorerFallback::EmptyWorkingSet);
        }
        if turn.created_at_ms() > ctx.now_ms {
            return ImportanceScore::neutral(ScorerFallback::CreatedInFuture {
                created_at_ms: turn.created_at_ms(),
                now_ms: ctx.now_ms,
            });
        }
        if turn.last_accessed_ms() > ctx.now_ms {
            return ImportanceScore::neutral(ScorerFallback::AccessedInFuture {
                last_accessed_ms: turn.last_accessed_ms(),
                now_ms: ctx.now_ms,
            });
        }

        let age_ms = ctx.now_ms - turn.last_accessed_ms();
        let weighted = self.config.weight_role * self.config.roles.for_role(turn.role())
            + self.config.weight_recency * self.recency(age_ms)
            + self.config.weight_content * self.content(turn)
            + self.config.weight_frequency * self.frequency(turn.access_count());
        let value = weighted / self.weight_total;

        if !value.is_finite() {
            return ImportanceScore::neutral(ScorerFallback::NonFinite);
        }

        let value = value.clamp(IMPORTANCE_MIN, IMPORTANCE_MAX);

        // Postcondition
        assert!(
            (IMPORTANCE_MIN..=IMPORTANCE_MAX).contains(&value),
            "score {value} outside [0, 1]"
        );
        ImportanceScore::computed(value)
    }

    /// Score every turn and cache the results on them.
    ///
    /// Returns the turns that fell back to the neutral score.
    pub fn refresh(&self, turns: &mut [Turn], now_ms: u64) -> Vec<(TurnId, ScorerFallback)> {
        let ctx = ScoreContext::new(now_ms, turns.len());
        let mut fallbacks = Vec::new();
        for turn in turns.iter_mut() {
            let score = self.score(turn, ctx);
            if let Some(reason) = score.fallback {
                fallbacks.push((turn.id(), reason));
            }
            turn.cache_importance(score.value, now_ms);
        }
        fallbacks
    }

    /// Recency signal: `0.5^(age / halflife)`.
    #[must_use]
    pub fn recency(&self, age_ms: u64) -> f64 {
        let halflives = age_ms as f64 / self.config.decay_halflife_ms as f64;
        0.5_f64.powf(halflives)
    }

    /// Frequency signal with logarithmic diminishing returns.
    #[must_use]
    pub fn frequency(&self, access_count: u64) -> f64 {
        let saturation = self.config.frequency_saturation_count as f64;
        ((access_count as f64).ln_1p() / saturation.ln_1p()).min(1.0)
    }

    /// Length signal: 1 inside the sweet spot, falling off on both sides.
    #[must_use]
    pub fn length(&self, tokens: usize) -> f64 {
        let min = self.config.length_sweet_min_tokens;
        let max = self.config.length_sweet_max_tokens;
        if tokens < min {
            tokens as f64 / min as f64
        } else if tokens > max {
            max as f64 / tokens as f64
        } else {
            1.0
        }
    }

    /// Content signal combining length, question mark and intent keywords.
    #[must_use]
    pub fn content(&self, turn: &Turn) -> f64 {
        let text = turn.content();
        let question = if text.contains('?') { 1.0 } else { 0.0 };
        let keyword = if self.has_intent_keyword(text) { 1.0 } else { 0.0 };

        let combined = self.config.length_share * self.length(turn.token_count())
            + self.config.question_share * question
            + self.config.keyword_share * keyword;
        combined / self.share_total
    }

    fn has_intent_keyword(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

impl Default for ImportanceScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TIME_MS_PER_HOUR;
    use crate::token::CharRatioCounter;
    use crate::turn::TurnOptions;

    fn turn(role: Role, content: &str, now_ms: u64) -> Turn {
        Turn::new(role, content, &CharRatioCounter::default(), now_ms, 0)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_role_ordering() {
        let scorer = ImportanceScorer::default();
        let ctx = ScoreContext::new(0, 3);
        let text = "a reasonably sized message for scoring purposes here";

        let system = scorer.score(&turn(Role::System, text, 0), ctx).value;
        let user = scorer.score(&turn(Role::User, text, 0), ctx).value;
        let assistant = scorer.score(&turn(Role::Assistant, text, 0), ctx).value;

        assert!(system > user);
        assert!(user > assistant);
    }

    #[test]
    fn test_fresh_long_user_turn() {
        let scorer = ImportanceScorer::default();
        let long = turn(Role::User, &"word ".repeat(400), 0);
        assert_eq!(long.token_count(), 500);

        let score = scorer.score(&long, ScoreContext::new(0, 1));

        // 0.3*0.6 + 0.3*1.0 + 0.2*(0.5*200/500) + 0.2*0
        assert!(close(score.value, 0.52), "got {}", score.value);
        assert!(score.fallback.is_none());
    }

    #[test]
    fn test_recency_decay() {
        let scorer = ImportanceScorer::default();
        let halflife = scorer.config().decay_halflife_ms;

        assert!(close(scorer.recency(0), 1.0));
        assert!(close(scorer.recency(halflife), 0.5));
        assert!(close(scorer.recency(2 * halflife), 0.25));
    }

    #[test]
    fn test_aged_assistant_turn_scores_low() {
        let scorer = ImportanceScorer::default();
        let t = turn(Role::Assistant, &"x".repeat(400), 0);
        let score = scorer.score(&t, ScoreContext::new(TIME_MS_PER_HOUR, 5)).value;

        assert!(score < 0.4, "got {score}");
        assert!(score > 0.2, "got {score}");
    }

    #[test]
    fn test_length_sweet_spot() {
        let scorer = ImportanceScorer::default();
        assert!(close(scorer.length(0), 0.0));
        assert!(close(scorer.length(5), 0.5));
        assert!(close(scorer.length(10), 1.0));
        assert!(close(scorer.length(200), 1.0));
        assert!(close(scorer.length(400), 0.5));
    }

    #[test]
    fn test_question_and_keywords_raise_content() {
        let scorer = ImportanceScorer::new(
            ScoringConfig::default().with_intent_keywords(["Deadline", "  "]),
        );
        let plain = turn(Role::User, "we should talk about the project plan", 0);
        let question = turn(Role::User, "should we talk about the project plan?", 0);
        let keyword = turn(Role::User, "the project DEADLINE is friday, noted", 0);

        assert!(scorer.content(&question) > scorer.content(&plain));
        assert!(scorer.content(&keyword) > scorer.content(&plain));
    }

    #[test]
    fn test_frequency_saturates() {
        let scorer = ImportanceScorer::default();
        assert!(close(scorer.frequency(0), 0.0));
        assert!(scorer.frequency(3) < scorer.frequency(5));
        assert!(close(scorer.frequency(10), 1.0));
        assert!(close(scorer.frequency(1_000), 1.0));
    }

    #[test]
    fn test_pinned_scores_max() {
        let scorer = ImportanceScorer::default();
        let t = turn(Role::Assistant, "ok", 0).with_options(TurnOptions::pinned());
        let score = scorer.score(&t, ScoreContext::new(10 * TIME_MS_PER_HOUR, 1));
        assert!(close(score.value, 1.0));
    }

    #[test]
    fn test_future_access_falls_back() {
        let scorer = ImportanceScorer::default();
        let mut t = turn(Role::User, "hello there", 0);
        t.set_last_accessed_ms(5_000);

        let score = scorer.score(&t, ScoreContext::new(1_000, 1));

        assert!(close(score.value, IMPORTANCE_NEUTRAL));
        assert_eq!(
            score.fallback,
            Some(ScorerFallback::AccessedInFuture {
                last_accessed_ms: 5_000,
                now_ms: 1_000
            })
        );
    }

    #[test]
    fn test_future_creation_and_empty_set_fall_back() {
        let scorer = ImportanceScorer::default();
        let t = turn(Role::User, "hello there", 9_000);

        let future = scorer.score(&t, ScoreContext::new(1_000, 1));
        assert!(matches!(future.fallback, Some(ScorerFallback::CreatedInFuture { .. })));

        let empty = scorer.score(&t, ScoreContext::new(9_000, 0));
        assert_eq!(empty.fallback, Some(ScorerFallback::EmptyWorkingSet));
    }

    #[test]
    fn test_refresh_caches_scores() {
        let scorer = ImportanceScorer::default();
        let mut turns = vec![turn(Role::User, "first", 0), turn(Role::Assistant, "second", 0)];

        let fallbacks = scorer.refresh(&mut turns, 100);

        assert!(fallbacks.is_empty());
        for t in &turns {
            let cached = t.cached_importance(100).expect("score cached");
            assert!(close(cached, scorer.score(t, ScoreContext::new(100, 2)).value));
        }
    }

    #[test]
    fn test_zero_weights_rejected() {
        let config = ScoringConfig::default().with_signal_weights(0.0, 0.0, 0.0, 0.0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroWeights { group: "signal" })
        );
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(ScoringConfig::default()
            .with_signal_weights(f64::NAN, 0.3, 0.2, 0.2)
            .validate()
            .is_err());
        assert!(ScoringConfig::default()
            .with_decay_halflife_ms(0)
            .validate()
            .is_err());

        let mut inverted = ScoringConfig::default();
        inverted.length_sweet_min_tokens = 300;
        assert_eq!(
            inverted.validate(),
            Err(ConfigError::InvertedSweetSpot { min: 300, max: 200 })
        );
    }

    #[test]
    #[should_panic(expected = "invalid scoring config")]
    fn test_scorer_rejects_invalid_config() {
        let _ = ImportanceScorer::new(ScoringConfig::default().with_decay_halflife_ms(0));
    }

    #[test]
    fn test_custom_role_baselines() {
        let assistant_first = ImportanceScorer::new(
            ScoringConfig::default()
                .with_signal_weights(1.0, 0.0, 0.0, 0.0)
                .with_roles(RoleWeights {
                    system: 0.5,
                    user: 0.2,
                    assistant: 0.9,
                }),
        );
        let ctx = ScoreContext::new(0, 2);

        let user = assistant_first.score(&turn(Role::User, "same text", 0), ctx).value;
        let assistant = assistant_first.score(&turn(Role::Assistant, "same text", 0), ctx).value;

        assert!(close(user, 0.2));
        assert!(close(assistant, 0.9));
    }

    #[test]
    fn test_custom_weights_change_ranking() {
        let recency_only = ImportanceScorer::new(
            ScoringConfig::default().with_signal_weights(0.0, 1.0, 0.0, 0.0),
        );
        let old_system = turn(Role::System, "old instructions", 0);
        let new_assistant = turn(Role::Assistant, "fresh reply", TIME_MS_PER_HOUR);
        let ctx = ScoreContext::new(TIME_MS_PER_HOUR, 2);

        assert!(recency_only.score(&new_assistant, ctx).value > recency_only.score(&old_system, ctx).value);
    }
}
