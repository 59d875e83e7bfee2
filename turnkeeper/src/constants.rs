//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `BUDGET_CEILING_TOKENS_DEFAULT` (not `DEFAULT_CEILING`)
//!
//! Every constant includes units in the name:
//! - _`TOKENS_MAX/MIN/DEFAULT` for token quantities
//! - _`MS_DEFAULT` for time durations
//! - _`COUNT_MAX` for quantity limits

// =============================================================================
// Token Budget
// =============================================================================

/// Default ceiling for the working set (tokens)
pub const BUDGET_CEILING_TOKENS_DEFAULT: usize = 8192;

/// Default reserve left free for the model response (tokens)
pub const BUDGET_RESERVE_TOKENS_DEFAULT: usize = 1024;

/// Largest ceiling a manager accepts (tokens)
pub const BUDGET_CEILING_TOKENS_MAX: usize = 10_000_000;

// =============================================================================
// Token Counting
// =============================================================================

/// Characters per token for the default heuristic counter
pub const TOKEN_CHARS_PER_TOKEN_DEFAULT: usize = 4;

/// Numerator of the words-to-tokens ratio for `WordCounter` (4/3 tokens per word)
pub const TOKEN_WORD_RATIO_NUMERATOR: usize = 4;

/// Denominator of the words-to-tokens ratio for `WordCounter`
pub const TOKEN_WORD_RATIO_DENOMINATOR: usize = 3;

// =============================================================================
// Importance Scoring
// =============================================================================

/// Minimum importance score
pub const IMPORTANCE_MIN: f64 = 0.0;

/// Maximum importance score
pub const IMPORTANCE_MAX: f64 = 1.0;

/// Score used when a turn cannot be scored
pub const IMPORTANCE_NEUTRAL: f64 = 0.5;

/// Halflife for recency decay (10 minutes)
pub const SCORING_DECAY_HALFLIFE_MS_DEFAULT: u64 = 10 * TIME_MS_PER_MIN;

/// Weight of the role signal
pub const SCORING_WEIGHT_ROLE_DEFAULT: f64 = 0.3;

/// Weight of the recency signal
pub const SCORING_WEIGHT_RECENCY_DEFAULT: f64 = 0.3;

/// Weight of the content signal
pub const SCORING_WEIGHT_CONTENT_DEFAULT: f64 = 0.2;

/// Weight of the access frequency signal
pub const SCORING_WEIGHT_FREQUENCY_DEFAULT: f64 = 0.2;

/// Role baseline for system turns
pub const SCORING_ROLE_SYSTEM_DEFAULT: f64 = 1.0;

/// Role baseline for user turns
pub const SCORING_ROLE_USER_DEFAULT: f64 = 0.6;

/// Role baseline for assistant turns
pub const SCORING_ROLE_ASSISTANT_DEFAULT: f64 = 0.4;

/// Lower edge of the length sweet spot (tokens)
pub const SCORING_LENGTH_SWEET_TOKENS_MIN: usize = 10;

/// Upper edge of the length sweet spot (tokens)
pub const SCORING_LENGTH_SWEET_TOKENS_MAX: usize = 200;

/// Share of the content signal contributed by length
pub const SCORING_LENGTH_SHARE_DEFAULT: f64 = 0.5;

/// Share of the content signal contributed by a question mark
pub const SCORING_QUESTION_SHARE_DEFAULT: f64 = 0.25;

/// Share of the content signal contributed by intent keywords
pub const SCORING_KEYWORD_SHARE_DEFAULT: f64 = 0.25;

/// Access count at which the frequency signal saturates
pub const SCORING_FREQUENCY_SATURATION_COUNT: u64 = 10;

/// Maximum number of configured intent keywords
pub const SCORING_INTENT_KEYWORDS_COUNT_MAX: usize = 256;

// =============================================================================
// Remediation
// =============================================================================

/// Importance above which a turn is compressed instead of evicted
pub const REMEDIATION_COMPRESSION_THRESHOLD_DEFAULT: f64 = 0.4;

/// Compressed turns keep at most this fraction of their tokens
pub const REMEDIATION_COMPRESSION_RATIO_DEFAULT: f64 = 0.5;

/// Compression targets below this are replaced by eviction (tokens)
pub const REMEDIATION_COMPRESSED_TOKENS_MIN: usize = 8;

/// Adjacent low-importance turns needed for a summarize action
pub const REMEDIATION_SUMMARIZE_BATCH_COUNT_MIN: usize = 3;

/// Summaries keep at most this fraction of the merged tokens
pub const REMEDIATION_SUMMARY_RATIO_DEFAULT: f64 = 0.25;

/// Hard cap on a single summary (tokens)
pub const REMEDIATION_SUMMARY_TOKENS_MAX: usize = 512;

/// Maximum policy rounds per mutation before the eviction sweep
pub const REMEDIATION_ROUNDS_COUNT_MAX: usize = 4;

// =============================================================================
// Summarizer / Compression
// =============================================================================

/// Default deadline for a summarizer call
pub const SUMMARIZER_DEADLINE_MS_DEFAULT: u64 = 5 * TIME_MS_PER_SEC;

/// Maximum deadline for a summarizer call
pub const SUMMARIZER_DEADLINE_MS_MAX: u64 = 2 * TIME_MS_PER_MIN;

/// Marker appended to truncated content
pub const COMPRESSION_TRUNCATION_MARKER: &str = " [...]";

/// Minimum simulated latency for summarizer calls
pub const SIM_SUMMARIZER_LATENCY_MS_MIN: u64 = 10;

/// Maximum simulated latency for summarizer calls
pub const SIM_SUMMARIZER_LATENCY_MS_MAX: u64 = 2 * TIME_MS_PER_SEC;

// =============================================================================
// Diagnostics
// =============================================================================

/// Default number of consolidation records retained
pub const CONSOLIDATION_LOG_COUNT_DEFAULT: usize = 64;

/// Maximum number of consolidation records retained
pub const CONSOLIDATION_LOG_COUNT_MAX: usize = 10_000;

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum number of simulation steps
pub const DST_SIMULATION_STEPS_MAX: u64 = 1_000_000;

/// Maximum probability for fault injection (1.0 = 100%)
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

/// Maximum time advance per step in milliseconds
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 24 * TIME_MS_PER_HOUR;

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

/// Milliseconds per minute
pub const TIME_MS_PER_MIN: u64 = 60 * TIME_MS_PER_SEC;

/// Milliseconds per hour
pub const TIME_MS_PER_HOUR: u64 = 60 * TIME_MS_PER_MIN;

// =============================================================================
// Tests
// =============================================================================
