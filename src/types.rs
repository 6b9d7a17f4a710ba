//! Core data types for keyword-scout
//!
//! These are the value objects and persisted records shared by every
//! component: keywords and their weights, search filters, priority phases,
//! cached results, and the per-keyword state that survives between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Lowest weight a keyword can carry
pub const MIN_WEIGHT: f64 = 0.05;

/// Highest weight a keyword can carry
pub const MAX_WEIGHT: f64 = 1.0;

/// Platform-assigned result identifier (monotonic with creation time)
pub type ResultId = u64;

/// Normalize a search term to its identity form
///
/// Case-folds and collapses internal whitespace so `"State  Power"` and
/// `"state power"` refer to the same keyword.
pub fn normalize_keyword(term: &str) -> String {
    term.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a term into lowercase word tokens
pub fn tokenize(term: &str) -> HashSet<String> {
    term.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// A search term with its current weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Normalized term (identity)
    pub term: String,

    /// Search weight in `[MIN_WEIGHT, MAX_WEIGHT]`
    pub weight: f64,
}

impl Keyword {
    /// Create a keyword, normalizing the term and clamping the weight
    pub fn new(term: impl AsRef<str>, weight: f64) -> Self {
        Self {
            term: normalize_keyword(term.as_ref()),
            weight: clamp_weight(weight),
        }
    }

    /// Replace the weight, keeping it within bounds
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = clamp_weight(weight);
        self
    }

    /// Word tokens of this keyword
    pub fn tokens(&self) -> HashSet<String> {
        tokenize(&self.term)
    }
}

/// Clamp a weight into `[MIN_WEIGHT, MAX_WEIGHT]`, mapping NaN to the floor
pub fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        return MIN_WEIGHT;
    }
    weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Search filter settings rendered into every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// Minimum likes (0 disables)
    pub min_likes: i64,

    /// Minimum reposts (0 disables)
    pub min_reposts: i64,

    /// Minimum replies (0 disables)
    pub min_replies: i64,

    /// Drop replies from results
    pub exclude_replies: bool,

    /// Drop reposts from results
    pub exclude_reposts: bool,

    /// Language tag such as `en`
    pub language: Option<String>,

    /// How many days back to search
    pub days_back: u32,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            min_likes: 0,
            min_reposts: 0,
            min_replies: 0,
            exclude_replies: false,
            exclude_reposts: false,
            language: None,
            days_back: 7,
        }
    }
}

/// Priority band a keyword falls into based on its weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    HighPriority,
    MediumPriority,
    LowPriority,
}

impl Phase {
    /// Phases in execution order
    pub const ALL: [Phase; 3] = [
        Phase::HighPriority,
        Phase::MediumPriority,
        Phase::LowPriority,
    ];

    /// Conditional phases only run when earlier phases fell short of the target
    pub fn is_conditional(&self) -> bool {
        !matches!(self, Phase::HighPriority)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::HighPriority => write!(f, "high_priority"),
            Phase::MediumPriority => write!(f, "medium_priority"),
            Phase::LowPriority => write!(f, "low_priority"),
        }
    }
}

/// A raw result as returned by the external search API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedResult {
    pub id: ResultId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A previously fetched result held by the result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub id: ResultId,
    pub text: String,
    pub created_at: DateTime<Utc>,

    /// Keyword whose query first returned this result
    pub matched_keyword: String,

    #[serde(default)]
    pub metadata: serde_json::Value,

    /// When the result entered the cache (drives retention)
    pub fetched_at: DateTime<Utc>,
}

impl CachedResult {
    pub fn from_fetched(result: FetchedResult, keyword: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            id: result.id,
            text: result.text,
            created_at: result.created_at,
            matched_keyword: normalize_keyword(keyword),
            metadata: result.metadata,
            fetched_at,
        }
    }
}

/// Persisted quota counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub monthly_used: u64,
    pub window_used: u64,
    pub window_started_at: DateTime<Utc>,

    /// `YYYY-MM` tag of the UTC month the monthly counter belongs to
    pub last_reset_month: String,
}

impl QuotaState {
    /// Fresh counters anchored at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            monthly_used: 0,
            window_used: 0,
            window_started_at: now,
            last_reset_month: month_tag(now),
        }
    }
}

/// `YYYY-MM` tag for the UTC month containing `at`
pub fn month_tag(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// A learned weight with the time it was last updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedWeight {
    pub weight: f64,
    pub last_updated: DateTime<Utc>,

    /// Number of outcomes folded into this weight
    #[serde(default)]
    pub updates: u32,

    /// Classified results already learned from effectiveness reports
    #[serde(default)]
    pub classified_seen: u64,

    /// Relevant results among `classified_seen`
    #[serde(default)]
    pub relevant_seen: u64,
}

impl LearnedWeight {
    /// A weight with no report history behind it
    pub fn new(weight: f64, last_updated: DateTime<Utc>, updates: u32) -> Self {
        Self {
            weight,
            last_updated,
            updates,
            classified_seen: 0,
            relevant_seen: 0,
        }
    }
}

/// Identifier range already searched for a keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    /// Newest identifier seen
    pub since_id: ResultId,

    /// Oldest identifier seen
    pub until_id: ResultId,

    /// Days the searched window covered
    pub window_days: u32,

    pub updated_at: DateTime<Utc>,
}

/// Cumulative outcome counters for one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordStats {
    pub keyword: String,
    pub hits: u64,
    pub classified_count: u64,
    pub relevant_count: u64,
    pub skip_count: u64,
    pub high_quality_count: u64,

    /// Recent classification scores, oldest first
    pub effectiveness_samples: VecDeque<f64>,

    /// Days covered by the most recent search
    pub search_window_days: u32,

    pub last_updated: Option<DateTime<Utc>>,
}

impl KeywordStats {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: normalize_keyword(keyword),
            hits: 0,
            classified_count: 0,
            relevant_count: 0,
            skip_count: 0,
            high_quality_count: 0,
            effectiveness_samples: VecDeque::new(),
            search_window_days: 0,
            last_updated: None,
        }
    }

    /// Fraction of classified results judged relevant (0 when unclassified)
    pub fn success_rate(&self) -> f64 {
        if self.classified_count == 0 {
            return 0.0;
        }
        self.relevant_count as f64 / self.classified_count as f64
    }

    /// Relevant results per day of searched window
    pub fn tweets_per_day(&self) -> f64 {
        let days = self.search_window_days.max(1) as f64;
        self.relevant_count as f64 / days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_keyword() {
        assert_eq!(normalize_keyword("  State   POWER "), "state power");
        assert_eq!(normalize_keyword("Federalism"), "federalism");
        assert_eq!(normalize_keyword(""), "");
    }

    #[test]
    fn test_keyword_weight_clamped() {
        assert_eq!(Keyword::new("a", 3.0).weight, MAX_WEIGHT);
        assert_eq!(Keyword::new("a", -1.0).weight, MIN_WEIGHT);
        assert_eq!(Keyword::new("a", f64::NAN).weight, MIN_WEIGHT);
        assert_eq!(Keyword::new("a", 0.5).weight, 0.5);
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("State-power, federalism");
        assert!(tokens.contains("state"));
        assert!(tokens.contains("power"));
        assert!(tokens.contains("federalism"));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_phase_conditional() {
        assert!(!Phase::HighPriority.is_conditional());
        assert!(Phase::MediumPriority.is_conditional());
        assert!(Phase::LowPriority.is_conditional());
        assert_eq!(Phase::LowPriority.to_string(), "low_priority");
    }

    #[test]
    fn test_month_tag() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(month_tag(at), "2026-03");
    }

    #[test]
    fn test_stats_derived_values() {
        let mut stats = KeywordStats::new("Federalism");
        assert_eq!(stats.keyword, "federalism");
        assert_eq!(stats.success_rate(), 0.0);

        stats.classified_count = 10;
        stats.relevant_count = 8;
        stats.skip_count = 2;
        stats.search_window_days = 4;
        assert!((stats.success_rate() - 0.8).abs() < 1e-9);
        assert!((stats.tweets_per_day() - 2.0).abs() < 1e-9);
    }
}
