//! Filter validation
//!
//! Contradictory or out-of-range filter settings are reported as warnings,
//! never as errors: a reasonable substitute always exists, and the planner
//! applies it via [`sanitize_filters`].

use crate::types::Filters;
use serde::{Deserialize, Serialize};

/// Thresholds above this are almost certainly a typo
pub const MAX_PLAUSIBLE_THRESHOLD: i64 = 100_000;

/// Days of history the platform's standard search can reach
pub const STANDARD_RETENTION_DAYS: u32 = 7;

/// Category of a filter problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Negative,
    Implausible,
    Conflict,
    ExceedsRetention,
    ZeroWindow,
    InvalidLanguage,
}

/// A non-fatal problem with a filter setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterWarning {
    pub field: String,
    pub kind: WarningKind,
    pub message: String,
}

impl FilterWarning {
    fn new(field: &str, kind: WarningKind, message: String) -> Self {
        Self {
            field: field.to_string(),
            kind,
            message,
        }
    }
}

impl std::fmt::Display for FilterWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Whether a language tag looks like something the platform accepts
pub fn is_valid_language(tag: &str) -> bool {
    (2..=3).contains(&tag.len()) && tag.chars().all(|c| c.is_ascii_lowercase())
}

/// Report every questionable setting in `filters`
pub fn validate_filters(filters: &Filters) -> Vec<FilterWarning> {
    let mut warnings = Vec::new();

    let thresholds = [
        ("min_likes", filters.min_likes),
        ("min_reposts", filters.min_reposts),
        ("min_replies", filters.min_replies),
    ];
    for (field, value) in thresholds {
        if value < 0 {
            warnings.push(FilterWarning::new(
                field,
                WarningKind::Negative,
                format!("negative threshold {} is ignored", value),
            ));
        } else if value > MAX_PLAUSIBLE_THRESHOLD {
            warnings.push(FilterWarning::new(
                field,
                WarningKind::Implausible,
                format!(
                    "threshold {} exceeds {} and will match almost nothing",
                    value, MAX_PLAUSIBLE_THRESHOLD
                ),
            ));
        }
    }

    if filters.exclude_replies && filters.min_replies > 0 {
        warnings.push(FilterWarning::new(
            "exclude_replies",
            WarningKind::Conflict,
            format!(
                "excluding replies while requiring min_replies {} narrows results twice",
                filters.min_replies
            ),
        ));
    }

    if filters.days_back == 0 {
        warnings.push(FilterWarning::new(
            "days_back",
            WarningKind::ZeroWindow,
            "a zero-day window searches nothing; one day is used instead".to_string(),
        ));
    } else if filters.days_back > STANDARD_RETENTION_DAYS {
        warnings.push(FilterWarning::new(
            "days_back",
            WarningKind::ExceedsRetention,
            format!(
                "{} days exceeds standard search retention of {} days",
                filters.days_back, STANDARD_RETENTION_DAYS
            ),
        ));
    }

    if let Some(lang) = &filters.language {
        if !is_valid_language(lang) {
            warnings.push(FilterWarning::new(
                "language",
                WarningKind::InvalidLanguage,
                format!("'{}' is not a language tag; no language filter applied", lang),
            ));
        }
    }

    warnings
}

/// Substitute safe values for settings that cannot be rendered as given
///
/// Negative thresholds become 0, a zero window becomes one day and an
/// unusable language tag is dropped. Conflicts and large values are left
/// alone; they are legal, only suspicious.
pub fn sanitize_filters(filters: &Filters) -> Filters {
    let mut clean = filters.clone();
    clean.min_likes = clean.min_likes.max(0);
    clean.min_reposts = clean.min_reposts.max(0);
    clean.min_replies = clean.min_replies.max(0);
    clean.days_back = clean.days_back.max(1);
    clean.language = clean
        .language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| is_valid_language(l));
    clean
}
