//! Configuration for keyword-scout
//!
//! Every tunable constant of the planner lives here with a documented
//! default. The library never reads configuration on its own; callers build
//! a [`ScoutConfig`] (or load one from TOML) and hand the relevant section to
//! each component.

use crate::types::{Filters, MAX_WEIGHT, MIN_WEIGHT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Longest rate window accepted, one month of seconds
pub const MAX_WINDOW_SECS: u64 = 31 * 24 * 60 * 60;

/// Longest cache retention accepted, about ten years
pub const MAX_RETENTION_DAYS: i64 = 3_650;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub quota: QuotaConfig,
    pub query: QueryConfig,
    pub effectiveness: EffectivenessConfig,
    pub learning: LearningConfig,
    pub planner: PlannerConfig,
    pub cache: CacheConfig,
}

/// API call ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Nominal calls per UTC month
    pub monthly_limit: u64,

    /// Nominal calls per rate window
    pub window_limit: u64,

    /// Rate window length in seconds
    pub window_secs: u64,

    /// Fraction of each nominal ceiling we allow ourselves to use
    pub safety_margin: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            monthly_limit: 10_000,
            window_limit: 180,
            window_secs: 900, // 15 minutes
            safety_margin: 0.9,
        }
    }
}

impl QuotaConfig {
    /// Rate window length, capped at [`MAX_WINDOW_SECS`]
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs.min(MAX_WINDOW_SECS) as i64)
    }

    /// Usable monthly calls after the safety margin
    pub fn effective_monthly_limit(&self) -> u64 {
        (self.monthly_limit as f64 * self.safety_margin).floor() as u64
    }

    /// Usable calls per window after the safety margin
    pub fn effective_window_limit(&self) -> u64 {
        (self.window_limit as f64 * self.safety_margin).floor() as u64
    }
}

/// Query rendering limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum OR-joined terms per query
    pub max_terms: usize,

    /// Maximum serialized query length in characters
    pub max_length: usize,

    /// Filters applied when the caller does not supply any
    pub filters: Filters,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_terms: 25,
            max_length: 512,
            filters: Filters::default(),
        }
    }
}

/// Effectiveness scoring constants
///
/// The blend weights and thresholds are empirical; they are exposed so they
/// can be tuned without touching the scoring code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectivenessConfig {
    pub volume_weight: f64,
    pub success_weight: f64,
    pub confidence_weight: f64,

    /// Below this many classified samples the exploration score is used
    pub min_classified: u64,

    /// Samples needed for full confidence
    pub confidence_samples: u64,

    /// Relevant results per day below which the volume penalty applies
    pub low_volume_threshold: f64,

    /// Fractional penalty for low-volume keywords
    pub low_volume_penalty: f64,

    /// Ring size of retained classification samples
    pub sample_capacity: usize,

    /// Samples per trend window
    pub trend_window: usize,

    /// Classification score at or above which a result counts as high quality
    pub high_quality_score: f64,

    /// Assumed relevance for keywords still being explored
    pub default_relevance: f64,
}

impl Default for EffectivenessConfig {
    fn default() -> Self {
        Self {
            volume_weight: 0.4,
            success_weight: 0.4,
            confidence_weight: 0.2,
            min_classified: 5,
            confidence_samples: 10,
            low_volume_threshold: 1.0,
            low_volume_penalty: 0.3,
            sample_capacity: 1000,
            trend_window: 100,
            high_quality_score: 0.8,
            default_relevance: 0.5,
        }
    }
}

/// Cross-run weight learning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub learning_rate: f64,

    /// Multiplier applied per decay period since the last update
    pub decay_factor: f64,
    pub decay_period_days: f64,

    /// Weight for keywords with no history
    pub exploration_weight: f64,
    pub min_weight: f64,
    pub max_weight: f64,

    /// Token overlap at which two keywords count as similar
    pub similarity_threshold: f64,

    /// Updates needed before learned history is fully trusted
    pub confidence_updates: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            decay_factor: 0.95,
            decay_period_days: 30.0,
            exploration_weight: 0.6,
            min_weight: MIN_WEIGHT,
            max_weight: MAX_WEIGHT,
            similarity_threshold: 0.7,
            confidence_updates: 10,
        }
    }
}

/// Tiering and call estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Weight at or above which a keyword is high priority
    pub high_threshold: f64,

    /// Weight at or above which a keyword is medium priority
    pub medium_threshold: f64,

    /// Maximum keywords in the low priority phase
    pub low_priority_cap: usize,

    /// Results requested per query
    pub results_per_query: u32,

    /// Results the platform returns per call
    pub page_size: u32,

    /// Recommended in-flight search calls for the caller
    pub max_concurrency: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.8,
            medium_threshold: 0.5,
            low_priority_cap: 10,
            results_per_query: 100,
            page_size: 100,
            max_concurrency: 4,
        }
    }
}

/// Result cache bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub retention_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retention_days: 90,
        }
    }
}

impl CacheConfig {
    /// Retention as a duration, capped at [`MAX_RETENTION_DAYS`]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.clamp(0, MAX_RETENTION_DAYS))
    }
}

impl ScoutConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: ScoutConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let quota = &self.quota;
        if quota.monthly_limit == 0 || quota.window_limit == 0 || quota.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "quota: limits and window length must be positive".to_string(),
            ));
        }
        if quota.window_secs > MAX_WINDOW_SECS {
            return Err(ConfigError::ValidationError(format!(
                "quota: window_secs must not exceed {}",
                MAX_WINDOW_SECS
            )));
        }
        if !(quota.safety_margin > 0.0 && quota.safety_margin <= 1.0) {
            return Err(ConfigError::ValidationError(
                "quota: safety_margin must be in (0, 1]".to_string(),
            ));
        }

        if self.query.max_terms == 0 || self.query.max_length == 0 {
            return Err(ConfigError::ValidationError(
                "query: max_terms and max_length must be positive".to_string(),
            ));
        }

        let eff = &self.effectiveness;
        if eff.sample_capacity == 0 || eff.trend_window == 0 || eff.confidence_samples == 0 {
            return Err(ConfigError::ValidationError(
                "effectiveness: sample_capacity, trend_window and confidence_samples must be positive"
                    .to_string(),
            ));
        }

        let learning = &self.learning;
        if !(learning.learning_rate > 0.0 && learning.learning_rate <= 1.0) {
            return Err(ConfigError::ValidationError(
                "learning: learning_rate must be in (0, 1]".to_string(),
            ));
        }
        if !(learning.decay_factor > 0.0 && learning.decay_factor <= 1.0)
            || learning.decay_period_days <= 0.0
        {
            return Err(ConfigError::ValidationError(
                "learning: decay_factor must be in (0, 1] with a positive period".to_string(),
            ));
        }
        if learning.min_weight <= 0.0 || learning.min_weight > learning.max_weight {
            return Err(ConfigError::ValidationError(
                "learning: min_weight must be positive and not above max_weight".to_string(),
            ));
        }

        let planner = &self.planner;
        if planner.medium_threshold >= planner.high_threshold {
            return Err(ConfigError::ValidationError(
                "planner: medium_threshold must be below high_threshold".to_string(),
            ));
        }
        if planner.page_size == 0 || planner.results_per_query == 0 || planner.max_concurrency == 0
        {
            return Err(ConfigError::ValidationError(
                "planner: page_size, results_per_query and max_concurrency must be positive"
                    .to_string(),
            ));
        }

        if self.cache.capacity == 0 || self.cache.retention_days <= 0 {
            return Err(ConfigError::ValidationError(
                "cache: capacity and retention_days must be positive".to_string(),
            ));
        }
        if self.cache.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "cache: retention_days must not exceed {}",
                MAX_RETENTION_DAYS
            )));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quota.effective_monthly_limit(), 9_000);
        assert_eq!(config.quota.effective_window_limit(), 162);
    }

    #[test]
    fn test_validate_safety_margin() {
        let mut config = ScoutConfig::default();
        config.quota.safety_margin = 1.5;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("safety_margin"));
    }

    #[test]
    fn test_validate_threshold_order() {
        let mut config = ScoutConfig::default();
        config.planner.medium_threshold = 0.9;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("medium_threshold must be below"));
    }

    #[test]
    fn test_validate_rejects_huge_durations() {
        let mut config = ScoutConfig::default();
        config.cache.retention_days = i64::MAX;
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("retention_days"));

        let mut config = ScoutConfig::default();
        config.quota.window_secs = u64::MAX;
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("window_secs"));
    }

    #[test]
    fn test_durations_are_capped() {
        let quota = QuotaConfig {
            window_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(quota.window().num_seconds(), MAX_WINDOW_SECS as i64);

        let cache = CacheConfig {
            retention_days: i64::MAX,
            ..Default::default()
        };
        assert_eq!(cache.retention().num_days(), MAX_RETENTION_DAYS);
    }

    #[test]
    fn test_validate_weight_bounds() {
        let mut config = ScoutConfig::default();
        config.learning.min_weight = 0.9;
        config.learning.max_weight = 0.5;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml_str = r#"
            [quota]
            monthly_limit = 50000

            [query.filters]
            min_likes = 10
            exclude_replies = true
            language = "en"

            [learning]
            exploration_weight = 0.5
        "#;

        let config = ScoutConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.quota.monthly_limit, 50_000);
        assert_eq!(config.quota.window_limit, 180);
        assert_eq!(config.query.filters.min_likes, 10);
        assert!(config.query.filters.exclude_replies);
        assert_eq!(config.query.filters.language.as_deref(), Some("en"));
        assert_eq!(config.query.filters.days_back, 7);
        assert_eq!(config.learning.exploration_weight, 0.5);
        assert_eq!(config.learning.learning_rate, 0.3);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = ScoutConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: ScoutConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.quota.monthly_limit, deserialized.quota.monthly_limit);
        assert_eq!(
            config.planner.low_priority_cap,
            deserialized.planner.low_priority_cap
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.toml");

        let mut config = ScoutConfig::default();
        config.cache.retention_days = 30;
        config.to_file(&path).unwrap();

        let loaded = ScoutConfig::from_file(&path).unwrap();
        assert_eq!(loaded.cache.retention_days, 30);
    }
}
