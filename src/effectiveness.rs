//! Per-keyword effectiveness tracking
//!
//! Accumulates match counts and downstream classification outcomes for each
//! keyword and condenses them into a single score in `[0, 1]`.
//!
//! # Scoring
//!
//! With enough classified samples the score blends three signals:
//!
//! ```text
//! volume     = min(1, log10(1 + relevant_per_day))
//! confidence = min(1, classified / confidence_samples)
//! score      = 0.4 * volume + 0.4 * success_rate * confidence + 0.2 * confidence
//! ```
//!
//! Keywords yielding under one relevant result per day lose 30% of their
//! score: precise but useless in bulk. Keywords with fewer than five
//! classified samples get an exploration score built from their hit count
//! and a default relevance, so they are not zeroed out before they have had
//! a chance.

use crate::config::EffectivenessConfig;
use crate::storage::StateStore;
use crate::types::{normalize_keyword, KeywordStats};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Fewest samples per trend window worth comparing
const MIN_TREND_SAMPLES: usize = 10;

/// Mean difference that counts as a real change
const TREND_THRESHOLD: f64 = 0.05;

/// Direction of recent classification scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    Insufficient,
}

/// Stats plus derived metrics, for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordReport {
    pub stats: KeywordStats,
    pub success_rate: f64,
    pub tweets_per_day: f64,
    pub effectiveness: f64,
    pub confidence: f64,
    pub trend: Trend,
}

/// Records outcomes per keyword and scores them
pub struct EffectivenessTracker {
    config: EffectivenessConfig,
    store: Arc<dyn StateStore>,
    stats: RwLock<HashMap<String, KeywordStats>>,
    // Held from mutation through the store write so saves land in order
    persist_lock: Mutex<()>,
}

impl EffectivenessTracker {
    pub fn new(config: EffectivenessConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            config,
            store,
            stats: RwLock::new(HashMap::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Hydrate from the store; an unreadable store starts every keyword fresh
    pub async fn load(config: EffectivenessConfig, store: Arc<dyn StateStore>) -> Self {
        let stats = match store.load_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Could not load keyword stats, starting fresh: {}", e);
                HashMap::new()
            }
        };
        debug!("Loaded stats for {} keywords", stats.len());
        Self {
            config,
            store,
            stats: RwLock::new(stats),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EffectivenessConfig {
        &self.config
    }

    /// A search for `keyword` over `window_days` matched one more result
    pub async fn record_match(&self, keyword: &str, window_days: u32) {
        self.update(keyword, |stats| {
            stats.hits += 1;
            stats.search_window_days = window_days;
        })
        .await;
    }

    /// Downstream classification of one result matched by `keyword`
    pub async fn record_classification(&self, keyword: &str, relevant: bool, score: f64) {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        let high_quality_score = self.config.high_quality_score;
        let capacity = self.config.sample_capacity;

        self.update(keyword, |stats| {
            stats.classified_count += 1;
            if relevant {
                stats.relevant_count += 1;
                if score >= high_quality_score {
                    stats.high_quality_count += 1;
                }
            } else {
                stats.skip_count += 1;
            }

            stats
                .effectiveness_samples
                .push_back(if relevant { score } else { 0.0 });
            while stats.effectiveness_samples.len() > capacity {
                stats.effectiveness_samples.pop_front();
            }
        })
        .await;
    }

    async fn update<F>(&self, keyword: &str, apply: F)
    where
        F: FnOnce(&mut KeywordStats),
    {
        let key = normalize_keyword(keyword);
        if key.is_empty() {
            return;
        }

        let _persist = self.persist_lock.lock().await;
        let snapshot = {
            let mut stats = self.stats.write();
            let entry = stats
                .entry(key.clone())
                .or_insert_with(|| KeywordStats::new(&key));
            apply(entry);
            entry.last_updated = Some(Utc::now());
            entry.clone()
        };

        if let Err(e) = self.store.save_stats(&key, &snapshot).await {
            warn!("Failed to persist stats for '{}': {}", key, e);
        }
    }

    /// Stats for a keyword (zeroed if never seen)
    pub fn stats(&self, keyword: &str) -> KeywordStats {
        let key = normalize_keyword(keyword);
        self.stats
            .read()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| KeywordStats::new(&key))
    }

    /// All tracked stats, most effective first
    pub fn all_stats(&self) -> Vec<KeywordStats> {
        let mut scored: Vec<(f64, KeywordStats)> = self
            .stats
            .read()
            .values()
            .map(|s| (self.effectiveness_of(s), s.clone()))
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.keyword.cmp(&b.1.keyword))
        });
        scored.into_iter().map(|(_, s)| s).collect()
    }

    /// Effectiveness score for a keyword
    pub fn effectiveness(&self, keyword: &str) -> f64 {
        self.effectiveness_of(&self.stats(keyword))
    }

    /// Sample-size confidence: `min(1, classified / confidence_samples)`
    pub fn confidence(&self, stats: &KeywordStats) -> f64 {
        let needed = self.config.confidence_samples.max(1) as f64;
        (stats.classified_count as f64 / needed).min(1.0)
    }

    /// Score a set of stats
    pub fn effectiveness_of(&self, stats: &KeywordStats) -> f64 {
        let cfg = &self.config;

        if stats.classified_count < cfg.min_classified {
            let hit_factor = ((1.0 + stats.hits as f64).log10() / 2.0).min(1.0);
            return (0.7 * cfg.default_relevance + 0.3 * hit_factor).clamp(0.0, 1.0);
        }

        let tweets_per_day = stats.tweets_per_day();
        let volume = (1.0 + tweets_per_day).log10().min(1.0);
        let confidence = self.confidence(stats);
        let success = stats.success_rate() * confidence;

        let mut score = cfg.volume_weight * volume
            + cfg.success_weight * success
            + cfg.confidence_weight * confidence;

        if tweets_per_day < cfg.low_volume_threshold {
            score *= 1.0 - cfg.low_volume_penalty;
        }

        score.clamp(0.0, 1.0)
    }

    /// Compare the latest window of samples against the one before it
    pub fn trend(&self, stats: &KeywordStats) -> Trend {
        let samples = &stats.effectiveness_samples;
        let n = samples.len();
        if n < 2 * MIN_TREND_SAMPLES {
            return Trend::Insufficient;
        }

        let window = self.config.trend_window.min(n / 2);
        let recent = mean(samples.iter().skip(n - window));
        let prior = mean(samples.iter().skip(n - 2 * window).take(window));
        let delta = recent - prior;

        if delta > TREND_THRESHOLD {
            Trend::Improving
        } else if delta < -TREND_THRESHOLD {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }

    /// Stats with derived metrics for one keyword
    pub fn report(&self, keyword: &str) -> KeywordReport {
        self.report_for(self.stats(keyword))
    }

    /// Reports for every keyword, most effective first
    pub fn all_reports(&self) -> Vec<KeywordReport> {
        self.all_stats()
            .into_iter()
            .map(|s| self.report_for(s))
            .collect()
    }

    fn report_for(&self, stats: KeywordStats) -> KeywordReport {
        KeywordReport {
            success_rate: stats.success_rate(),
            tweets_per_day: stats.tweets_per_day(),
            effectiveness: self.effectiveness_of(&stats),
            confidence: self.confidence(&stats),
            trend: self.trend(&stats),
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.stats.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.read().is_empty()
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
