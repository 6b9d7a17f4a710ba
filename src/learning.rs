//! Cross-run keyword weight learning
//!
//! Turns effectiveness outcomes into search weights that persist between
//! runs. Three mechanisms shape a weight:
//!
//! - **Exploration**: a keyword with no history starts at the exploration
//!   weight, or at the mean of similar known keywords when any exist.
//! - **Decay**: learned weights drift back toward the exploration weight
//!   (`decay_factor` per `decay_period_days`), so stale history loses
//!   influence.
//! - **Confidence**: history backed by few updates is pulled toward the
//!   weight the caller proposed this run.
//!
//! # Update Rule
//!
//! ```text
//! blended = learned * (1 - rate) + proposed * rate
//! final   = blended + (proposed - blended) * (1 - confidence)
//! ```
//!
//! with `confidence = min(1, updates / confidence_updates)`.
//!
//! Report learning is incremental: each weight remembers how many classified
//! results it has already absorbed, and only newer classifications count as
//! a fresh outcome.

use crate::config::LearningConfig;
use crate::effectiveness::KeywordReport;
use crate::storage::StateStore;
use crate::types::{normalize_keyword, tokenize, Keyword, LearnedWeight};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Learns and persists per-keyword weights
pub struct WeightLearner {
    config: LearningConfig,
    store: Arc<dyn StateStore>,
    weights: RwLock<HashMap<String, LearnedWeight>>,
    // Held from mutation through the store write so saves land in order
    persist_lock: Mutex<()>,
}

impl WeightLearner {
    pub fn new(config: LearningConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            config,
            store,
            weights: RwLock::new(HashMap::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Hydrate from the store
    ///
    /// An unreadable store leaves every keyword on exploration defaults.
    pub async fn load(config: LearningConfig, store: Arc<dyn StateStore>) -> Self {
        let weights = match store.load_weights().await {
            Ok(weights) => weights,
            Err(e) => {
                warn!("Could not load learned weights, using exploration defaults: {}", e);
                HashMap::new()
            }
        };
        debug!("Loaded {} learned weights", weights.len());
        Self {
            config,
            store,
            weights: RwLock::new(weights),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Replace each keyword's weight with its learned value
    pub fn apply_learned_weights(&self, keywords: &[Keyword]) -> Vec<Keyword> {
        self.apply_learned_weights_at(keywords, Utc::now())
    }

    pub fn apply_learned_weights_at(&self, keywords: &[Keyword], now: DateTime<Utc>) -> Vec<Keyword> {
        let weights = self.weights.read();
        keywords
            .iter()
            .map(|keyword| {
                let term = normalize_keyword(&keyword.term);
                let weight = match weights.get(&term) {
                    Some(learned) => self.blend(learned, keyword.weight, now),
                    None => self.seed_weight(&weights, &term),
                };
                debug!(
                    keyword = %term,
                    proposed = keyword.weight,
                    weight,
                    "Applied learned weight"
                );
                Keyword {
                    term,
                    weight: self.clamp(weight),
                }
            })
            .collect()
    }

    fn blend(&self, learned: &LearnedWeight, proposed: f64, now: DateTime<Utc>) -> f64 {
        let rate = self.config.learning_rate;
        let decayed = self.decayed(learned, now);
        let blended = decayed * (1.0 - rate) + proposed * rate;
        let confidence = self.confidence(learned);
        blended + (proposed - blended) * (1.0 - confidence)
    }

    /// Learned weight pulled back toward exploration by its age
    fn decayed(&self, learned: &LearnedWeight, now: DateTime<Utc>) -> f64 {
        let age_days = ((now - learned.last_updated).num_seconds().max(0) as f64) / 86_400.0;
        let periods = age_days / self.config.decay_period_days;
        let retained = self.config.decay_factor.powf(periods);
        let explore = self.config.exploration_weight;
        explore + (learned.weight - explore) * retained
    }

    fn confidence(&self, learned: &LearnedWeight) -> f64 {
        let needed = self.config.confidence_updates.max(1) as f64;
        (learned.updates as f64 / needed).min(1.0)
    }

    /// Starting weight for a keyword without history
    fn seed_weight(&self, weights: &HashMap<String, LearnedWeight>, term: &str) -> f64 {
        let similar: Vec<f64> = weights
            .iter()
            .filter(|(known, _)| is_similar(known, term, self.config.similarity_threshold))
            .map(|(_, learned)| learned.weight)
            .collect();

        if similar.is_empty() {
            return self.config.exploration_weight;
        }
        let seeded = similar.iter().sum::<f64>() / similar.len() as f64;
        debug!(
            keyword = term,
            similar = similar.len(),
            seeded,
            "Seeded weight from similar keywords"
        );
        seeded
    }

    fn clamp(&self, weight: f64) -> f64 {
        if weight.is_nan() {
            return self.config.min_weight;
        }
        weight.clamp(self.config.min_weight, self.config.max_weight)
    }

    /// Fold one search outcome into a keyword's learned weight
    ///
    /// Returns the new weight.
    pub async fn update_from_outcome(
        &self,
        keyword: &str,
        effective: bool,
        tweets_found: u64,
        window_days: u32,
    ) -> f64 {
        self.update_from_outcome_at(keyword, effective, tweets_found, window_days, Utc::now())
            .await
    }

    pub async fn update_from_outcome_at(
        &self,
        keyword: &str,
        effective: bool,
        tweets_found: u64,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> f64 {
        let key = normalize_keyword(keyword);
        let effective = if effective { 1.0 } else { 0.0 };
        let observed = observation(effective, tweets_found, window_days);

        let _persist = self.persist_lock.lock().await;
        let updated = {
            let mut weights = self.weights.write();
            let updated = self.step(&weights, &key, observed, now);
            weights.insert(key.clone(), updated.clone());
            updated
        };

        debug!(
            keyword = %key,
            observed,
            tweets_found,
            weight = updated.weight,
            "Updated learned weight"
        );
        self.persist(&key, &updated).await;
        updated.weight
    }

    /// One learning-rate step from the current (decayed or seeded) weight toward `observed`
    fn step(
        &self,
        weights: &HashMap<String, LearnedWeight>,
        key: &str,
        observed: f64,
        now: DateTime<Utc>,
    ) -> LearnedWeight {
        let rate = self.config.learning_rate;
        let (old, mut next) = match weights.get(key) {
            Some(learned) => (self.decayed(learned, now), learned.clone()),
            None => {
                let seeded = self.seed_weight(weights, key);
                (seeded, LearnedWeight::new(seeded, now, 0))
            }
        };
        next.weight = self.clamp(old * (1.0 - rate) + observed * rate);
        next.last_updated = now;
        next.updates = next.updates.saturating_add(1);
        next
    }

    /// Negative feedback: scale weights down by `(1 - factor)`
    ///
    /// Written to the store immediately.
    pub async fn penalize<S: AsRef<str>>(&self, keywords: &[S], factor: f64) {
        self.penalize_at(keywords, factor, Utc::now()).await
    }

    pub async fn penalize_at<S: AsRef<str>>(&self, keywords: &[S], factor: f64, now: DateTime<Utc>) {
        let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };

        for keyword in keywords {
            let key = normalize_keyword(keyword.as_ref());
            if key.is_empty() {
                continue;
            }

            let _persist = self.persist_lock.lock().await;
            let updated = {
                let mut weights = self.weights.write();
                let mut updated = match weights.get(&key) {
                    Some(learned) => learned.clone(),
                    None => LearnedWeight::new(self.seed_weight(&weights, &key), now, 0),
                };
                updated.weight = self.clamp(updated.weight * (1.0 - factor));
                updated.last_updated = now;
                weights.insert(key.clone(), updated.clone());
                updated
            };

            info!(
                "Penalized '{}' by {:.0}% to {:.3}",
                key,
                factor * 100.0,
                updated.weight
            );
            self.persist(&key, &updated).await;
        }
    }

    /// Convert tracked effectiveness into outcomes
    ///
    /// Each keyword contributes at most one outcome per call, built only from
    /// classifications it has gained since the last time it was learned. The
    /// effective signal is the relevant share of those new classifications;
    /// the effectiveness score itself already discounts low volume, which the
    /// observation accounts for separately. Returns how many keywords were
    /// updated.
    pub async fn learn_from_reports(&self, reports: &[KeywordReport]) -> usize {
        self.learn_from_reports_at(reports, Utc::now()).await
    }

    pub async fn learn_from_reports_at(&self, reports: &[KeywordReport], now: DateTime<Utc>) -> usize {
        let mut updated = 0;
        for report in reports {
            let stats = &report.stats;
            let key = normalize_keyword(&stats.keyword);
            if key.is_empty() {
                continue;
            }

            let _persist = self.persist_lock.lock().await;
            let learned = {
                let mut weights = self.weights.write();
                let (mut seen_classified, mut seen_relevant) = weights
                    .get(&key)
                    .map(|w| (w.classified_seen, w.relevant_seen))
                    .unwrap_or((0, 0));
                // Counters behind the tally means the stats were reset
                if stats.classified_count < seen_classified {
                    seen_classified = 0;
                    seen_relevant = 0;
                }

                let new_classified = stats.classified_count - seen_classified;
                if new_classified == 0 {
                    continue;
                }
                let new_relevant = stats
                    .relevant_count
                    .saturating_sub(seen_relevant)
                    .min(new_classified);
                let success = new_relevant as f64 / new_classified as f64;
                let observed = observation(success, new_relevant, stats.search_window_days);

                let mut learned = self.step(&weights, &key, observed, now);
                learned.classified_seen = stats.classified_count;
                learned.relevant_seen = stats.relevant_count.min(stats.classified_count);
                weights.insert(key.clone(), learned.clone());
                learned
            };

            debug!(
                keyword = %key,
                effectiveness = report.effectiveness,
                weight = learned.weight,
                "Learned weight from report"
            );
            self.persist(&key, &learned).await;
            updated += 1;
        }
        if updated > 0 {
            info!("Learned weights for {} keywords", updated);
        }
        updated
    }

    async fn persist(&self, key: &str, weight: &LearnedWeight) {
        if let Err(e) = self.store.save_weight(key, weight).await {
            warn!("Failed to persist learned weight for '{}': {}", key, e);
        }
    }

    /// Stored weight for a keyword, without decay
    pub fn learned_weight(&self, keyword: &str) -> Option<LearnedWeight> {
        self.weights.read().get(&normalize_keyword(keyword)).cloned()
    }

    /// All stored weights, sorted by keyword
    pub fn all_weights(&self) -> Vec<(String, LearnedWeight)> {
        let mut all: Vec<_> = self
            .weights
            .read()
            .iter()
            .map(|(k, w)| (k.clone(), w.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.weights.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.read().is_empty()
    }
}

/// Observed quality of an outcome: mostly how effective it was, partly its volume
fn observation(effective: f64, tweets_found: u64, window_days: u32) -> f64 {
    let per_day = tweets_found as f64 / window_days.max(1) as f64;
    let volume = (1.0 + per_day).log10().min(1.0);
    0.8 * effective.clamp(0.0, 1.0) + 0.2 * volume
}

/// Substring match either way, or token overlap at or above `threshold`
fn is_similar(known: &str, candidate: &str, threshold: f64) -> bool {
    if known.is_empty() || candidate.is_empty() || known == candidate {
        return false;
    }
    if known.contains(candidate) || candidate.contains(known) {
        return true;
    }
    token_overlap(known, candidate) >= threshold
}

/// Jaccard overlap of word tokens
fn token_overlap(a: &str, b: &str) -> f64 {
    let a = tokenize(a);
    let b = tokenize(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoutError;
    use crate::storage::{MemoryStore, MockStateStore};
    use chrono::Duration;

    fn learner() -> (WeightLearner, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            WeightLearner::new(LearningConfig::default(), store.clone()),
            store,
        )
    }

    async fn seed(store: &MemoryStore, keyword: &str, weight: f64, updates: u32, at: DateTime<Utc>) {
        store
            .save_weight(keyword, &LearnedWeight::new(weight, at, updates))
            .await
            .unwrap();
    }

    #[test]
    fn test_unknown_keyword_gets_exploration_weight() {
        let (learner, _) = learner();
        let applied = learner.apply_learned_weights(&[Keyword::new("federalism", 0.95)]);
        assert_eq!(applied[0].weight, 0.6);
    }

    #[tokio::test]
    async fn test_similar_keyword_seeds_weight() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "state power", 0.8, 10, Utc::now()).await;
        let learner = WeightLearner::load(LearningConfig::default(), store).await;

        let applied = learner.apply_learned_weights(&[Keyword::new("state power grab", 0.3)]);
        assert!((applied[0].weight - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_rules() {
        assert!(is_similar("state power", "power", 0.7));
        assert!(is_similar("climate", "Climate change".to_lowercase().as_str(), 0.7));
        assert!(!is_similar("rust", "golang", 0.7));
        assert!(!is_similar("rust", "rust", 0.7));
        assert!((token_overlap("a b c", "a b d") - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_full_confidence_blends_with_learning_rate() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seed(&store, "rust", 0.9, 10, now).await;
        let learner = WeightLearner::load(LearningConfig::default(), store).await;

        let applied = learner.apply_learned_weights_at(&[Keyword::new("rust", 0.5)], now);
        let expected = 0.9 * 0.7 + 0.5 * 0.3;
        assert!((applied[0].weight - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_low_confidence_defers_to_proposed() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seed(&store, "rust", 0.9, 0, now).await;
        let learner = WeightLearner::load(LearningConfig::default(), store).await;

        let applied = learner.apply_learned_weights_at(&[Keyword::new("rust", 0.5)], now);
        assert!((applied[0].weight - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_decay_pulls_toward_exploration() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seed(&store, "rust", 1.0, 10, now - Duration::days(30)).await;
        let learner = WeightLearner::load(LearningConfig::default(), store).await;

        // One full period: 0.6 + 0.4 * 0.95
        let decayed = 0.6 + 0.4 * 0.95;
        let applied = learner.apply_learned_weights_at(&[Keyword::new("rust", 1.0)], now);
        let expected = decayed * 0.7 + 1.0 * 0.3;
        assert!((applied[0].weight - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_update_from_outcome_moves_weight() {
        let (learner, store) = learner();
        let up = learner.update_from_outcome("rust", true, 70, 7).await;
        // observed = 0.8 + 0.2 * min(1, log10(11)) = 1.0
        assert!((up - (0.6 * 0.7 + 1.0 * 0.3)).abs() < 1e-9);

        let down = learner.update_from_outcome("golang", false, 0, 7).await;
        assert!((down - 0.42).abs() < 1e-9);

        let stored = store.snapshot().weights;
        assert_eq!(stored["rust"].updates, 1);
        assert!(stored.contains_key("golang"));
    }

    #[tokio::test]
    async fn test_penalize_floors_and_persists() {
        let (learner, store) = learner();
        learner.update_from_outcome("spam", false, 0, 7).await;

        learner.penalize(&["SPAM"], 0.5).await;
        let halved = learner.learned_weight("spam").unwrap().weight;
        assert!((halved - 0.21).abs() < 1e-9);

        learner.penalize(&["spam"], 1.0).await;
        assert_eq!(learner.learned_weight("spam").unwrap().weight, 0.05);
        assert_eq!(store.snapshot().weights["spam"].weight, 0.05);
    }

    #[tokio::test]
    async fn test_learn_from_reports_skips_unclassified() {
        use crate::effectiveness::Trend;
        use crate::types::KeywordStats;

        let (learner, _) = learner();
        let mut classified = KeywordStats::new("rust");
        classified.classified_count = 10;
        classified.relevant_count = 9;
        classified.skip_count = 1;
        classified.search_window_days = 7;

        let report = |stats: KeywordStats, effectiveness: f64| KeywordReport {
            success_rate: stats.success_rate(),
            tweets_per_day: stats.tweets_per_day(),
            effectiveness,
            confidence: 1.0,
            trend: Trend::Insufficient,
            stats,
        };

        let updated = learner
            .learn_from_reports(&[
                report(classified, 0.8),
                report(KeywordStats::new("unseen"), 0.35),
            ])
            .await;
        assert_eq!(updated, 1);
        assert!(learner.learned_weight("rust").unwrap().weight > 0.6);
        assert!(learner.learned_weight("unseen").is_none());
    }

    #[tokio::test]
    async fn test_relearning_without_new_evidence_is_noop() {
        use crate::config::EffectivenessConfig;
        use crate::effectiveness::EffectivenessTracker;

        let store = Arc::new(MemoryStore::new());
        let tracker = EffectivenessTracker::new(EffectivenessConfig::default(), store.clone());
        let learner = WeightLearner::new(LearningConfig::default(), store.clone());

        tracker.record_match("federalism", 7).await;
        for _ in 0..5 {
            tracker.record_classification("federalism", true, 0.9).await;
        }

        for _ in 0..10 {
            learner.learn_from_reports(&tracker.all_reports()).await;
        }
        let learned = learner.learned_weight("federalism").unwrap();
        assert_eq!(learned.updates, 1);
        assert_eq!(learned.classified_seen, 5);
        // Every new result was relevant, so the weight rises despite low volume
        assert!(learned.weight > 0.6, "weight = {}", learned.weight);

        tracker.record_classification("federalism", false, 0.1).await;
        assert_eq!(learner.learn_from_reports(&tracker.all_reports()).await, 1);
        let learned = learner.learned_weight("federalism").unwrap();
        assert_eq!(learned.updates, 2);
        assert_eq!(learned.classified_seen, 6);
        assert_eq!(store.snapshot().weights["federalism"].classified_seen, 6);
    }

    #[tokio::test]
    async fn test_reset_stats_restart_tally() {
        use crate::effectiveness::Trend;
        use crate::types::KeywordStats;

        let store = Arc::new(MemoryStore::new());
        let mut prior = LearnedWeight::new(0.7, Utc::now(), 4);
        prior.classified_seen = 50;
        prior.relevant_seen = 40;
        store.save_weight("rust", &prior).await.unwrap();
        let learner = WeightLearner::load(LearningConfig::default(), store).await;

        let mut stats = KeywordStats::new("rust");
        stats.classified_count = 3;
        stats.relevant_count = 3;
        stats.search_window_days = 7;
        let report = KeywordReport {
            success_rate: 1.0,
            tweets_per_day: stats.tweets_per_day(),
            effectiveness: 0.3,
            confidence: 0.3,
            trend: Trend::Insufficient,
            stats,
        };

        assert_eq!(learner.learn_from_reports(&[report]).await, 1);
        let learned = learner.learned_weight("rust").unwrap();
        assert_eq!(learned.updates, 5);
        assert_eq!(learned.classified_seen, 3);
    }

    #[tokio::test]
    async fn test_load_failure_uses_defaults() {
        let mut store = MockStateStore::new();
        store
            .expect_load_weights()
            .returning(|| Err(ScoutError::StoreUnavailable("down".to_string())));
        let learner = WeightLearner::load(LearningConfig::default(), Arc::new(store)).await;

        assert!(learner.is_empty());
        let applied = learner.apply_learned_weights(&[Keyword::new("rust", 0.9)]);
        assert_eq!(applied[0].weight, 0.6);
    }
}
