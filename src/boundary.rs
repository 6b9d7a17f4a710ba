//! Per-keyword search checkpoints
//!
//! Remembers the identifier range already fetched for each keyword so
//! repeated searches only ask for what is new. Identifiers are assigned by
//! the platform in creation order, which makes `since_id` a reliable
//! high-water mark.

use crate::storage::StateStore;
use crate::types::{normalize_keyword, Boundary, ResultId};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How a keyword should be searched this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Checkpoint {
    /// Search the whole time window (first search, or history unusable)
    FullWindow { window_days: u32 },

    /// Only fetch results newer than `since_id`
    Incremental { since_id: ResultId, window_days: u32 },
}

impl Checkpoint {
    pub fn since_id(&self) -> Option<ResultId> {
        match self {
            Checkpoint::FullWindow { .. } => None,
            Checkpoint::Incremental { since_id, .. } => Some(*since_id),
        }
    }

    pub fn window_days(&self) -> u32 {
        match self {
            Checkpoint::FullWindow { window_days } | Checkpoint::Incremental { window_days, .. } => {
                *window_days
            }
        }
    }
}

/// Coarse estimate of work avoided through checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedSavings {
    pub incremental_searches: u64,
    pub full_searches: u64,

    /// Calls that would have re-fetched already seen results
    pub duplicate_calls_avoided: u64,

    pub monthly_quota_saved_percent: f64,
}

/// Tracks the searched identifier range per keyword
pub struct BoundaryTracker {
    store: Arc<dyn StateStore>,
    boundaries: RwLock<HashMap<String, Boundary>>,
    // Held from mutation through the store write so saves land in order
    persist_lock: Mutex<()>,
    incremental_searches: AtomicU64,
    full_searches: AtomicU64,
}

impl BoundaryTracker {
    /// Start with no checkpoints
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_boundaries(store, HashMap::new())
    }

    /// Hydrate from the store; an unreadable store means every keyword gets a full search
    pub async fn load(store: Arc<dyn StateStore>) -> Self {
        let boundaries = match store.load_boundaries().await {
            Ok(boundaries) => boundaries,
            Err(e) => {
                warn!("Could not load search boundaries, starting fresh: {}", e);
                HashMap::new()
            }
        };
        debug!("Loaded {} search boundaries", boundaries.len());
        Self::with_boundaries(store, boundaries)
    }

    fn with_boundaries(store: Arc<dyn StateStore>, boundaries: HashMap<String, Boundary>) -> Self {
        Self {
            store,
            boundaries: RwLock::new(boundaries),
            persist_lock: Mutex::new(()),
            incremental_searches: AtomicU64::new(0),
            full_searches: AtomicU64::new(0),
        }
    }

    /// Checkpoint for searching `keyword` over the last `window_days`
    pub fn get_checkpoint(&self, keyword: &str, window_days: u32) -> Checkpoint {
        self.get_checkpoint_at(keyword, window_days, Utc::now())
    }

    /// Checkpoint as of `now`
    ///
    /// Falls back to a full-window search when the stored range covers a
    /// narrower window than requested, or when it is so old that its
    /// `since_id` lies outside the window.
    pub fn get_checkpoint_at(&self, keyword: &str, window_days: u32, now: DateTime<Utc>) -> Checkpoint {
        let key = normalize_keyword(keyword);
        let boundaries = self.boundaries.read();

        match boundaries.get(&key) {
            Some(b)
                if b.window_days >= window_days
                    && now - b.updated_at < Duration::days(window_days as i64) =>
            {
                Checkpoint::Incremental {
                    since_id: b.since_id,
                    window_days,
                }
            }
            _ => Checkpoint::FullWindow { window_days },
        }
    }

    /// Count one planned search toward [`estimated_savings`](Self::estimated_savings)
    pub fn record_search(&self, incremental: bool) {
        if incremental {
            self.incremental_searches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.full_searches.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stored range for a keyword
    pub fn boundary(&self, keyword: &str) -> Option<Boundary> {
        self.boundaries.read().get(&normalize_keyword(keyword)).cloned()
    }

    /// Widen a keyword's range to include `observed_ids`
    ///
    /// `since_id` only ever moves forward and `until_id` only backward. An
    /// empty id list leaves the boundary untouched.
    pub async fn update_checkpoint(
        &self,
        keyword: &str,
        observed_ids: &[ResultId],
        window_days: u32,
    ) -> Option<Boundary> {
        self.update_checkpoint_at(keyword, observed_ids, window_days, Utc::now())
            .await
    }

    pub async fn update_checkpoint_at(
        &self,
        keyword: &str,
        observed_ids: &[ResultId],
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Option<Boundary> {
        let newest = observed_ids.iter().copied().max()?;
        let oldest = observed_ids.iter().copied().min()?;
        let key = normalize_keyword(keyword);

        let _persist = self.persist_lock.lock().await;
        let updated = {
            let mut boundaries = self.boundaries.write();
            let boundary = boundaries
                .entry(key.clone())
                .and_modify(|b| {
                    b.since_id = b.since_id.max(newest);
                    b.until_id = b.until_id.min(oldest);
                    b.window_days = b.window_days.max(window_days);
                    b.updated_at = now;
                })
                .or_insert_with(|| Boundary {
                    since_id: newest,
                    until_id: oldest,
                    window_days,
                    updated_at: now,
                });
            boundary.clone()
        };

        debug!(
            keyword = %key,
            since_id = updated.since_id,
            until_id = updated.until_id,
            "Updated search boundary"
        );

        if let Err(e) = self.store.save_boundary(&key, &updated).await {
            warn!("Failed to persist boundary for '{}': {}", key, e);
        }
        Some(updated)
    }

    /// Forget a keyword's range so its next search covers the full window
    ///
    /// Used when the platform rejects a stored `since_id` as stale.
    pub async fn reset(&self, keyword: &str) {
        let key = normalize_keyword(keyword);
        let _persist = self.persist_lock.lock().await;
        let removed = self.boundaries.write().remove(&key);
        if removed.is_some() {
            info!("Reset search boundary for '{}'", key);
            if let Err(e) = self.store.remove_boundary(&key).await {
                warn!("Failed to remove persisted boundary for '{}': {}", key, e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.boundaries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.read().is_empty()
    }

    /// Estimate of duplicate fetches avoided, for observability only
    pub fn estimated_savings(&self, monthly_limit: u64) -> EstimatedSavings {
        let incremental = self.incremental_searches.load(Ordering::Relaxed);
        let full = self.full_searches.load(Ordering::Relaxed);
        let percent = if monthly_limit == 0 {
            0.0
        } else {
            incremental as f64 / monthly_limit as f64 * 100.0
        };

        EstimatedSavings {
            incremental_searches: incremental,
            full_searches: full,
            duplicate_calls_avoided: incremental,
            monthly_quota_saved_percent: percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoutError;
    use crate::storage::{MemoryStore, MockStateStore};

    fn tracker() -> (BoundaryTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (BoundaryTracker::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_first_search_is_full_window() {
        let (tracker, _) = tracker();
        assert_eq!(
            tracker.get_checkpoint("federalism", 7),
            Checkpoint::FullWindow { window_days: 7 }
        );
    }

    #[tokio::test]
    async fn test_incremental_after_update() {
        let (tracker, store) = tracker();
        tracker
            .update_checkpoint("Federalism", &[105, 100, 110], 7)
            .await;

        let checkpoint = tracker.get_checkpoint("federalism", 7);
        assert_eq!(checkpoint.since_id(), Some(110));

        let boundary = tracker.boundary("federalism").unwrap();
        assert_eq!(boundary.until_id, 100);
        assert!(store.snapshot().boundaries.contains_key("federalism"));
    }

    #[tokio::test]
    async fn test_since_id_never_decreases() {
        let (tracker, _) = tracker();
        tracker.update_checkpoint("rust", &[500], 7).await;
        tracker.update_checkpoint("rust", &[200, 300], 7).await;

        let boundary = tracker.boundary("rust").unwrap();
        assert_eq!(boundary.since_id, 500);
        assert_eq!(boundary.until_id, 200);
    }

    #[tokio::test]
    async fn test_empty_ids_are_noop() {
        let (tracker, _) = tracker();
        assert!(tracker.update_checkpoint("rust", &[], 7).await.is_none());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_wider_window_forces_full_search() {
        let (tracker, _) = tracker();
        tracker.update_checkpoint("rust", &[10], 3).await;
        assert!(matches!(
            tracker.get_checkpoint("rust", 7),
            Checkpoint::FullWindow { window_days: 7 }
        ));
        assert!(matches!(
            tracker.get_checkpoint("rust", 3),
            Checkpoint::Incremental { since_id: 10, .. }
        ));
    }

    #[tokio::test]
    async fn test_stale_boundary_forces_full_search() {
        let (tracker, _) = tracker();
        let long_ago = Utc::now() - Duration::days(30);
        tracker
            .update_checkpoint_at("rust", &[10], 7, long_ago)
            .await;
        assert!(tracker.get_checkpoint("rust", 7).since_id().is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_store() {
        let (tracker, store) = tracker();
        tracker.update_checkpoint("rust", &[10], 7).await;
        tracker.reset("RUST").await;

        assert!(tracker.boundary("rust").is_none());
        assert!(store.snapshot().boundaries.is_empty());
    }

    #[tokio::test]
    async fn test_savings_counts_incremental_searches() {
        let (tracker, _) = tracker();
        tracker.update_checkpoint("rust", &[10], 7).await;
        // Looking at a checkpoint is not a search
        tracker.get_checkpoint("rust", 7);
        tracker.record_search(true);
        tracker.record_search(true);
        tracker.record_search(false);

        let savings = tracker.estimated_savings(10_000);
        assert_eq!(savings.incremental_searches, 2);
        assert_eq!(savings.full_searches, 1);
        assert_eq!(savings.duplicate_calls_avoided, 2);
        assert!((savings.monthly_quota_saved_percent - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_load_failure_starts_empty() {
        let mut store = MockStateStore::new();
        store
            .expect_load_boundaries()
            .returning(|| Err(ScoutError::StoreUnavailable("down".to_string())));
        let tracker = BoundaryTracker::load(Arc::new(store)).await;
        assert!(tracker.is_empty());
    }
}
