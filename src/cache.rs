//! Deduplicating result cache
//!
//! Holds every result fetched in recent runs, keyed by its platform id.
//! Inserting an id that is already present is a no-op, which makes the
//! cache the deduplication point across repeated searches. Entries expire
//! after a fixed retention window and the least recently used entry is
//! evicted once capacity is reached.
//!
//! The cache also supports deterministic replay: [`ResultCache::by_keyword`]
//! returns what a keyword matched without touching the search API.

use crate::config::CacheConfig;
use crate::storage::StateStore;
use crate::types::{normalize_keyword, CachedResult, FetchedResult, ResultId};
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache occupancy and hit counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// LRU cache of fetched results with age-based expiry
pub struct ResultCache {
    store: Arc<dyn StateStore>,
    entries: Mutex<LruCache<ResultId, CachedResult>>,
    retention: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Empty cache
    pub fn new(config: &CacheConfig, store: Arc<dyn StateStore>) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            entries: Mutex::new(LruCache::new(capacity)),
            retention: config.retention(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Hydrate from the store, skipping anything past retention
    ///
    /// Entries that expired or no longer fit are deleted from the store too,
    /// so the persisted cache stays bounded. An unreadable store yields an
    /// empty cache: every entry is assumed expired.
    pub async fn load(config: &CacheConfig, store: Arc<dyn StateStore>) -> Self {
        let cache = Self::new(config, store.clone());
        let stored = match store.load_cached().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not load result cache, starting empty: {}", e);
                return cache;
            }
        };

        let now = Utc::now();
        let (mut live, expired): (Vec<_>, Vec<_>) =
            stored.into_iter().partition(|r| !cache.is_expired(r, now));
        let mut stale: Vec<ResultId> = expired.iter().map(|r| r.id).collect();
        let expired_count = stale.len();

        // Oldest first so the newest end up most recently used
        live.sort_by_key(|r| r.fetched_at);
        {
            let mut entries = cache.entries.lock();
            for result in live {
                if let Some((evicted, _)) = entries.push(result.id, result) {
                    stale.push(evicted);
                }
            }
        }

        if !stale.is_empty() {
            if let Err(e) = store.remove_cached(&stale).await {
                warn!("Failed to drop {} stale cached results: {}", stale.len(), e);
            }
        }
        debug!(
            "Loaded {} cached results ({} expired, {} over capacity)",
            cache.len(),
            expired_count,
            stale.len() - expired_count
        );
        cache
    }

    fn is_expired(&self, result: &CachedResult, now: DateTime<Utc>) -> bool {
        now - result.fetched_at >= self.retention
    }

    /// Cache a freshly fetched result under the keyword that matched it
    pub async fn insert_fetched(&self, result: FetchedResult, keyword: &str) -> bool {
        self.insert(CachedResult::from_fetched(result, keyword, Utc::now()))
            .await
    }

    /// Insert a result unless its id is already cached
    ///
    /// Returns `true` when the result was new. Results already past
    /// retention are not stored.
    pub async fn insert(&self, result: CachedResult) -> bool {
        self.insert_all(vec![result]).await == 1
    }

    /// Insert a batch of results with a single store write
    ///
    /// Returns how many new results are cached once the batch settles.
    pub async fn insert_all(&self, results: Vec<CachedResult>) -> usize {
        let now = Utc::now();
        let (saved, evicted) = {
            let mut entries = self.entries.lock();
            let mut inserted = Vec::new();
            let mut evicted = Vec::new();

            for result in results {
                if self.is_expired(&result, now) {
                    debug!("Skipping expired result {}", result.id);
                    continue;
                }
                let live = entries
                    .peek(&result.id)
                    .map(|existing| !self.is_expired(existing, now));
                match live {
                    Some(true) => continue,
                    Some(false) => {
                        entries.pop(&result.id);
                    }
                    None => {}
                }
                inserted.push(result.id);
                if let Some((evicted_id, _)) = entries.push(result.id, result) {
                    debug!("Evicted result {} at capacity", evicted_id);
                    evicted.push(evicted_id);
                }
            }

            // A batch larger than capacity can evict its own members
            let saved: Vec<CachedResult> = inserted
                .iter()
                .filter_map(|id| entries.peek(id).cloned())
                .collect();
            let evicted: Vec<ResultId> = evicted
                .into_iter()
                .filter(|id| !entries.contains(id))
                .collect();
            (saved, evicted)
        };

        if !evicted.is_empty() {
            if let Err(e) = self.store.remove_cached(&evicted).await {
                warn!("Failed to remove {} evicted results: {}", evicted.len(), e);
            }
        }
        if !saved.is_empty() {
            if let Err(e) = self.store.save_cached(&saved).await {
                warn!("Failed to persist {} cached results: {}", saved.len(), e);
            }
        }
        saved.len()
    }

    /// Look up a live entry, marking it recently used
    pub fn get(&self, id: ResultId) -> Option<CachedResult> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let found = entries
            .get(&id)
            .filter(|r| !self.is_expired(r, now))
            .cloned();

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Whether a live entry exists, without touching recency
    pub fn contains(&self, id: ResultId) -> bool {
        let now = Utc::now();
        self.entries
            .lock()
            .peek(&id)
            .is_some_and(|r| !self.is_expired(r, now))
    }

    /// Live results first matched by `keyword`, newest first
    pub fn by_keyword(&self, keyword: &str) -> Vec<CachedResult> {
        let key = normalize_keyword(keyword);
        let now = Utc::now();
        let mut matched: Vec<CachedResult> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, r)| r.matched_keyword == key && !self.is_expired(r, now))
            .map(|(_, r)| r.clone())
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matched
    }

    /// Drop every entry past retention, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<ResultId> = {
            let mut entries = self.entries.lock();
            let ids: Vec<ResultId> = entries
                .iter()
                .filter(|(_, r)| self.is_expired(r, now))
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                entries.pop(id);
            }
            ids
        };

        if !expired.is_empty() {
            if let Err(e) = self.store.remove_cached(&expired).await {
                warn!("Failed to remove {} expired results: {}", expired.len(), e);
            }
            debug!("Purged {} expired results", expired.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            entries: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
