//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use scout_core::{
    Boundary, CachedResult, FetchedResult, KeywordStats, LearnedWeight, MemoryStore, QuotaState,
    Result, ResultId, ScoutError, StateStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A store whose every operation fails, as when the backing database is down
pub struct FailingStore;

fn down<T>() -> Result<T> {
    Err(ScoutError::StoreUnavailable("connection refused".to_string()))
}

#[async_trait]
impl StateStore for FailingStore {
    async fn load_quota(&self) -> Result<Option<QuotaState>> {
        down()
    }

    async fn save_quota(&self, _state: &QuotaState) -> Result<()> {
        down()
    }

    async fn load_weights(&self) -> Result<HashMap<String, LearnedWeight>> {
        down()
    }

    async fn save_weight(&self, _keyword: &str, _weight: &LearnedWeight) -> Result<()> {
        down()
    }

    async fn load_boundaries(&self) -> Result<HashMap<String, Boundary>> {
        down()
    }

    async fn save_boundary(&self, _keyword: &str, _boundary: &Boundary) -> Result<()> {
        down()
    }

    async fn remove_boundary(&self, _keyword: &str) -> Result<()> {
        down()
    }

    async fn load_stats(&self) -> Result<HashMap<String, KeywordStats>> {
        down()
    }

    async fn save_stats(&self, _keyword: &str, _stats: &KeywordStats) -> Result<()> {
        down()
    }

    async fn load_cached(&self) -> Result<Vec<CachedResult>> {
        down()
    }

    async fn save_cached(&self, _results: &[CachedResult]) -> Result<()> {
        down()
    }

    async fn remove_cached(&self, _ids: &[ResultId]) -> Result<()> {
        down()
    }
}

/// An in-memory store whose boundary writes for one `since_id` stall
///
/// Lets a test hold one writer inside the store while another races past it.
pub struct SlowBoundaryStore {
    pub inner: MemoryStore,
    pub slow_since_id: ResultId,
    pub delay: Duration,
}

impl SlowBoundaryStore {
    pub fn new(slow_since_id: ResultId, delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            slow_since_id,
            delay,
        }
    }
}

#[async_trait]
impl StateStore for SlowBoundaryStore {
    async fn load_quota(&self) -> Result<Option<QuotaState>> {
        self.inner.load_quota().await
    }

    async fn save_quota(&self, state: &QuotaState) -> Result<()> {
        self.inner.save_quota(state).await
    }

    async fn load_weights(&self) -> Result<HashMap<String, LearnedWeight>> {
        self.inner.load_weights().await
    }

    async fn save_weight(&self, keyword: &str, weight: &LearnedWeight) -> Result<()> {
        self.inner.save_weight(keyword, weight).await
    }

    async fn load_boundaries(&self) -> Result<HashMap<String, Boundary>> {
        self.inner.load_boundaries().await
    }

    async fn save_boundary(&self, keyword: &str, boundary: &Boundary) -> Result<()> {
        if boundary.since_id == self.slow_since_id {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.save_boundary(keyword, boundary).await
    }

    async fn remove_boundary(&self, keyword: &str) -> Result<()> {
        self.inner.remove_boundary(keyword).await
    }

    async fn load_stats(&self) -> Result<HashMap<String, KeywordStats>> {
        self.inner.load_stats().await
    }

    async fn save_stats(&self, keyword: &str, stats: &KeywordStats) -> Result<()> {
        self.inner.save_stats(keyword, stats).await
    }

    async fn load_cached(&self) -> Result<Vec<CachedResult>> {
        self.inner.load_cached().await
    }

    async fn save_cached(&self, results: &[CachedResult]) -> Result<()> {
        self.inner.save_cached(results).await
    }

    async fn remove_cached(&self, ids: &[ResultId]) -> Result<()> {
        self.inner.remove_cached(ids).await
    }
}

/// Fresh in-memory store
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// A fetched result created now
pub fn fetched(id: ResultId, text: &str) -> FetchedResult {
    FetchedResult {
        id,
        text: text.to_string(),
        created_at: Utc::now(),
        metadata: serde_json::json!({ "source": "test" }),
    }
}

/// Seed monthly quota usage directly in the store
pub async fn seed_monthly_usage(store: &dyn StateStore, used: u64) {
    let mut state = QuotaState::new(Utc::now());
    state.monthly_used = used;
    store
        .save_quota(&state)
        .await
        .expect("Failed to seed quota state");
}
