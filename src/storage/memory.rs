//! In-process state store

use super::{StateSnapshot, StateStore};
use crate::error::Result;
use crate::types::{Boundary, CachedResult, KeywordStats, LearnedWeight, QuotaState, ResultId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// State store that lives only as long as the process
///
/// Useful for tests and for callers that persist state some other way.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StateSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from an existing snapshot
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Copy of everything currently stored
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.read().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_quota(&self) -> Result<Option<QuotaState>> {
        Ok(self.state.read().quota.clone())
    }

    async fn save_quota(&self, state: &QuotaState) -> Result<()> {
        self.state.write().quota = Some(state.clone());
        Ok(())
    }

    async fn load_weights(&self) -> Result<HashMap<String, LearnedWeight>> {
        Ok(self.state.read().weights.clone())
    }

    async fn save_weight(&self, keyword: &str, weight: &LearnedWeight) -> Result<()> {
        self.state
            .write()
            .weights
            .insert(keyword.to_string(), weight.clone());
        Ok(())
    }

    async fn load_boundaries(&self) -> Result<HashMap<String, Boundary>> {
        Ok(self.state.read().boundaries.clone())
    }

    async fn save_boundary(&self, keyword: &str, boundary: &Boundary) -> Result<()> {
        self.state
            .write()
            .boundaries
            .insert(keyword.to_string(), boundary.clone());
        Ok(())
    }

    async fn remove_boundary(&self, keyword: &str) -> Result<()> {
        self.state.write().boundaries.remove(keyword);
        Ok(())
    }

    async fn load_stats(&self) -> Result<HashMap<String, KeywordStats>> {
        Ok(self.state.read().stats.clone())
    }

    async fn save_stats(&self, keyword: &str, stats: &KeywordStats) -> Result<()> {
        self.state
            .write()
            .stats
            .insert(keyword.to_string(), stats.clone());
        Ok(())
    }

    async fn load_cached(&self) -> Result<Vec<CachedResult>> {
        Ok(self.state.read().cache.values().cloned().collect())
    }

    async fn save_cached(&self, results: &[CachedResult]) -> Result<()> {
        let mut state = self.state.write();
        for result in results {
            state.cache.insert(result.id, result.clone());
        }
        Ok(())
    }

    async fn remove_cached(&self, ids: &[ResultId]) -> Result<()> {
        let mut state = self.state.write();
        for id in ids {
            state.cache.remove(id);
        }
        Ok(())
    }
}
