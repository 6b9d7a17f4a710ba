//! Persistence for keyword-scout state
//!
//! Quota counters, learned weights, search boundaries, keyword statistics
//! and cached results all outlive a single run. Components talk to a
//! [`StateStore`] and never assume a particular database; anything with
//! point lookups and writes can back it.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{Boundary, CachedResult, KeywordStats, LearnedWeight, QuotaState, ResultId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Storage backend trait defining all persisted state families
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current quota counters, `None` if never written
    async fn load_quota(&self) -> Result<Option<QuotaState>>;

    /// Overwrite quota counters
    async fn save_quota(&self, state: &QuotaState) -> Result<()>;

    /// All learned weights keyed by normalized keyword
    async fn load_weights(&self) -> Result<HashMap<String, LearnedWeight>>;

    /// Upsert one learned weight
    async fn save_weight(&self, keyword: &str, weight: &LearnedWeight) -> Result<()>;

    /// All search boundaries keyed by normalized keyword
    async fn load_boundaries(&self) -> Result<HashMap<String, Boundary>>;

    /// Upsert one boundary
    async fn save_boundary(&self, keyword: &str, boundary: &Boundary) -> Result<()>;

    /// Forget a boundary (explicit reset)
    async fn remove_boundary(&self, keyword: &str) -> Result<()>;

    /// All keyword statistics keyed by normalized keyword
    async fn load_stats(&self) -> Result<HashMap<String, KeywordStats>>;

    /// Upsert one keyword's statistics
    async fn save_stats(&self, keyword: &str, stats: &KeywordStats) -> Result<()>;

    /// Every cached result
    async fn load_cached(&self) -> Result<Vec<CachedResult>>;

    /// Insert or replace a batch of cached results in one write
    async fn save_cached(&self, results: &[CachedResult]) -> Result<()>;

    /// Drop a batch of cached results in one write
    async fn remove_cached(&self, ids: &[ResultId]) -> Result<()>;
}

/// Complete persisted state, shared by the bundled backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub quota: Option<QuotaState>,
    pub weights: HashMap<String, LearnedWeight>,
    pub boundaries: HashMap<String, Boundary>,
    pub stats: HashMap<String, KeywordStats>,
    pub cache: HashMap<ResultId, CachedResult>,
}
