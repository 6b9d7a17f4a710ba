//! Directory-backed state store
//!
//! Each state family is kept in its own JSON document inside the state
//! directory:
//!
//! ```text
//! <dir>/quota.json        QuotaState
//! <dir>/weights.json      keyword -> LearnedWeight
//! <dir>/boundaries.json   keyword -> Boundary
//! <dir>/stats.json        keyword -> KeywordStats
//! <dir>/cache.json        id -> CachedResult
//! ```
//!
//! Reads are served from memory; every write rewrites the affected document
//! through a temp file and rename so a crash never leaves half a file behind.

use super::{StateSnapshot, StateStore};
use crate::error::{Result, ScoutError};
use crate::types::{Boundary, CachedResult, KeywordStats, LearnedWeight, QuotaState, ResultId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const QUOTA_FILE: &str = "quota.json";
const WEIGHTS_FILE: &str = "weights.json";
const BOUNDARIES_FILE: &str = "boundaries.json";
const STATS_FILE: &str = "stats.json";
const CACHE_FILE: &str = "cache.json";

/// State store persisted as JSON documents in a directory
pub struct JsonFileStore {
    dir: PathBuf,
    state: RwLock<StateSnapshot>,
    // Serializes document rewrites so an older snapshot never lands last
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or create) a state directory and load whatever it holds
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| unavailable(&dir, "create state directory", e))?;

        let snapshot = StateSnapshot {
            quota: read_document(&dir, QUOTA_FILE).await?,
            weights: read_document(&dir, WEIGHTS_FILE).await?.unwrap_or_default(),
            boundaries: read_document(&dir, BOUNDARIES_FILE)
                .await?
                .unwrap_or_default(),
            stats: read_document(&dir, STATS_FILE).await?.unwrap_or_default(),
            cache: read_document(&dir, CACHE_FILE).await?.unwrap_or_default(),
        };

        info!(
            "Opened state directory {} ({} weights, {} boundaries, {} stats, {} cached)",
            dir.display(),
            snapshot.weights.len(),
            snapshot.boundaries.len(),
            snapshot.stats.len(),
            snapshot.cache.len()
        );

        Ok(Self {
            dir,
            state: RwLock::new(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    /// Directory this store writes to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn persist<T, F>(&self, file: &str, select: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(&StateSnapshot) -> &T,
    {
        let _guard = self.write_lock.lock().await;
        let json = {
            let state = self.state.read();
            serde_json::to_vec_pretty(select(&*state))?
        };

        let target = self.dir.join(file);
        let tmp = self.dir.join(format!("{}.tmp", file));
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| unavailable(&tmp, "write", e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| unavailable(&target, "replace", e))?;

        debug!("Persisted {} ({} bytes)", target.display(), json.len());
        Ok(())
    }
}

async fn read_document<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Option<T>> {
    let path = dir.join(file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(unavailable(&path, "read", e)),
    }
}

fn unavailable(path: &Path, action: &str, err: std::io::Error) -> ScoutError {
    ScoutError::StoreUnavailable(format!("failed to {} {}: {}", action, path.display(), err))
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_quota(&self) -> Result<Option<QuotaState>> {
        Ok(self.state.read().quota.clone())
    }

    async fn save_quota(&self, state: &QuotaState) -> Result<()> {
        self.state.write().quota = Some(state.clone());
        self.persist(QUOTA_FILE, |s| &s.quota).await
    }

    async fn load_weights(&self) -> Result<HashMap<String, LearnedWeight>> {
        Ok(self.state.read().weights.clone())
    }

    async fn save_weight(&self, keyword: &str, weight: &LearnedWeight) -> Result<()> {
        self.state
            .write()
            .weights
            .insert(keyword.to_string(), weight.clone());
        self.persist(WEIGHTS_FILE, |s| &s.weights).await
    }

    async fn load_boundaries(&self) -> Result<HashMap<String, Boundary>> {
        Ok(self.state.read().boundaries.clone())
    }

    async fn save_boundary(&self, keyword: &str, boundary: &Boundary) -> Result<()> {
        self.state
            .write()
            .boundaries
            .insert(keyword.to_string(), boundary.clone());
        self.persist(BOUNDARIES_FILE, |s| &s.boundaries).await
    }

    async fn remove_boundary(&self, keyword: &str) -> Result<()> {
        self.state.write().boundaries.remove(keyword);
        self.persist(BOUNDARIES_FILE, |s| &s.boundaries).await
    }

    async fn load_stats(&self) -> Result<HashMap<String, KeywordStats>> {
        Ok(self.state.read().stats.clone())
    }

    async fn save_stats(&self, keyword: &str, stats: &KeywordStats) -> Result<()> {
        self.state
            .write()
            .stats
            .insert(keyword.to_string(), stats.clone());
        self.persist(STATS_FILE, |s| &s.stats).await
    }

    async fn load_cached(&self) -> Result<Vec<CachedResult>> {
        Ok(self.state.read().cache.values().cloned().collect())
    }

    async fn save_cached(&self, results: &[CachedResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        {
            let mut state = self.state.write();
            for result in results {
                state.cache.insert(result.id, result.clone());
            }
        }
        self.persist(CACHE_FILE, |s| &s.cache).await
    }

    async fn remove_cached(&self, ids: &[ResultId]) -> Result<()> {
        let removed = {
            let mut state = self.state.write();
            ids.iter()
                .filter(|id| state.cache.remove(id).is_some())
                .count()
        };
        if removed == 0 {
            return Ok(());
        }
        self.persist(CACHE_FILE, |s| &s.cache).await
    }
}
