//! Concurrent access to shared planner state
//!
//! Plans may execute several queries at once, so quota counters, boundaries
//! and keyword stats are updated from parallel tasks.

mod common;

use common::{memory_store, SlowBoundaryStore};
use scout_core::{
    BoundaryTracker, EffectivenessConfig, EffectivenessTracker, QuotaBudget, QuotaConfig,
    StateStore,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_quota_records_are_exact() {
    let store = memory_store();
    let budget = Arc::new(QuotaBudget::new(QuotaConfig::default(), store.clone()));

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let budget = budget.clone();
            tokio::spawn(async move { budget.record(3, i % 4 != 0).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = budget.stats().await.unwrap();
    assert_eq!(stats.monthly_used, 96);
    assert_eq!(stats.calls_recorded, 96);
    assert_eq!(stats.failed_calls, 24);
    assert_eq!(store.load_quota().await.unwrap().unwrap().monthly_used, 96);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_persisted_since_id_survives_slow_writer() {
    let store = Arc::new(SlowBoundaryStore::new(100, Duration::from_millis(200)));
    let tracker = Arc::new(BoundaryTracker::new(store.clone()));

    let older = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.update_checkpoint("rust", &[100], 7).await })
    };
    // Let the older write reach the stalled store first
    tokio::time::sleep(Duration::from_millis(50)).await;
    let newer = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.update_checkpoint("rust", &[200], 7).await })
    };
    older.await.unwrap();
    newer.await.unwrap();

    assert_eq!(tracker.boundary("rust").unwrap().since_id, 200);
    let persisted = store.load_boundaries().await.unwrap();
    assert_eq!(persisted["rust"].since_id, 200);

    let restarted = BoundaryTracker::load(store).await;
    assert_eq!(restarted.boundary("rust").unwrap().since_id, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_matches_all_persisted() {
    let store = memory_store();
    let tracker = Arc::new(EffectivenessTracker::new(
        EffectivenessConfig::default(),
        store.clone(),
    ));

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let tracker = tracker.clone();
            let keyword = if i % 2 == 0 { "federalism" } else { "tariffs" };
            tokio::spawn(async move { tracker.record_match(keyword, 7).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let persisted = store.load_stats().await.unwrap();
    assert_eq!(persisted["federalism"].hits, 20);
    assert_eq!(persisted["tariffs"].hits, 20);
    assert_eq!(tracker.stats("federalism").hits, 20);
}
