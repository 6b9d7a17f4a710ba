//! Keyword Scout - Search Budget Optimizer
//!
//! Decides which search terms to query against a rate- and quota-limited
//! search API, how to combine them and how often, and learns from
//! downstream relevance feedback which terms deserve budget next time.
//!
//! # Architecture
//!
//! - **Query**: renders keywords and filters into protocol-legal query strings
//! - **Quota**: monthly and windowed call budgets with a safety margin
//! - **Boundary**: per-keyword checkpoints that avoid re-fetching
//! - **Cache**: deduplicating, age-bounded store of fetched results
//! - **Effectiveness**: per-keyword outcome tracking and scoring
//! - **Learning**: cross-run weights with decay and exploration
//! - **Planner**: tiered, budget-checked search plans composing all of the above
//!
//! No network calls happen here. The caller executes queries and reports
//! what came back.
//!
//! # Example
//!
//! ```ignore
//! use scout_core::{Keyword, MemoryStore, QueryOutcome, ScoutConfig, SearchPlanner};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let planner = SearchPlanner::load(&ScoutConfig::default(), store).await;
//!
//!     let plan = planner
//!         .plan_with_learning(&[Keyword::new("federalism", 0.95)], 200, 7)
//!         .await;
//!
//!     let mut run = plan.start_run();
//!     for query in plan.queries() {
//!         if !run.should_execute(query.phase) {
//!             break;
//!         }
//!         let results = search_api(&query.query, query.since_id).await?;
//!         let outcome = QueryOutcome::Results { results, calls: query.estimated_calls };
//!         planner.record_outcome(&mut run, query, outcome).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod boundary;
pub mod cache;
pub mod config;
pub mod effectiveness;
pub mod error;
pub mod learning;
pub mod planner;
pub mod query;
pub mod quota;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use boundary::{BoundaryTracker, Checkpoint, EstimatedSavings};
pub use cache::{CacheStats, ResultCache};
pub use config::{
    CacheConfig, ConfigError, EffectivenessConfig, LearningConfig, PlannerConfig, QueryConfig,
    QuotaConfig, ScoutConfig,
};
pub use effectiveness::{EffectivenessTracker, KeywordReport, Trend};
pub use error::{Result, ScoutError};
pub use learning::WeightLearner;
pub use planner::{
    MergedResult, PhasePlan, PlannedQuery, QueryOutcome, RunTracker, SearchPlan, SearchPlanner,
};
pub use query::{BuiltQuery, FilterWarning, QueryBuilder, WarningKind};
pub use quota::{QuotaBudget, QuotaCheck, QuotaHealth, QuotaStats};
pub use storage::{JsonFileStore, MemoryStore, StateStore};
pub use types::{
    Boundary, CachedResult, FetchedResult, Filters, Keyword, KeywordStats, LearnedWeight, Phase,
    QuotaState, ResultId,
};
