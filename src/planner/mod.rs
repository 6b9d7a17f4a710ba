//! Tiered, budget-aware search planning
//!
//! The planner composes every other component:
//!
//! 1. Keywords are deduplicated and split into priority phases by weight.
//! 2. Within a phase, keywords sharing a word are grouped and rendered into
//!    as few queries as the platform limits allow.
//! 3. Each query gets a checkpoint so repeated searches only fetch new
//!    results.
//! 4. The plan is trimmed from the tail until the quota budget can pay for
//!    it.
//!
//! Executing a plan is the caller's job. [`SearchPlan::start_run`] and
//! [`SearchPlanner::record_outcome`] close the loop: results are merged and
//! cached, checkpoints advance, matches are counted and quota is charged.

pub mod grouping;
pub mod run;

pub use grouping::group_by_tokens;
pub use run::{AbsorbSummary, MergedResult, RunTracker};

use crate::boundary::BoundaryTracker;
use crate::cache::ResultCache;
use crate::config::{PlannerConfig, ScoutConfig};
use crate::effectiveness::EffectivenessTracker;
use crate::learning::WeightLearner;
use crate::query::{sanitize_filters, validate_filters, FilterWarning, QueryBuilder};
use crate::quota::QuotaBudget;
use crate::storage::StateStore;
use crate::types::{
    normalize_keyword, CachedResult, FetchedResult, Filters, Keyword, Phase, ResultId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One rendered query and what it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub query: String,

    /// Normalized keywords rendered into the query, highest weight first
    pub keywords: Vec<String>,

    pub phase: Phase,

    /// Only fetch results newer than this, when every keyword has a checkpoint
    pub since_id: Option<ResultId>,

    pub window_days: u32,

    /// API calls needed to page through the requested results
    pub estimated_calls: u64,

    /// The query's single term was shortened to fit the length limit
    pub truncated: bool,
}

impl PlannedQuery {
    /// The same query with no checkpoint, for retry after a rejected `since_id`
    pub fn without_boundary(&self) -> Self {
        Self {
            since_id: None,
            ..self.clone()
        }
    }
}

/// Queries for one priority band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub phase: Phase,

    /// Execute only if earlier phases fell short of the target
    pub conditional: bool,

    pub queries: Vec<PlannedQuery>,
}

impl PhasePlan {
    pub fn estimated_calls(&self) -> u64 {
        self.queries.iter().map(|q| q.estimated_calls).sum()
    }
}

/// An ordered, budget-checked set of queries for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    /// Non-empty phases in execution order
    pub phases: Vec<PhasePlan>,

    /// Unique results after which the run should stop
    pub target_results: u64,

    pub window_days: u32,

    /// Filters as rendered, after sanitizing
    pub filters: Filters,

    pub warnings: Vec<FilterWarning>,

    /// The plan was cut down to fit the quota budget
    pub quota_limited: bool,

    /// Why the plan was cut, when it was
    pub budget_note: Option<String>,

    /// Recommended in-flight search calls
    pub max_concurrency: usize,

    pub created_at: DateTime<Utc>,
}

impl SearchPlan {
    pub fn total_queries(&self) -> usize {
        self.phases.iter().map(|p| p.queries.len()).sum()
    }

    pub fn estimated_calls(&self) -> u64 {
        self.phases.iter().map(PhasePlan::estimated_calls).sum()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhasePlan> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// Keywords covered by `phase`, in query order
    pub fn keywords_in(&self, phase: Phase) -> Vec<&str> {
        self.phase(phase)
            .map(|p| {
                p.queries
                    .iter()
                    .flat_map(|q| q.keywords.iter().map(String::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn queries(&self) -> impl Iterator<Item = &PlannedQuery> {
        self.phases.iter().flat_map(|p| p.queries.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.total_queries() == 0
    }

    /// Begin tracking an execution of this plan
    pub fn start_run(&self) -> RunTracker {
        RunTracker::new(self.target_results)
    }

    /// Drop queries from the tail until the plan costs at most `available` calls
    fn trim_to(&mut self, available: u64) -> usize {
        let mut removed = 0;
        while self.estimated_calls() > available {
            let Some(last) = self.phases.last_mut() else {
                break;
            };
            if last.queries.pop().is_some() {
                removed += 1;
            }
            if last.queries.is_empty() {
                self.phases.pop();
            }
        }
        removed
    }
}

/// How an executed query went
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The platform answered; `calls` pages were consumed
    Results {
        results: Vec<FetchedResult>,
        calls: u64,
    },

    /// The platform refused the query's `since_id` as stale
    BoundaryRejected,

    /// Transport or platform error
    Failed,
}

/// Builds search plans and folds their outcomes back into state
pub struct SearchPlanner {
    config: PlannerConfig,
    default_filters: Filters,
    builder: QueryBuilder,
    quota: Arc<QuotaBudget>,
    boundaries: Arc<BoundaryTracker>,
    tracker: Arc<EffectivenessTracker>,
    learner: Arc<WeightLearner>,
    cache: Arc<ResultCache>,
}

impl SearchPlanner {
    /// Assemble a planner from already constructed components
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        config: PlannerConfig,
        default_filters: Filters,
        builder: QueryBuilder,
        quota: Arc<QuotaBudget>,
        boundaries: Arc<BoundaryTracker>,
        tracker: Arc<EffectivenessTracker>,
        learner: Arc<WeightLearner>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            config,
            default_filters,
            builder,
            quota,
            boundaries,
            tracker,
            learner,
            cache,
        }
    }

    /// Construct every component over one store, hydrating persisted state
    pub async fn load(config: &ScoutConfig, store: Arc<dyn StateStore>) -> Self {
        let quota = QuotaBudget::new(config.quota.clone(), store.clone());
        let boundaries = BoundaryTracker::load(store.clone()).await;
        let tracker = EffectivenessTracker::load(config.effectiveness.clone(), store.clone()).await;
        let learner = WeightLearner::load(config.learning.clone(), store.clone()).await;
        let cache = ResultCache::load(&config.cache, store).await;

        Self::from_parts(
            config.planner.clone(),
            config.query.filters.clone(),
            QueryBuilder::new(&config.query),
            Arc::new(quota),
            Arc::new(boundaries),
            Arc::new(tracker),
            Arc::new(learner),
            Arc::new(cache),
        )
    }

    pub fn quota(&self) -> &Arc<QuotaBudget> {
        &self.quota
    }

    pub fn boundaries(&self) -> &Arc<BoundaryTracker> {
        &self.boundaries
    }

    pub fn tracker(&self) -> &Arc<EffectivenessTracker> {
        &self.tracker
    }

    pub fn learner(&self) -> &Arc<WeightLearner> {
        &self.learner
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Plan with the configured default filters
    pub async fn plan(&self, keywords: &[Keyword], total_budget: u64, window_days: u32) -> SearchPlan {
        let filters = self.default_filters.clone();
        self.plan_with_filters(keywords, total_budget, window_days, &filters)
            .await
    }

    /// Replace proposed weights with learned ones, then plan
    pub async fn plan_with_learning(
        &self,
        keywords: &[Keyword],
        total_budget: u64,
        window_days: u32,
    ) -> SearchPlan {
        let learned = self.learner.apply_learned_weights(keywords);
        self.plan(&learned, total_budget, window_days).await
    }

    /// Fold everything the effectiveness tracker has seen into learned weights
    pub async fn learn(&self) -> usize {
        let reports = self.tracker.all_reports();
        self.learner.learn_from_reports(&reports).await
    }

    pub async fn plan_with_filters(
        &self,
        keywords: &[Keyword],
        total_budget: u64,
        window_days: u32,
        filters: &Filters,
    ) -> SearchPlan {
        let mut requested = filters.clone();
        requested.days_back = window_days;
        let warnings = validate_filters(&requested);
        for warning in &warnings {
            warn!("Filter warning: {}", warning);
        }
        let filters = sanitize_filters(&requested);
        let window_days = filters.days_back;

        let keywords = dedupe(keywords);
        let calls_per_query = self.calls_per_query(total_budget);

        let mut phases = Vec::new();
        for (phase, members) in self.tier(keywords) {
            let queries = self.build_phase(phase, &members, &filters, window_days, calls_per_query);
            if !queries.is_empty() {
                phases.push(PhasePlan {
                    phase,
                    conditional: phase.is_conditional(),
                    queries,
                });
            }
        }

        let mut plan = SearchPlan {
            phases,
            target_results: total_budget,
            window_days,
            filters,
            warnings,
            quota_limited: false,
            budget_note: None,
            max_concurrency: self.config.max_concurrency,
            created_at: Utc::now(),
        };

        let required = plan.estimated_calls();
        if required > 0 {
            let check = self.quota.check_available(required).await;
            if !check.ok {
                let removed = plan.trim_to(check.available);
                warn!(
                    "Plan trimmed by {} queries to fit quota: {}",
                    removed, check.reason
                );
                plan.quota_limited = true;
                plan.budget_note = Some(check.reason);
            }
        }

        for query in plan.queries() {
            self.boundaries.record_search(query.since_id.is_some());
        }

        info!(
            phases = plan.phases.len(),
            queries = plan.total_queries(),
            calls = plan.estimated_calls(),
            quota_limited = plan.quota_limited,
            "Built search plan"
        );
        plan
    }

    /// Pages needed per query, never more than the run could use
    fn calls_per_query(&self, total_budget: u64) -> u64 {
        let wanted = u64::from(self.config.results_per_query).min(total_budget.max(1));
        let page = u64::from(self.config.page_size.max(1));
        wanted.div_ceil(page).max(1)
    }

    /// Split weight-sorted keywords into phases
    fn tier(&self, keywords: Vec<Keyword>) -> Vec<(Phase, Vec<Keyword>)> {
        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut low = Vec::new();

        for keyword in keywords {
            if keyword.weight >= self.config.high_threshold {
                high.push(keyword);
            } else if keyword.weight >= self.config.medium_threshold {
                medium.push(keyword);
            } else {
                low.push(keyword);
            }
        }

        if low.len() > self.config.low_priority_cap {
            let skipped: Vec<String> = low
                .drain(self.config.low_priority_cap..)
                .map(|k| k.term)
                .collect();
            debug!(
                "Low priority phase capped at {}, skipping {:?}",
                self.config.low_priority_cap, skipped
            );
        }

        vec![
            (Phase::HighPriority, high),
            (Phase::MediumPriority, medium),
            (Phase::LowPriority, low),
        ]
    }

    fn build_phase(
        &self,
        phase: Phase,
        keywords: &[Keyword],
        filters: &Filters,
        window_days: u32,
        calls_per_query: u64,
    ) -> Vec<PlannedQuery> {
        let mut queries = Vec::new();

        for group in group_by_tokens(keywords) {
            let mut pending = group;
            while !pending.is_empty() {
                let built = match self.builder.build_query(&pending, filters) {
                    Ok(built) => built,
                    Err(e) => {
                        warn!("Skipping keyword group in {}: {}", phase, e);
                        break;
                    }
                };
                if built.included.is_empty() {
                    break;
                }

                queries.push(PlannedQuery {
                    since_id: self.shared_since_id(&built.included, window_days),
                    query: built.query,
                    keywords: built.included,
                    phase,
                    window_days,
                    estimated_calls: calls_per_query,
                    truncated: built.truncated,
                });

                // Anything that did not fit goes into a follow-up query
                pending.retain(|k| built.dropped.contains(&k.term));
            }
        }

        queries
    }

    /// Lowest checkpoint among `keywords`, or none if any lacks one
    fn shared_since_id(&self, keywords: &[String], window_days: u32) -> Option<ResultId> {
        keywords
            .iter()
            .map(|k| self.boundaries.get_checkpoint(k, window_days).since_id())
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .min()
    }

    /// Fold one executed query into the run and persisted state
    ///
    /// Returns a retry query when the platform rejected the checkpoint.
    pub async fn record_outcome(
        &self,
        run: &mut RunTracker,
        query: &PlannedQuery,
        outcome: QueryOutcome,
    ) -> Option<PlannedQuery> {
        match outcome {
            QueryOutcome::Results { results, calls } => {
                self.quota.record(calls, true).await;
                let summary = run.absorb(query, &results);

                let fetched_at = Utc::now();
                let cached: Vec<CachedResult> = results
                    .iter()
                    .map(|result| {
                        let primary = run
                            .get(result.id)
                            .map(|m| m.primary_keyword.clone())
                            .unwrap_or_default();
                        CachedResult::from_fetched(result.clone(), &primary, fetched_at)
                    })
                    .collect();
                self.cache.insert_all(cached).await;

                let ids: Vec<ResultId> = results.iter().map(|r| r.id).collect();
                for keyword in &query.keywords {
                    self.boundaries
                        .update_checkpoint(keyword, &ids, query.window_days)
                        .await;
                }

                for (keyword, _) in &summary.matches {
                    self.tracker.record_match(keyword, query.window_days).await;
                }

                debug!(
                    phase = %query.phase,
                    new = summary.new_results,
                    duplicates = summary.duplicates,
                    unique = run.unique_count(),
                    "Recorded query results"
                );
                None
            }
            QueryOutcome::BoundaryRejected => {
                self.quota.record(1, false).await;
                for keyword in &query.keywords {
                    self.boundaries.reset(keyword).await;
                }
                info!(
                    "Checkpoint rejected for {:?}, retrying without boundary",
                    query.keywords
                );
                Some(query.without_boundary())
            }
            QueryOutcome::Failed => {
                self.quota.record(1, false).await;
                warn!("Query failed: {}", query.query);
                None
            }
        }
    }
}

/// Merge case-folded duplicates keeping the highest weight, sorted by weight
fn dedupe(keywords: &[Keyword]) -> Vec<Keyword> {
    let mut merged: HashMap<String, f64> = HashMap::new();
    for keyword in keywords {
        let term = normalize_keyword(&keyword.term);
        if term.is_empty() {
            continue;
        }
        let weight = merged.entry(term).or_insert(keyword.weight);
        *weight = weight.max(keyword.weight);
    }

    let mut deduped: Vec<Keyword> = merged
        .into_iter()
        .map(|(term, weight)| Keyword::new(term, weight))
        .collect();
    deduped.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.term.cmp(&b.term))
    });
    deduped
}
