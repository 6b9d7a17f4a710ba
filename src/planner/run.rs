//! Per-run execution bookkeeping
//!
//! A [`RunTracker`] follows one execution of a [`SearchPlan`](super::SearchPlan):
//! it merges results across queries by id, attributes each result to the
//! keywords that matched it, and tells the caller when the run's result
//! budget has been met.

use super::PlannedQuery;
use crate::types::{normalize_keyword, tokenize, FetchedResult, Phase, ResultId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A unique result with the keywords that matched it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub result: FetchedResult,

    /// Keyword credited with the first match
    pub primary_keyword: String,

    /// Other keywords that also matched, in the order they were seen
    pub additional_keywords: Vec<String>,

    /// Phase of the query that first returned this result
    pub phase: Phase,
}

impl MergedResult {
    /// Every keyword credited with this result, primary first
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_keyword.as_str())
            .chain(self.additional_keywords.iter().map(String::as_str))
    }
}

/// What absorbing one query's results changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbsorbSummary {
    /// Results not seen earlier in the run
    pub new_results: usize,

    /// Results already held, possibly gaining an additional keyword
    pub duplicates: usize,

    /// New (keyword, result) attributions, in absorb order
    pub matches: Vec<(String, ResultId)>,
}

/// Accumulates unique results across the queries of one run
#[derive(Debug, Clone)]
pub struct RunTracker {
    target: u64,
    results: Vec<MergedResult>,
    index: HashMap<ResultId, usize>,
    phase_yield: HashMap<Phase, u64>,
    queries_executed: usize,
}

impl RunTracker {
    /// Track a run that stops once `target` unique results are held
    pub fn new(target: u64) -> Self {
        Self {
            target,
            results: Vec::new(),
            index: HashMap::new(),
            phase_yield: HashMap::new(),
            queries_executed: 0,
        }
    }

    /// Merge one executed query's results into the run
    pub fn absorb(&mut self, query: &PlannedQuery, results: &[FetchedResult]) -> AbsorbSummary {
        self.queries_executed += 1;
        let mut summary = AbsorbSummary::default();

        for result in results {
            let matched = matching_keywords(&query.keywords, &result.text);

            match self.index.get(&result.id) {
                Some(&slot) => {
                    summary.duplicates += 1;
                    let merged = &mut self.results[slot];
                    for keyword in matched {
                        if keyword != merged.primary_keyword
                            && !merged.additional_keywords.contains(&keyword)
                        {
                            summary.matches.push((keyword.clone(), result.id));
                            merged.additional_keywords.push(keyword);
                        }
                    }
                }
                None => {
                    summary.new_results += 1;
                    let mut matched = matched.into_iter();
                    let primary = matched
                        .next()
                        .or_else(|| query.keywords.first().cloned())
                        .unwrap_or_default();
                    let additional: Vec<String> = matched.collect();

                    summary.matches.push((primary.clone(), result.id));
                    for keyword in &additional {
                        summary.matches.push((keyword.clone(), result.id));
                    }

                    self.index.insert(result.id, self.results.len());
                    self.results.push(MergedResult {
                        result: result.clone(),
                        primary_keyword: primary,
                        additional_keywords: additional,
                        phase: query.phase,
                    });
                    *self.phase_yield.entry(query.phase).or_insert(0) += 1;
                }
            }
        }

        summary
    }

    /// The run's result budget has been reached; issue no further queries
    pub fn should_stop(&self) -> bool {
        self.unique_count() as u64 >= self.target
    }

    /// Whether queries of `phase` should still be issued
    ///
    /// Conditional phases only run while everything executed so far has
    /// fallen short of the target. The unconditional phase runs until the
    /// global stop.
    pub fn should_execute(&self, phase: Phase) -> bool {
        if phase.is_conditional() {
            let earlier: u64 = Phase::ALL
                .iter()
                .filter(|p| **p < phase)
                .map(|p| self.phase_yield(*p))
                .sum();
            if earlier >= self.target {
                return false;
            }
        }
        !self.should_stop()
    }

    pub fn unique_count(&self) -> usize {
        self.results.len()
    }

    /// Unique results first returned by queries of `phase`
    pub fn phase_yield(&self, phase: Phase) -> u64 {
        self.phase_yield.get(&phase).copied().unwrap_or(0)
    }

    pub fn queries_executed(&self) -> usize {
        self.queries_executed
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn get(&self, id: ResultId) -> Option<&MergedResult> {
        self.index.get(&id).map(|&slot| &self.results[slot])
    }

    /// Results in first-seen order
    pub fn results(&self) -> &[MergedResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<MergedResult> {
        self.results
    }
}

/// Covered keywords whose words all appear in `text`, in query order
fn matching_keywords(keywords: &[String], text: &str) -> Vec<String> {
    let words = tokenize(text);
    keywords
        .iter()
        .filter(|keyword| {
            let tokens = tokenize(keyword);
            !tokens.is_empty() && tokens.is_subset(&words)
        })
        .map(|keyword| normalize_keyword(keyword))
        .collect()
}
