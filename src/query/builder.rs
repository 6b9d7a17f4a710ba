//! Query string construction
//!
//! Renders a keyword set plus filters into a single query the search API
//! accepts:
//!
//! ```text
//! (federalism OR "state power") min_faves:10 -is:reply lang:en
//! ```
//!
//! The platform caps both the number of OR-joined terms and the serialized
//! length. Rather than failing, the builder keeps the highest-weight
//! keywords that fit and reports the rest as dropped so the caller can
//! schedule them in another query.

use super::filters::is_valid_language;
use crate::config::QueryConfig;
use crate::error::{Result, ScoutError};
use crate::types::{Filters, Keyword};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A rendered query and the keywords it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltQuery {
    pub query: String,

    /// Keywords rendered into the query, highest weight first
    pub included: Vec<String>,

    /// Keywords that did not fit, highest weight first
    pub dropped: Vec<String>,

    /// The single included term had to be shortened to fit
    pub truncated: bool,
}

impl BuiltQuery {
    pub fn term_count(&self) -> usize {
        self.included.len()
    }
}

/// Builds protocol-legal query strings
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    max_terms: usize,
    max_length: usize,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(&QueryConfig::default())
    }
}

impl QueryBuilder {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            max_terms: config.max_terms.max(1),
            max_length: config.max_length.max(1),
        }
    }

    pub fn max_terms(&self) -> usize {
        self.max_terms
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Render `keywords` and `filters` into one query
    ///
    /// Errors only when there is nothing to search for, or when the filter
    /// clauses alone leave no room for a single character of search term.
    pub fn build_query(&self, keywords: &[Keyword], filters: &Filters) -> Result<BuiltQuery> {
        let mut ordered: Vec<&Keyword> = keywords.iter().collect();
        // Stable sort keeps caller order among equal weights
        ordered.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        let suffix = render_filters(filters);
        let mut seen = HashSet::new();
        let mut terms: Vec<String> = Vec::new();
        let mut included = Vec::new();
        let mut dropped = Vec::new();
        let mut full = false;

        for keyword in ordered {
            let rendered = render_term(&keyword.term);
            if rendered.is_empty() || !seen.insert(keyword.term.clone()) {
                continue;
            }
            if full || terms.len() >= self.max_terms {
                full = true;
                dropped.push(keyword.term.clone());
                continue;
            }

            terms.push(rendered);
            if char_len(&assemble(&terms, &suffix)) <= self.max_length {
                included.push(keyword.term.clone());
            } else {
                terms.pop();
                full = true;
                dropped.push(keyword.term.clone());
            }
        }

        if included.is_empty() {
            // Nothing fit as-is: shorten the highest-weight term
            if dropped.is_empty() {
                return Err(ScoutError::InvalidQuery(
                    "no searchable keywords supplied".to_string(),
                ));
            }
            let first = dropped.remove(0);
            let term = self.truncate_term(&first, &suffix)?;
            warn!(
                "Keyword '{}' truncated to fit {} character query limit",
                first, self.max_length
            );
            let query = assemble(std::slice::from_ref(&term), &suffix);
            self.log_dropped(&dropped);
            return Ok(BuiltQuery {
                query,
                included: vec![first],
                dropped,
                truncated: true,
            });
        }

        let query = assemble(&terms, &suffix);
        self.log_dropped(&dropped);
        debug!(
            terms = included.len(),
            length = char_len(&query),
            "Built query"
        );

        Ok(BuiltQuery {
            query,
            included,
            dropped,
            truncated: false,
        })
    }

    fn truncate_term(&self, term: &str, suffix: &str) -> Result<String> {
        let reserved = if suffix.is_empty() {
            0
        } else {
            char_len(suffix) + 1
        };
        let budget = self.max_length.saturating_sub(reserved);

        let bare = strip_quotes(term);
        let mut cut: String = bare.chars().take(budget).collect();
        if cut.chars().any(char::is_whitespace) {
            // Room for the surrounding quotes
            cut = bare.chars().take(budget.saturating_sub(2)).collect();
        }
        let cut = cut.trim_end().to_string();
        if cut.is_empty() {
            return Err(ScoutError::InvalidQuery(format!(
                "filter clauses ({} chars) leave no room within the {} character limit",
                char_len(suffix),
                self.max_length
            )));
        }
        Ok(render_term(&cut))
    }

    fn log_dropped(&self, dropped: &[String]) {
        if !dropped.is_empty() {
            warn!(
                "Dropped {} keyword(s) exceeding query limits ({} terms / {} chars): {:?}",
                dropped.len(),
                self.max_terms,
                self.max_length,
                dropped
            );
        }
    }
}

/// Filter clauses in their fixed order
///
/// The platform's operator names differ from the natural ones: minimum likes
/// is `min_faves` and minimum reposts is `min_retweets`.
pub fn render_filters(filters: &Filters) -> String {
    let mut clauses = Vec::new();
    if filters.min_likes > 0 {
        clauses.push(format!("min_faves:{}", filters.min_likes));
    }
    if filters.min_reposts > 0 {
        clauses.push(format!("min_retweets:{}", filters.min_reposts));
    }
    if filters.min_replies > 0 {
        clauses.push(format!("min_replies:{}", filters.min_replies));
    }
    if filters.exclude_replies {
        clauses.push("-is:reply".to_string());
    }
    if filters.exclude_reposts {
        clauses.push("-is:retweet".to_string());
    }
    if let Some(lang) = filters.language.as_deref().map(str::trim) {
        if is_valid_language(lang) {
            clauses.push(format!("lang:{}", lang));
        }
    }
    clauses.join(" ")
}

fn strip_quotes(term: &str) -> String {
    term.replace('"', "").trim().to_string()
}

/// Quote a term if it contains whitespace
fn render_term(term: &str) -> String {
    let bare = strip_quotes(term);
    if bare.chars().any(char::is_whitespace) {
        format!("\"{}\"", bare)
    } else {
        bare
    }
}

fn assemble(terms: &[String], suffix: &str) -> String {
    let body = if terms.len() == 1 {
        terms[0].clone()
    } else {
        format!("({})", terms.join(" OR "))
    };
    if suffix.is_empty() {
        body
    } else {
        format!("{} {}", body, suffix)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
