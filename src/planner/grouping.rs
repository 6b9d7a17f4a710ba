//! Word-overlap clustering of keywords
//!
//! Keywords sharing a token tend to return overlapping results, so they are
//! searched together in one OR query rather than in separate ones.

use crate::types::{tokenize, Keyword};
use std::collections::HashSet;

/// Group keywords that share at least one word token
///
/// Greedy single pass in descending weight order: each keyword joins the
/// first group whose vocabulary it overlaps, otherwise it opens a new group.
/// Groups come back sorted by their highest weight, members likewise.
pub fn group_by_tokens(keywords: &[Keyword]) -> Vec<Vec<Keyword>> {
    let mut ordered: Vec<&Keyword> = keywords.iter().collect();
    ordered.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    let mut groups: Vec<(HashSet<String>, Vec<Keyword>)> = Vec::new();
    for keyword in ordered {
        let tokens = tokenize(&keyword.term);
        match groups
            .iter_mut()
            .find(|(vocab, _)| !vocab.is_disjoint(&tokens))
        {
            Some((vocab, members)) => {
                vocab.extend(tokens);
                members.push(keyword.clone());
            }
            None => groups.push((tokens, vec![keyword.clone()])),
        }
    }

    // Members were pushed in weight order, so the first is the group max
    let mut groups: Vec<Vec<Keyword>> = groups.into_iter().map(|(_, members)| members).collect();
    groups.sort_by(|a, b| b[0].weight.total_cmp(&a[0].weight));
    groups
}
