//! Collapsing of overlapping matches

use std::collections::HashSet;

use crate::select::Match;

/// Keep the first match per subtree path, in order.
///
/// The recursive subtree walk reports one logical change at several depths
/// and through several categories; exactly one action may be produced per
/// subtree per pass.
pub fn dedup(matches: Vec<Match>) -> Vec<Match> {
    let mut seen = HashSet::new();
    let total = matches.len();
    let kept: Vec<Match> = matches
        .into_iter()
        .filter(|m| seen.insert(m.subtree_path.clone()))
        .collect();

    tracing::debug!(total, kept = kept.len(), "deduplicated matches");
    kept
}
