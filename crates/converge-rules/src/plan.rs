//! The change-to-action pipeline

use converge_tree::{ChangeSet, StateTree, StructuralPath, diff};

use crate::canonicalize::canonicalize;
use crate::classify::{ResolvedAction, classify};
use crate::dedup::dedup;
use crate::rule::RuleSet;
use crate::select::{select, unmatched};
use crate::unit::ExecutionUnit;
use crate::{Error, Result};

/// Everything one comparison of two trees resolves to
#[derive(Debug, Default)]
pub struct Plan {
    pub changes: ChangeSet,
    /// One action per governed subtree, in selection order
    pub actions: Vec<ResolvedAction>,
    /// Actions that could not be resolved; their siblings are still planned
    pub failures: Vec<Error>,
    /// Changed locations no rule governs
    pub unmatched: Vec<StructuralPath>,
}

impl Plan {
    /// True when the trees were equal after canonicalization
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Execution units applying every resolved action
    pub fn units(&self) -> Vec<ExecutionUnit> {
        self.actions.iter().map(ExecutionUnit::apply).collect()
    }

    /// The change-set in the form handed to the executor
    pub fn diff_bundle(&self) -> StateTree {
        self.changes.to_tree()
    }
}

/// Canonicalize, diff, select, deduplicate and classify.
///
/// Fails only on a structural invariant violation; unresolvable vars or
/// inventory selectors are collected into [`Plan::failures`].
pub fn plan(old: &StateTree, new: &StateTree, rules: &RuleSet) -> Result<Plan> {
    let old = canonicalize(old, rules);
    let new = canonicalize(new, rules);

    let changes = diff(&old, &new);
    if changes.is_empty() {
        return Ok(Plan::default());
    }

    let matches = select(&changes, rules, &old, &new);
    let unmatched = unmatched(&changes, &matches);
    for path in &unmatched {
        tracing::warn!(path = %path, "change not governed by any rule, ignoring");
    }

    let mut actions = Vec::new();
    let mut failures = Vec::new();
    for m in dedup(matches) {
        match classify(&m, &old, &new) {
            Ok(action) => actions.push(action),
            Err(e) if e.is_action_local() => {
                tracing::warn!(path = %m.subtree_path, error = %e, "dropping unresolvable action");
                failures.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        changes = changes.len(),
        actions = actions.len(),
        failures = failures.len(),
        unmatched = unmatched.len(),
        "planned changes"
    );

    Ok(Plan {
        changes,
        actions,
        failures,
        unmatched,
    })
}
