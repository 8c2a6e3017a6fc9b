//! Rule selection over a change-set
//!
//! Every changed location is tested against every rule. Newly introduced
//! subtrees are additionally walked to unbounded depth so that adding a
//! whole branch in one step is still recognized by rules selecting any level
//! inside it.
//!
//! Absent/empty-container ambiguity is repaired here:
//! - absent -> sequence (or back) is treated as the first item changing,
//!   i.e. the path gets `[0]` appended before matching; an empty sequence
//!   on the other side is no change at all;
//! - a new mapping contributes one match candidate per key, plus a walk of
//!   the whole mapping.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use converge_tree::{ChangeSet, StateTree, StructuralPath, TreeKind, TypeChange, extract};

use crate::rule::{CompiledRule, Rule, RuleSet};

/// Which part of the change-set produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    ValuesChanged,
    MappingKeyAdded,
    MappingKeyRemoved,
    SequenceItemAdded,
    SequenceItemRemoved,
    TypeChanged,
    /// Synthesized from a walk of an added or removed subtree
    Subtree,
}

/// A rule matching a changed location
#[derive(Debug, Clone)]
pub struct Match {
    pub category: ChangeCategory,
    pub rule: Arc<Rule>,
    /// The governed subtree root: the prefix of `changed_path` the selector covers
    pub subtree_path: StructuralPath,
    /// The location that was tested
    pub changed_path: StructuralPath,
    /// Raw change value, where the category carries one
    pub value: Option<StateTree>,
}

/// Find every (rule, location) match in a change-set.
///
/// Rules are tried in order; within a rule, categories are tried in a fixed
/// order followed by the subtree walks. The result feeds deduplication, which
/// keeps the first match per subtree, so this order decides which rule wins.
pub fn select(changes: &ChangeSet, rules: &RuleSet, old: &StateTree, new: &StateTree) -> Vec<Match> {
    let mut matches = Vec::new();

    for rule in rules.iter() {
        let mut selector = Selector {
            rule,
            matches: &mut matches,
        };

        for (path, change) in &changes.values_changed {
            let raw = json!({"old_value": change.old, "new_value": change.new});
            selector.test(ChangeCategory::ValuesChanged, path, Some(raw));
        }
        for path in &changes.mapping_key_added {
            selector.test(ChangeCategory::MappingKeyAdded, path, None);
        }
        for path in &changes.mapping_key_removed {
            selector.test(ChangeCategory::MappingKeyRemoved, path, None);
        }
        for path in &changes.sequence_item_added {
            selector.test(ChangeCategory::SequenceItemAdded, path, None);
        }
        for path in &changes.sequence_item_removed {
            selector.test(ChangeCategory::SequenceItemRemoved, path, None);
        }
        for (path, change) in &changes.type_changed {
            match (change.old_type, change.new_type) {
                (TreeKind::Absent, TreeKind::Sequence) | (TreeKind::Sequence, TreeKind::Absent) => {
                    if !is_empty_sequence_swap(change) {
                        selector.test(ChangeCategory::TypeChanged, &path.index(0), None);
                    }
                }
                (_, TreeKind::Mapping) => {
                    selector.test_keys(path, &change.new_value);
                }
                (TreeKind::Mapping, TreeKind::Absent) => {
                    selector.test_keys(path, &change.old_value);
                }
                _ => {
                    selector.test(ChangeCategory::TypeChanged, path, Some(change.new_value.clone()));
                }
            }
        }

        // Whole subtrees that appeared or disappeared
        for path in &changes.mapping_key_added {
            if let Ok(subtree) = extract(new, path) {
                selector.walk(path, subtree, 0);
            }
        }
        for path in &changes.mapping_key_removed {
            if let Ok(subtree) = extract(old, path) {
                selector.walk(path, subtree, 0);
            }
        }
        for path in &changes.sequence_item_added {
            if let Ok(subtree) = extract(new, path) {
                selector.walk(path, subtree, 0);
            }
        }
        for path in &changes.sequence_item_removed {
            if let Ok(subtree) = extract(old, path) {
                selector.walk(path, subtree, 0);
            }
        }
        for (path, change) in &changes.type_changed {
            match (change.old_type, change.new_type) {
                (_, TreeKind::Mapping) => selector.walk(path, &change.new_value, 0),
                (TreeKind::Mapping, TreeKind::Absent) => selector.walk(path, &change.old_value, 0),
                _ => {}
            }
        }
    }

    tracing::debug!(count = matches.len(), "selected rule matches");
    matches
}

/// Maximum depth of a subtree walk
const MAX_WALK_DEPTH: usize = 128;

struct Selector<'a> {
    rule: &'a CompiledRule,
    matches: &'a mut Vec<Match>,
}

impl Selector<'_> {
    fn test(&mut self, category: ChangeCategory, path: &StructuralPath, value: Option<StateTree>) {
        let rendered = path.to_string();
        let Some(prefix) = self.rule.matcher.match_path(&rendered) else {
            return;
        };

        // A selector whose match ends mid-step addresses no subtree
        let subtree_path = match StructuralPath::parse(prefix) {
            Ok(subtree_path) => subtree_path,
            Err(e) => {
                tracing::warn!(
                    selector = %self.rule.matcher.selector(),
                    path = %rendered,
                    error = %e,
                    "selector match does not end on a path step"
                );
                return;
            }
        };

        tracing::trace!(
            selector = %self.rule.matcher.selector(),
            ?category,
            path = %rendered,
            subtree = %subtree_path,
            "rule matched"
        );
        self.matches.push(Match {
            category,
            rule: Arc::clone(&self.rule.rule),
            subtree_path,
            changed_path: path.clone(),
            value,
        });
    }

    fn test_keys(&mut self, path: &StructuralPath, mapping: &StateTree) {
        if let Value::Object(map) = mapping {
            for key in map.keys() {
                self.test(ChangeCategory::TypeChanged, &path.key(key.as_str()), None);
            }
        }
    }

    fn walk(&mut self, path: &StructuralPath, subtree: &StateTree, depth: usize) {
        if depth > MAX_WALK_DEPTH {
            return;
        }
        match subtree {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let child = path.index(index);
                    self.test(ChangeCategory::Subtree, &child, None);
                    self.walk(&child, item, depth + 1);
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let child = path.key(key.as_str());
                    self.test(ChangeCategory::Subtree, &child, None);
                    self.walk(&child, item, depth + 1);
                }
            }
            _ => {}
        }
    }
}

/// Absent on one side, an empty sequence on the other
fn is_empty_sequence_swap(change: &TypeChange) -> bool {
    let sequence = match (change.old_type, change.new_type) {
        (TreeKind::Absent, TreeKind::Sequence) => &change.new_value,
        (TreeKind::Sequence, TreeKind::Absent) => &change.old_value,
        _ => return false,
    };
    matches!(sequence, Value::Array(items) if items.is_empty())
}

/// Change-set locations that no match covers.
///
/// A location is covered when a match was tested at it or below it, or when
/// it lies inside a matched subtree. Absent/empty-sequence swaps are never
/// reported.
pub fn unmatched(changes: &ChangeSet, matches: &[Match]) -> Vec<StructuralPath> {
    let swaps: Vec<&StructuralPath> = changes
        .type_changed
        .iter()
        .filter(|(_, change)| is_empty_sequence_swap(change))
        .map(|(path, _)| path)
        .collect();

    changes
        .paths()
        .filter(|path| !swaps.contains(path))
        .filter(|path| {
            !matches.iter().any(|m| {
                m.changed_path.starts_with(path) || path.starts_with(&m.subtree_path)
            })
        })
        .cloned()
        .collect()
}
