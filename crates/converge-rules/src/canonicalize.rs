//! Canonical ordering of identity-bearing sequences
//!
//! Sequences selected by a rule with an `id_key` are sorted by that key
//! before diffing, so that reordering e.g. a list of named routers never
//! registers as a change. Both trees of a comparison must be canonicalized
//! with the same rule set.

use std::cmp::Ordering;

use serde_json::Value;

use converge_tree::{StateTree, StructuralPath, TreeKind};

use crate::rule::{RuleSet, SequenceKey};

/// Maximum depth walked while looking for sequences to sort
const MAX_CANONICAL_DEPTH: usize = 128;

/// Return a copy of `tree` with every identity-bearing sequence sorted.
///
/// Sorting is stable, so canonicalizing a canonical tree is a no-op.
pub fn canonicalize(tree: &StateTree, rules: &RuleSet) -> StateTree {
    let keys: Vec<&SequenceKey> = rules.sequence_keys().collect();
    let mut out = tree.clone();
    if !keys.is_empty() {
        sort_sequences(&mut out, &StructuralPath::root(), &keys, 0);
    }
    out
}

// Sorts top-down so that child paths are computed against the reordered parent.
fn sort_sequences(node: &mut StateTree, path: &StructuralPath, keys: &[&SequenceKey], depth: usize) {
    if depth > MAX_CANONICAL_DEPTH {
        return;
    }

    match node {
        Value::Array(items) => {
            let rendered = path.to_string();
            if let Some(key) = keys.iter().find(|k| k.matcher.is_match(&rendered)) {
                let id_key = key.id_key.as_str();
                items.sort_by(|a, b| compare_trees(a.get(id_key), b.get(id_key)));
            }
            for (index, item) in items.iter_mut().enumerate() {
                sort_sequences(item, &path.index(index), keys, depth + 1);
            }
        }
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                sort_sequences(value, &path.key(key.as_str()), keys, depth + 1);
            }
        }
        _ => {}
    }
}

fn kind_rank(value: &Value) -> u8 {
    match TreeKind::of(value) {
        TreeKind::Absent => 0,
        TreeKind::Bool => 1,
        TreeKind::Number => 2,
        TreeKind::String => 3,
        TreeKind::Sequence => 4,
        TreeKind::Mapping => 5,
    }
}

/// Total order over optional identity values: missing first, then by kind,
/// then by value.
fn compare_trees(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    _ => x.to_string().cmp(&y.to_string()),
                }
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
                a.to_string().cmp(&b.to_string())
            }
            _ => kind_rank(a).cmp(&kind_rank(b)),
        },
    }
}
