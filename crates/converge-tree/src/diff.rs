//! Structural diffing of state trees
//!
//! [`diff`] compares two trees and produces a categorized [`ChangeSet`].
//! Mappings are compared by key, sequences by position, scalars by value.
//! A location whose value changes kind (including "absent" to an empty
//! collection, which YAML cannot tell apart on the wire) is reported under
//! `type_changed` rather than folded into additions or removals.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::StateTree;
use crate::path::StructuralPath;

/// Maximum recursion depth for diff operations
const MAX_DIFF_DEPTH: usize = 128;

/// Kind of a state tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    /// No value (`null`, or an empty YAML entry)
    Absent,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
}

impl TreeKind {
    pub fn of(value: &StateTree) -> Self {
        match value {
            Value::Null => TreeKind::Absent,
            Value::Bool(_) => TreeKind::Bool,
            Value::Number(_) => TreeKind::Number,
            Value::String(_) => TreeKind::String,
            Value::Array(_) => TreeKind::Sequence,
            Value::Object(_) => TreeKind::Mapping,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TreeKind::Absent => "absent",
            TreeKind::Bool => "bool",
            TreeKind::Number => "number",
            TreeKind::String => "string",
            TreeKind::Sequence => "sequence",
            TreeKind::Mapping => "mapping",
        }
    }
}

/// Old and new value at a location whose kind did not change
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub old: StateTree,
    pub new: StateTree,
}

/// A location whose value changed kind
#[derive(Debug, Clone, PartialEq)]
pub struct TypeChange {
    pub old_type: TreeKind,
    pub new_type: TreeKind,
    pub old_value: StateTree,
    pub new_value: StateTree,
}

/// Categorized differences between two state trees
///
/// Entries are kept in tree-walk order, which makes everything downstream
/// (rule selection, deduplication) deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub values_changed: Vec<(StructuralPath, ValueChange)>,
    pub mapping_key_added: Vec<StructuralPath>,
    pub mapping_key_removed: Vec<StructuralPath>,
    pub sequence_item_added: Vec<StructuralPath>,
    pub sequence_item_removed: Vec<StructuralPath>,
    pub type_changed: Vec<(StructuralPath, TypeChange)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of entries across all categories
    pub fn len(&self) -> usize {
        self.values_changed.len()
            + self.mapping_key_added.len()
            + self.mapping_key_removed.len()
            + self.sequence_item_added.len()
            + self.sequence_item_removed.len()
            + self.type_changed.len()
    }

    /// Every changed location, in category order
    pub fn paths(&self) -> impl Iterator<Item = &StructuralPath> {
        self.values_changed
            .iter()
            .map(|(path, _)| path)
            .chain(self.mapping_key_added.iter())
            .chain(self.mapping_key_removed.iter())
            .chain(self.sequence_item_added.iter())
            .chain(self.sequence_item_removed.iter())
            .chain(self.type_changed.iter().map(|(path, _)| path))
    }

    /// Render the change-set as a tree, for handing to the action executor
    /// as the `diff` variable bundle.
    ///
    /// Empty categories are omitted.
    pub fn to_tree(&self) -> StateTree {
        fn path_list(paths: &[StructuralPath]) -> Value {
            Value::Array(paths.iter().map(|p| Value::String(p.to_string())).collect())
        }

        let mut out = Map::new();
        if !self.values_changed.is_empty() {
            let mut changed = Map::new();
            for (path, change) in &self.values_changed {
                let mut entry = Map::new();
                entry.insert("old_value".to_string(), change.old.clone());
                entry.insert("new_value".to_string(), change.new.clone());
                changed.insert(path.to_string(), Value::Object(entry));
            }
            out.insert("values_changed".to_string(), Value::Object(changed));
        }
        if !self.mapping_key_added.is_empty() {
            out.insert("dictionary_item_added".to_string(), path_list(&self.mapping_key_added));
        }
        if !self.mapping_key_removed.is_empty() {
            out.insert("dictionary_item_removed".to_string(), path_list(&self.mapping_key_removed));
        }
        if !self.sequence_item_added.is_empty() {
            out.insert("iterable_item_added".to_string(), path_list(&self.sequence_item_added));
        }
        if !self.sequence_item_removed.is_empty() {
            out.insert("iterable_item_removed".to_string(), path_list(&self.sequence_item_removed));
        }
        if !self.type_changed.is_empty() {
            let mut changed = Map::new();
            for (path, change) in &self.type_changed {
                let mut entry = Map::new();
                entry.insert("old_type".to_string(), Value::from(change.old_type.as_str()));
                entry.insert("new_type".to_string(), Value::from(change.new_type.as_str()));
                entry.insert("new_value".to_string(), change.new_value.clone());
                changed.insert(path.to_string(), Value::Object(entry));
            }
            out.insert("type_changes".to_string(), Value::Object(changed));
        }
        Value::Object(out)
    }
}

/// Compute the structural difference between `old` and `new`
pub fn diff(old: &StateTree, new: &StateTree) -> ChangeSet {
    let mut changes = ChangeSet::default();
    if old != new {
        diff_with_depth(old, new, StructuralPath::root(), &mut changes, 0);
    }
    tracing::trace!(entries = changes.len(), "computed change-set");
    changes
}

fn diff_with_depth(
    old: &StateTree,
    new: &StateTree,
    path: StructuralPath,
    changes: &mut ChangeSet,
    depth: usize,
) {
    // Depth limit: treat deeply nested differences as a single modification
    if depth > MAX_DIFF_DEPTH {
        if old != new {
            changes.values_changed.push((
                path,
                ValueChange {
                    old: old.clone(),
                    new: new.clone(),
                },
            ));
        }
        return;
    }

    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_value) in old_map {
                match new_map.get(key) {
                    Some(new_value) => {
                        if old_value != new_value {
                            diff_with_depth(old_value, new_value, path.key(key), changes, depth + 1);
                        }
                    }
                    None => changes.mapping_key_removed.push(path.key(key)),
                }
            }
            for key in new_map.keys() {
                if !old_map.contains_key(key) {
                    changes.mapping_key_added.push(path.key(key));
                }
            }
        }

        (Value::Array(old_seq), Value::Array(new_seq)) => {
            let common = old_seq.len().min(new_seq.len());
            for (index, (old_item, new_item)) in old_seq.iter().zip(new_seq).enumerate() {
                if old_item != new_item {
                    diff_with_depth(old_item, new_item, path.index(index), changes, depth + 1);
                }
            }
            for index in common..new_seq.len() {
                changes.sequence_item_added.push(path.index(index));
            }
            for index in common..old_seq.len() {
                changes.sequence_item_removed.push(path.index(index));
            }
        }

        _ => {
            let old_type = TreeKind::of(old);
            let new_type = TreeKind::of(new);
            if old_type != new_type {
                changes.type_changed.push((
                    path,
                    TypeChange {
                        old_type,
                        new_type,
                        old_value: old.clone(),
                        new_value: new.clone(),
                    },
                ));
            } else if old != new {
                changes.values_changed.push((
                    path,
                    ValueChange {
                        old: old.clone(),
                        new: new.clone(),
                    },
                ));
            }
        }
    }
}
