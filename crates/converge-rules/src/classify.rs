//! Action classification
//!
//! A deduplicated match is turned into a [`ResolvedAction`] by probing for
//! its subtree in both trees:
//!
//! | new | old | action |
//! |-----|-----|--------|
//! | yes | yes | UPDATE (new subtree) |
//! | no  | yes | DELETE (old subtree) |
//! | yes | no  | CREATE (new subtree) |
//! | no  | no  | structural invariant violation |

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use converge_tree::{StateTree, StructuralPath, extract};

use crate::rule::{Action, DEFAULT_INVENTORY, Rule};
use crate::select::Match;
use crate::{Error, Result};

/// Name of the implicit variable bound to the whole subtree
pub const NODE_VAR: &str = "node";

/// A classified change, ready to be handed to the action executor
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAction {
    pub action: Action,
    pub subtree_path: StructuralPath,
    pub subtree: StateTree,
    /// Rule-declared variables plus `node`
    pub vars: Map<String, Value>,
    /// Host pattern the execution unit runs against
    pub target: String,
    #[serde(skip)]
    pub rule: Arc<Rule>,
}

/// Classify one match against the two trees it was selected from
pub fn classify(m: &Match, old: &StateTree, new: &StateTree) -> Result<ResolvedAction> {
    let in_new = extract(new, &m.subtree_path).ok();
    let in_old = extract(old, &m.subtree_path).ok();

    let (action, subtree) = match (in_new, in_old) {
        (Some(subtree), Some(_)) => (Action::Update, subtree),
        (None, Some(subtree)) => (Action::Delete, subtree),
        (Some(subtree), None) => (Action::Create, subtree),
        (None, None) => {
            tracing::error!(path = %m.subtree_path, selector = %m.rule.rule_selector, "matched subtree absent from both trees");
            return Err(Error::StructuralInvariant {
                path: m.subtree_path.to_string(),
            });
        }
    };

    let vars = destructure(&m.rule, &m.subtree_path, subtree)?;
    let target = resolve_target(&m.rule, &m.subtree_path, subtree)?;

    tracing::debug!(
        action = %action,
        path = %m.subtree_path,
        target = %target,
        "classified change"
    );

    Ok(ResolvedAction {
        action,
        subtree_path: m.subtree_path.clone(),
        subtree: subtree.clone(),
        vars,
        target,
        rule: Arc::clone(&m.rule),
    })
}

fn resolve(path: &StructuralPath, subtree: &StateTree, selector: &str) -> Result<StateTree> {
    let relative = StructuralPath::parse_relative(selector)
        .map_err(|e| Error::selector_resolution(path, selector, e.to_string()))?;
    extract(subtree, &relative)
        .cloned()
        .map_err(|e| Error::selector_resolution(path, selector, e.to_string()))
}

fn destructure(rule: &Rule, path: &StructuralPath, subtree: &StateTree) -> Result<Map<String, Value>> {
    let mut vars = Map::new();
    for (name, selector) in &rule.vars {
        vars.insert(name.clone(), resolve(path, subtree, selector)?);
    }
    vars.insert(NODE_VAR.to_string(), subtree.clone());
    Ok(vars)
}

fn resolve_target(rule: &Rule, path: &StructuralPath, subtree: &StateTree) -> Result<String> {
    let Some(selector) = rule.inventory_selector.as_deref() else {
        return Ok(rule
            .inventory
            .clone()
            .unwrap_or_else(|| DEFAULT_INVENTORY.to_string()));
    };

    match resolve(path, subtree, selector)? {
        Value::String(target) if !target.is_empty() => Ok(target),
        value @ (Value::Number(_) | Value::Bool(_)) => Ok(value.to_string()),
        other => Err(Error::selector_resolution(
            path,
            selector,
            format!("expected a non-empty scalar host pattern, found {}", other),
        )),
    }
}
