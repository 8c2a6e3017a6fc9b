//! Execution units handed to the action executor

use serde::Serialize;
use serde_json::{Map, Value};

use crate::classify::ResolvedAction;
use crate::rule::{Action, TaskRef};

/// Variable carrying a discovery unit's index
pub const DISCOVERY_ID_VAR: &str = "discovery_id";

/// One play's worth of work: the tasks a rule declares for an action, the
/// hosts to run them on and the variables extracted from the subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionUnit {
    pub name: String,
    pub hosts: String,
    pub tasks: Vec<TaskRef>,
    #[serde(rename = "become", skip_serializing_if = "Option::is_none")]
    pub escalate: Option<bool>,
    pub vars: Map<String, Value>,
}

impl ExecutionUnit {
    /// Unit running the rule's tasks for `action` against the resolved subtree
    pub fn for_action(action: Action, resolved: &ResolvedAction) -> Self {
        Self {
            name: format!("{} {} {}", action, resolved.subtree_path, resolved.target),
            hosts: resolved.target.clone(),
            tasks: resolved.rule.tasks_for(action).to_vec(),
            escalate: resolved.rule.escalate,
            vars: resolved.vars.clone(),
        }
    }

    /// Unit applying a classified action
    pub fn apply(resolved: &ResolvedAction) -> Self {
        Self::for_action(resolved.action, resolved)
    }

    /// RETRIEVE unit whose artifact is returned under `index`
    pub fn discovery(resolved: &ResolvedAction, index: usize) -> Self {
        let mut unit = Self::for_action(Action::Retrieve, resolved);
        unit.name = format!("discovery for {} discovery_id {}", unit.hosts, index);
        unit.vars
            .insert(DISCOVERY_ID_VAR.to_string(), Value::from(index));
        unit
    }

    pub fn validation(resolved: &ResolvedAction) -> Self {
        Self::for_action(Action::Validate, resolved)
    }

    /// Units with no tasks have nothing to run
    pub fn is_noop(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use converge_tree::StructuralPath;
    use serde_json::json;
    use std::sync::Arc;

    fn resolved() -> ResolvedAction {
        let mut rule = Rule::new(r"root['routers'][\d+]");
        rule.create = crate::rule::ActionTasks(vec![TaskRef::Tasks("create.yml".to_string())]);
        rule.retrieve = crate::rule::ActionTasks(vec![TaskRef::Role("facts".to_string())]);
        rule.escalate = Some(true);

        let mut vars = Map::new();
        vars.insert("node".to_string(), json!({"name": "R1"}));
        ResolvedAction {
            action: Action::Create,
            subtree_path: StructuralPath::parse("root['routers'][0]").unwrap(),
            subtree: json!({"name": "R1"}),
            vars,
            target: "all".to_string(),
            rule: Arc::new(rule),
        }
    }

    #[test]
    fn test_apply_unit() {
        let unit = ExecutionUnit::apply(&resolved());
        assert_eq!(unit.name, "CREATE root['routers'][0] all");
        assert_eq!(unit.tasks, vec![TaskRef::Tasks("create.yml".to_string())]);
        assert_eq!(unit.escalate, Some(true));
        assert!(!unit.is_noop());
    }

    #[test]
    fn test_discovery_unit_carries_index() {
        let unit = ExecutionUnit::discovery(&resolved(), 3);
        assert_eq!(unit.name, "discovery for all discovery_id 3");
        assert_eq!(unit.vars[DISCOVERY_ID_VAR], json!(3));
        assert_eq!(unit.tasks, vec![TaskRef::Role("facts".to_string())]);
    }

    #[test]
    fn test_validation_without_tasks_is_noop() {
        assert!(ExecutionUnit::validation(&resolved()).is_noop());
    }

    #[test]
    fn test_serializes_become() {
        let tree = serde_json::to_value(ExecutionUnit::apply(&resolved())).unwrap();
        assert_eq!(tree["become"], json!(true));
        assert_eq!(tree["tasks"], json!([{"tasks": "create.yml"}]));
    }
}
