//! Rule document schema
//!
//! A rule document is a mapping `rules -> [Rule]`:
//!
//! ```yaml
//! rules:
//!   - rule_selector: root['routers'][\d+]
//!     id_key: name
//!     inventory_selector: name
//!     vars:
//!       router_name: name
//!     create:
//!       tasks: create_router.yml
//!     delete:
//!       - tasks: delete_router.yml
//!       - role: cleanup
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use converge_tree::StateTree;

use crate::matcher::PathMatcher;
use crate::{Error, Result};

/// Suffix that marks a selector as addressing the items of a sequence
pub const SEQUENCE_ITEM_SUFFIX: &str = r"[\d+]";

/// The host pattern used when a rule names no inventory
pub const DEFAULT_INVENTORY: &str = "all";

/// Kinds of work a rule can declare tasks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Update,
    Delete,
    Retrieve,
    Rename,
    Validate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::Retrieve => "RETRIEVE",
            Action::Rename => "RENAME",
            Action::Validate => "VALIDATE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to work the action executor knows how to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskRef {
    /// A task file included into the generated play
    Tasks(String),
    /// A role applied by the generated play
    Role(String),
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Tasks(file) => write!(f, "tasks {}", file),
            TaskRef::Role(role) => write!(f, "role {}", role),
        }
    }
}

/// Task references declared for one action
///
/// Accepts a single reference or a list of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionTasks(pub Vec<TaskRef>);

impl ActionTasks {
    pub fn as_slice(&self) -> &[TaskRef] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ActionTasks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(TaskRef),
            Many(Vec<TaskRef>),
            Nothing(()),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(task) => ActionTasks(vec![task]),
            Repr::Many(tasks) => ActionTasks(tasks),
            Repr::Nothing(()) => ActionTasks::default(),
        })
    }
}

/// A rule governing the subtrees its selector matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Path pattern selecting the governed subtree roots
    #[serde(alias = "selector")]
    pub rule_selector: String,

    /// Identity field used to sort the sequence this rule selects items of
    #[serde(default, alias = "idKey", skip_serializing_if = "Option::is_none")]
    pub id_key: Option<String>,

    /// Sub-path into the matched subtree naming the execution target
    #[serde(default, alias = "inventorySelector", skip_serializing_if = "Option::is_none")]
    pub inventory_selector: Option<String>,

    /// Static execution target used when no inventory selector is declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,

    /// Variable name -> sub-path into the matched subtree
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Privilege escalation flag copied onto generated plays
    #[serde(default, rename = "become", skip_serializing_if = "Option::is_none")]
    pub escalate: Option<bool>,

    #[serde(default)]
    pub create: ActionTasks,
    #[serde(default)]
    pub update: ActionTasks,
    #[serde(default)]
    pub delete: ActionTasks,
    #[serde(default)]
    pub retrieve: ActionTasks,
    #[serde(default)]
    pub rename: ActionTasks,
    #[serde(default)]
    pub validate: ActionTasks,
}

impl Rule {
    /// A rule with only a selector
    pub fn new(rule_selector: impl Into<String>) -> Self {
        Self {
            rule_selector: rule_selector.into(),
            id_key: None,
            inventory_selector: None,
            inventory: None,
            vars: BTreeMap::new(),
            escalate: None,
            create: ActionTasks::default(),
            update: ActionTasks::default(),
            delete: ActionTasks::default(),
            retrieve: ActionTasks::default(),
            rename: ActionTasks::default(),
            validate: ActionTasks::default(),
        }
    }

    pub fn tasks_for(&self, action: Action) -> &[TaskRef] {
        match action {
            Action::Create => self.create.as_slice(),
            Action::Update => self.update.as_slice(),
            Action::Delete => self.delete.as_slice(),
            Action::Retrieve => self.retrieve.as_slice(),
            Action::Rename => self.rename.as_slice(),
            Action::Validate => self.validate.as_slice(),
        }
    }

    /// Selector of the sequence whose items this rule addresses, if any
    ///
    /// `root['routers'][\d+]` addresses items of `root['routers']`.
    pub fn sequence_selector(&self) -> Option<&str> {
        self.rule_selector.strip_suffix(SEQUENCE_ITEM_SUFFIX)
    }
}

/// Top-level rule document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A rule with its selector compiled
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Arc<Rule>,
    pub matcher: PathMatcher,
    /// Exact matcher for the identity-bearing sequence, when `id_key` is set
    pub sequence: Option<SequenceKey>,
}

/// A sequence location whose items are sorted by an identity field
#[derive(Debug, Clone)]
pub struct SequenceKey {
    pub matcher: PathMatcher,
    pub id_key: String,
}

impl CompiledRule {
    pub fn compile(rule: Rule) -> Result<Self> {
        let matcher = PathMatcher::compile(&rule.rule_selector)?;
        let sequence = match (&rule.id_key, rule.sequence_selector()) {
            (Some(id_key), Some(selector)) => Some(SequenceKey {
                matcher: PathMatcher::compile_exact(selector)?,
                id_key: id_key.clone(),
            }),
            (Some(id_key), None) => {
                tracing::debug!(
                    selector = %rule.rule_selector,
                    id_key = %id_key,
                    "id_key ignored: selector does not address sequence items"
                );
                None
            }
            _ => None,
        };
        Ok(Self {
            rule: Arc::new(rule),
            matcher,
            sequence,
        })
    }
}

/// The loaded, compiled rules of one reconciliation run
///
/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile every selector up front
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(count = rules.len(), "compiled rule set");
        Ok(Self { rules })
    }

    pub fn from_document(document: RuleDocument) -> Result<Self> {
        Self::new(document.rules)
    }

    /// Build from an already-parsed rule document tree
    pub fn from_tree(tree: &StateTree) -> Result<Self> {
        let document: RuleDocument = serde_json::from_value(tree.clone())
            .map_err(|e| Error::InvalidRules {
                message: e.to_string(),
            })?;
        Self::from_document(document)
    }

    pub fn parse_yaml(content: &str) -> Result<Self> {
        Self::from_tree(&converge_tree::parse_yaml(content)?)
    }

    /// Load a YAML or JSON rule document from disk
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_tree(&converge_tree::load_document(path)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Identity-bearing sequences, in rule order
    pub fn sequence_keys(&self) -> impl Iterator<Item = &SequenceKey> {
        self.rules.iter().filter_map(|r| r.sequence.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_with_task_map() {
        let rules = RuleSet::parse_yaml(
            r#"
rules:
  - rule_selector: root['routers'][\d+]
    inventory: all
    create:
      tasks: create_tasks.yml
    delete:
      - tasks: del_tasks.yml
      - role: cleanup
"#,
        )
        .unwrap();

        let rule = &rules.iter().next().unwrap().rule;
        assert_eq!(
            rule.tasks_for(Action::Create),
            &[TaskRef::Tasks("create_tasks.yml".to_string())]
        );
        assert_eq!(rule.tasks_for(Action::Delete).len(), 2);
        assert!(rule.tasks_for(Action::Update).is_empty());
        assert_eq!(rule.inventory.as_deref(), Some("all"));
    }

    #[test]
    fn test_parse_camel_aliases() {
        let rules = RuleSet::parse_yaml(
            r#"
rules:
  - selector: root['routers'][\d+]
    idKey: name
    inventorySelector: name
"#,
        )
        .unwrap();

        let compiled = rules.iter().next().unwrap();
        assert_eq!(compiled.rule.id_key.as_deref(), Some("name"));
        assert_eq!(compiled.rule.inventory_selector.as_deref(), Some("name"));
        assert!(compiled.sequence.is_some());
    }

    #[test]
    fn test_become_flag() {
        let rules = RuleSet::parse_yaml("rules:\n  - rule_selector: root['a']\n    become: true\n").unwrap();
        assert_eq!(rules.iter().next().unwrap().rule.escalate, Some(true));
    }

    #[test]
    fn test_empty_action_entry() {
        let rules = RuleSet::parse_yaml("rules:\n  - rule_selector: root['a']\n    update:\n").unwrap();
        assert!(rules.iter().next().unwrap().rule.update.is_empty());
    }

    #[test]
    fn test_id_key_without_sequence_selector_is_ignored() {
        let rules = RuleSet::parse_yaml("rules:\n  - rule_selector: root['a']\n    id_key: name\n").unwrap();
        assert!(rules.iter().next().unwrap().sequence.is_none());
    }

    #[test]
    fn test_missing_selector_is_invalid() {
        let err = RuleSet::parse_yaml("rules:\n  - id_key: name\n").unwrap_err();
        assert!(matches!(err, Error::InvalidRules { .. }));
    }

    #[test]
    fn test_sequence_selector() {
        assert_eq!(
            Rule::new(r"root['routers'][\d+]").sequence_selector(),
            Some("root['routers']")
        );
        assert_eq!(Rule::new("root['routers']").sequence_selector(), None);
    }
}
