//! Fixture loading from the workspace `test-fixtures/` directory.
//!
//! Scenarios live in `test-fixtures/scenarios/<name>/` as `old.yaml`,
//! `new.yaml` and `rules.yaml`.
//!
//! # Panics
//! Every loader panics on a missing or malformed fixture; fixtures are part
//! of the test, not input to it.

use std::path::PathBuf;
use std::sync::Arc;

use converge_rules::RuleSet;
use converge_tree::{StateTree, load_document};

/// Absolute path of the workspace `test-fixtures/` directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("test-fixtures")
}

/// Load a YAML/JSON document relative to `test-fixtures/`
pub fn load_tree(relative: &str) -> StateTree {
    let path = fixtures_dir().join(relative);
    load_document(&path)
        .unwrap_or_else(|e| panic!("load_tree: cannot load {}: {e}", path.display()))
}

/// Load a rule document relative to `test-fixtures/`
pub fn load_rules(relative: &str) -> RuleSet {
    let path = fixtures_dir().join(relative);
    RuleSet::load(&path)
        .unwrap_or_else(|e| panic!("load_rules: cannot load {}: {e}", path.display()))
}

/// An old/new tree pair with the rules governing it
#[derive(Debug, Clone)]
pub struct Scenario {
    pub old: StateTree,
    pub new: StateTree,
    pub rules: Arc<RuleSet>,
}

impl Scenario {
    /// Load `test-fixtures/scenarios/<name>/`
    ///
    /// ```rust,no_run
    /// use converge_test_utils::Scenario;
    ///
    /// let scenario = Scenario::load("rename_and_add");
    /// assert!(!scenario.rules.is_empty());
    /// ```
    pub fn load(name: &str) -> Self {
        let dir = format!("scenarios/{name}");
        Self {
            old: load_tree(&format!("{dir}/old.yaml")),
            new: load_tree(&format!("{dir}/new.yaml")),
            rules: Arc::new(load_rules(&format!("{dir}/rules.yaml"))),
        }
    }

    /// The same scenario run backwards
    pub fn reversed(self) -> Self {
        Self {
            old: self.new,
            new: self.old,
            rules: self.rules,
        }
    }
}
