//! Per-instance reconciliation state

use std::sync::Arc;

use serde_json::json;

use converge_rules::{ResolvedAction, RuleSet};
use converge_tree::StateTree;

/// Everything one controller owns about its managed instance
#[derive(Debug, Clone)]
pub struct ReconciliationContext {
    /// Identifies the managed instance in logs and telemetry
    pub instance: String,
    /// Last desired state believed fully applied
    pub current: StateTree,
    /// Desired state being applied
    pub new: StateTree,
    /// Actual state as last observed or asserted
    pub discovered: StateTree,
    pub rules: Arc<RuleSet>,
    /// Actions of the most recent resolve pass
    pub last_actions: Vec<ResolvedAction>,
}

impl ReconciliationContext {
    /// A fresh context: nothing applied, nothing desired, nothing observed
    pub fn new(instance: impl Into<String>, rules: Arc<RuleSet>) -> Self {
        Self {
            instance: instance.into(),
            current: json!({}),
            new: json!({}),
            discovered: json!({}),
            rules,
            last_actions: Vec::new(),
        }
    }

    /// Start from an already-applied state
    pub fn with_current(mut self, current: StateTree) -> Self {
        self.new = current.clone();
        self.discovered = current.clone();
        self.current = current;
        self
    }

    /// Desired-state bundle handed to the executor
    pub fn state_bundle(&self) -> StateTree {
        json!({
            "current_desired_state": self.current,
            "new_desired_state": self.new,
            "discovered_state": self.discovered,
        })
    }
}
