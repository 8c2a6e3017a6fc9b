//! Rule matching and change classification for converge
//!
//! Turns the difference between two state trees into a list of actions:
//! canonicalize both trees, diff them, select the rules governing each
//! changed location, keep one match per subtree and classify it as CREATE,
//! UPDATE or DELETE.

pub mod canonicalize;
pub mod classify;
pub mod dedup;
pub mod error;
pub mod matcher;
pub mod plan;
pub mod rule;
pub mod select;
pub mod unit;

pub use canonicalize::canonicalize;
pub use classify::{NODE_VAR, ResolvedAction, classify};
pub use dedup::dedup;
pub use error::{Error, Result};
pub use matcher::PathMatcher;
pub use plan::{Plan, plan};
pub use rule::{Action, ActionTasks, Rule, RuleDocument, RuleSet, TaskRef};
pub use select::{ChangeCategory, Match, select, unmatched};
pub use unit::{DISCOVERY_ID_VAR, ExecutionUnit};
