//! Shared test utilities for the converge workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`fixtures`]: YAML scenarios and rule documents under `test-fixtures/`
//! - [`executor`]: [`ScriptedExecutor`], an action executor with queued outcomes

pub mod executor;
pub mod fixtures;

pub use executor::{Reply, ScriptedExecutor};
pub use fixtures::{Scenario, fixtures_dir, load_rules, load_tree};
