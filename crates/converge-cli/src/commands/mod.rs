//! Command implementations for converge-cli

pub mod diff;
pub mod rules;
pub mod run;

pub use diff::run_diff;
pub use rules::run_rules;
pub use run::{RunOptions, run_reconcile};
