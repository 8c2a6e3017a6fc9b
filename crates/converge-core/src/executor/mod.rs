//! Action executor interface
//!
//! The controller only builds [`ExecutionJob`]s and observes the
//! [`ExecutionOutcome`]; how units are run is up to the executor.

pub mod playbook;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use converge_rules::ExecutionUnit;
use converge_tree::StateTree;

use crate::Result;

pub use playbook::PlaybookExecutor;

/// Cooperative cancellation flag shared between a controller and its executor.
///
/// Executors check it between steps; nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a job is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Apply,
    Retry,
    Revert,
    Discover,
    Validate,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Apply => "apply",
            JobKind::Retry => "retry",
            JobKind::Revert => "revert",
            JobKind::Discover => "discover",
            JobKind::Validate => "validate",
        };
        f.pad(name)
    }
}

/// One executor invocation
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionJob {
    pub id: Uuid,
    pub kind: JobKind,
    /// One play per unit, run in order
    pub units: Vec<ExecutionUnit>,
    /// Desired-state bundle exposed to every unit as `state`
    pub state: StateTree,
    /// Change-set bundle exposed to every unit as `diff`
    pub diff: StateTree,
}

impl ExecutionJob {
    pub fn new(kind: JobKind, units: Vec<ExecutionUnit>, state: StateTree, diff: StateTree) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            units,
            state,
            diff,
        }
    }

    /// The same work under a different kind and a fresh id
    pub fn rerun(&self, kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            ..self.clone()
        }
    }

    /// True when there is nothing for an executor to run
    pub fn is_noop(&self) -> bool {
        self.units.iter().all(ExecutionUnit::is_noop)
    }
}

/// What an executor reports back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Retrieved subtrees keyed by unit index
    pub discovered: BTreeMap<usize, StateTree>,
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            discovered: BTreeMap::new(),
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }

    pub fn with_discovered(mut self, index: usize, subtree: StateTree) -> Self {
        self.discovered.insert(index, subtree);
        self
    }
}

/// Performs the work described by execution units
///
/// An `Err` means the executor itself could not run (spawn failure, I/O);
/// the controller treats it the same as a failed outcome.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn execute(&self, job: &ExecutionJob, shutdown: &ShutdownFlag) -> Result<ExecutionOutcome>;
}
