//! [`ScriptedExecutor`]: replays queued outcomes and records every job.
//!
//! Realism level: **FAKE**. Nothing is executed; use it to drive the
//! controller through success, failure and discovery paths deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use converge_core::{ActionExecutor, ExecutionJob, ExecutionOutcome, JobKind, ShutdownFlag};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Outcome(ExecutionOutcome),
    /// The executor itself fails to run
    Error(String),
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Reply>,
    jobs: Vec<ExecutionJob>,
}

/// Action executor answering from a queue.
///
/// When the queue is empty every job succeeds. Clones share the queue and the
/// job log, so keep one clone for assertions after handing another to a
/// controller.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    script: Arc<Mutex<Script>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next job
    pub fn then(self, reply: Reply) -> Self {
        self.lock().replies.push_back(reply);
        self
    }

    pub fn then_succeed(self) -> Self {
        self.then(Reply::Outcome(ExecutionOutcome::success()))
    }

    pub fn then_fail(self) -> Self {
        self.then(Reply::Outcome(ExecutionOutcome::failure()))
    }

    pub fn then_error(self, message: &str) -> Self {
        self.then(Reply::Error(message.to_string()))
    }

    pub fn then_discover(self, outcome: ExecutionOutcome) -> Self {
        self.then(Reply::Outcome(outcome))
    }

    /// Every job received so far
    pub fn jobs(&self) -> Vec<ExecutionJob> {
        self.lock().jobs.clone()
    }

    /// Kinds of the jobs received so far, in order
    pub fn kinds(&self) -> Vec<JobKind> {
        self.lock().jobs.iter().map(|job| job.kind).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        job: &ExecutionJob,
        _shutdown: &ShutdownFlag,
    ) -> converge_core::Result<ExecutionOutcome> {
        let reply = {
            let mut script = self.lock();
            script.jobs.push(job.clone());
            script.replies.pop_front()
        };
        match reply {
            None => Ok(ExecutionOutcome::success()),
            Some(Reply::Outcome(outcome)) => Ok(outcome),
            Some(Reply::Error(message)) => Err(converge_core::Error::executor(message)),
        }
    }
}
