//! Reconciliation controller
//!
//! One controller per managed instance. Each accepted event runs a chain of
//! transitions to completion (until the controller rests in Waiting or
//! Help); [`crate::fsm::transition`] decides where each step leads, the
//! methods here decide which trigger a state produces and what it changes in
//! the context on the way.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use converge_rules::{ExecutionUnit, Plan, canonicalize, plan};
use converge_tree::{StateTree, fingerprint, replace};

use crate::config::ControllerConfig;
use crate::context::ReconciliationContext;
use crate::executor::{ActionExecutor, ExecutionJob, ExecutionOutcome, JobKind, ShutdownFlag};
use crate::fsm::{State, Trigger, transition};
use crate::telemetry::{EventSink, NullSink, TelemetryEvent};
use crate::{Error, Result};

/// Inbound events
#[derive(Debug, Clone)]
pub enum Event {
    /// The operator declared a new desired state
    NewDesiredState(StateTree),
    /// Actual state asserted by an external observer
    SystemState(StateTree),
    /// Periodic re-check
    Poll,
    Shutdown,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::NewDesiredState(_) => "new_desired_state",
            Event::SystemState(_) => "system_state",
            Event::Poll => "poll",
            Event::Shutdown => "shutdown",
        }
    }
}

/// How a resolve pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Success,
    Failure,
    /// Nothing to run; counts as success
    Skipped,
    /// Stopped by an invariant violation or the pass limit
    Aborted,
}

impl PassOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PassOutcome::Success | PassOutcome::Skipped)
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassOutcome::Success => "success",
            PassOutcome::Failure => "failure",
            PassOutcome::Skipped => "skipped",
            PassOutcome::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One completed reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct PassRecord {
    pub id: Uuid,
    /// State the pass ran in
    pub state: State,
    pub kind: JobKind,
    /// Names of the execution units run
    pub actions: Vec<String>,
    pub outcome: PassOutcome,
    pub at: DateTime<Utc>,
}

/// A resolve job together with the changes its plan could not resolve
struct ResolvedJob {
    job: ExecutionJob,
    unresolved: usize,
}

/// Drives one managed instance toward its desired state
pub struct ReconciliationController {
    context: ReconciliationContext,
    state: State,
    config: ControllerConfig,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn EventSink>,
    shutdown: ShutdownFlag,
    /// Plan produced by the last Diff state, consumed by the next Resolve state
    pending: Option<Plan>,
    /// Last job run by a Resolve state, for Retry
    last_job: Option<ResolvedJob>,
    /// Resolve passes in the running chain
    passes: usize,
    history: Vec<PassRecord>,
}

impl ReconciliationController {
    pub fn new(context: ReconciliationContext, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            context,
            state: State::Start,
            config: ControllerConfig::default(),
            executor,
            sink: Arc::new(NullSink),
            shutdown: ShutdownFlag::new(),
            pending: None,
            last_job: None,
            passes: 0,
            history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &ReconciliationContext {
        &self.context
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn history(&self) -> &[PassRecord] {
        &self.history
    }

    pub fn shutdown_flag(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn into_parts(self) -> (ReconciliationContext, State, Vec<PassRecord>) {
        (self.context, self.state, self.history)
    }

    /// Leave Start. Idempotent.
    pub fn start(&mut self) {
        if self.state == State::Start {
            self.advance(Trigger::Enter);
        }
    }

    /// Accept one event and run the resulting transition chain to completion
    pub async fn handle(&mut self, event: Event) {
        self.start();
        tracing::debug!(instance = %self.context.instance, event = event.name(), state = %self.state, "handling event");

        if self.state == State::Help {
            self.store_in_help(event);
            return;
        }

        let trigger = match event {
            Event::NewDesiredState(tree) => {
                self.context.new = tree;
                Trigger::NewDesiredState
            }
            Event::SystemState(tree) => {
                self.context.discovered = tree;
                Trigger::SystemState
            }
            Event::Poll => Trigger::Poll,
            Event::Shutdown => {
                self.shutdown.request();
                return;
            }
        };

        self.passes = 0;
        if self.advance(trigger) {
            self.run_chain().await;
        }
    }

    fn store_in_help(&mut self, event: Event) {
        match event {
            Event::NewDesiredState(tree) => {
                tracing::warn!(instance = %self.context.instance, "stored new desired state while waiting for operator");
                self.context.new = tree;
            }
            Event::SystemState(tree) => {
                tracing::warn!(instance = %self.context.instance, "stored system state while waiting for operator");
                self.context.discovered = tree;
            }
            Event::Poll => {}
            Event::Shutdown => self.shutdown.request(),
        }
    }

    async fn run_chain(&mut self) {
        while !self.state.is_resting() {
            let trigger = match self.step().await {
                Ok(trigger) => trigger,
                Err(e) => {
                    self.abort(&e);
                    return;
                }
            };
            if !self.advance(trigger) {
                self.set_state(State::Waiting);
                return;
            }
        }

        if self.state == State::Help {
            tracing::error!(
                instance = %self.context.instance,
                "retry and revert both failed, operator intervention required"
            );
        }
    }

    fn advance(&mut self, trigger: Trigger) -> bool {
        match transition(self.state, trigger) {
            Some(next) => {
                self.set_state(next);
                true
            }
            None => {
                tracing::error!(state = %self.state, ?trigger, "trigger not accepted");
                false
            }
        }
    }

    fn set_state(&mut self, next: State) {
        tracing::info!(instance = %self.context.instance, from = %self.state, to = %next, "state changed");
        self.sink.put(TelemetryEvent::StateChanged {
            instance: self.context.instance.clone(),
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
    }

    /// Give up on the running chain and rest in Waiting
    fn abort(&mut self, error: &Error) {
        tracing::error!(instance = %self.context.instance, state = %self.state, error = %error, "reconciliation pass aborted");
        self.record(
            Uuid::new_v4(),
            JobKind::Apply,
            Vec::new(),
            PassOutcome::Aborted,
        );
        self.pending = None;
        self.set_state(State::Waiting);
    }

    /// Run the current state's work and report what happened
    async fn step(&mut self) -> Result<Trigger> {
        match self.state {
            State::Diff1 => {
                let (old, new) = (self.context.current.clone(), self.context.new.clone());
                self.diff(&old, &new)
            }
            State::Diff2 => {
                let (old, new) = (self.context.discovered.clone(), self.context.new.clone());
                let trigger = self.diff(&old, &new)?;
                if trigger == Trigger::NoDifference {
                    tracing::info!(
                        instance = %self.context.instance,
                        fingerprint = %fingerprint(&new),
                        "desired state applied"
                    );
                    self.context.current = new;
                }
                Ok(trigger)
            }
            State::Diff3 => {
                let (old, new) = (self.context.discovered.clone(), self.context.current.clone());
                self.diff(&old, &new)
            }
            State::Resolve1 | State::Resolve2 | State::Resolve3 => self.resolve().await,
            State::Discover1 => {
                self.discover().await;
                Ok(Trigger::DiscoveryComplete)
            }
            State::Discover2 => {
                self.context.discovered = self.context.current.clone();
                Ok(Trigger::DiscoveryComplete)
            }
            State::Retry => self.retry().await,
            State::Revert => self.revert().await,
            State::Start | State::Waiting | State::Help => Ok(Trigger::Enter),
        }
    }

    fn diff(&mut self, old: &StateTree, new: &StateTree) -> Result<Trigger> {
        let plan = plan(old, new, &self.context.rules)?;
        if !plan.unmatched.is_empty() {
            self.sink.put(TelemetryEvent::Unmatched {
                instance: self.context.instance.clone(),
                paths: plan.unmatched.clone(),
            });
        }
        if plan.is_empty() {
            self.pending = None;
            return Ok(Trigger::NoDifference);
        }
        self.pending = Some(plan);
        Ok(Trigger::Difference)
    }

    fn check_pass_limit(&mut self) -> Result<()> {
        self.passes += 1;
        if self.passes > self.config.max_passes {
            return Err(Error::NoConvergence {
                passes: self.config.max_passes,
            });
        }
        Ok(())
    }

    async fn resolve(&mut self) -> Result<Trigger> {
        self.check_pass_limit()?;
        let plan = self.pending.take().unwrap_or_default();

        let job = ExecutionJob::new(
            JobKind::Apply,
            plan.units(),
            self.context.state_bundle(),
            plan.diff_bundle(),
        );
        self.context.last_actions = plan.actions;
        let unresolved = plan.failures.len();

        let outcome = self.run_job(&job, unresolved).await;
        self.last_job = Some(ResolvedJob { job, unresolved });
        Ok(signal(outcome))
    }

    async fn retry(&mut self) -> Result<Trigger> {
        self.check_pass_limit()?;
        let Some((job, unresolved)) = self
            .last_job
            .as_ref()
            .map(|last| (last.job.rerun(JobKind::Retry), last.unresolved))
        else {
            return Ok(Trigger::Failure);
        };
        // Rerunning cannot resolve what the plan failed to resolve
        let outcome = self.run_job(&job, unresolved).await;
        Ok(signal(outcome))
    }

    async fn revert(&mut self) -> Result<Trigger> {
        self.check_pass_limit()?;
        let plan = match plan(&self.context.new, &self.context.current, &self.context.rules) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(instance = %self.context.instance, error = %e, "cannot plan revert");
                return Ok(Trigger::Failure);
            }
        };

        let job = ExecutionJob::new(
            JobKind::Revert,
            plan.units(),
            self.context.state_bundle(),
            plan.diff_bundle(),
        );
        let outcome = self.run_job(&job, plan.failures.len()).await;
        if outcome.is_success() {
            tracing::info!(instance = %self.context.instance, "reverted to current desired state");
            self.context.new = self.context.current.clone();
            self.context.last_actions = plan.actions;
            return Ok(Trigger::Success);
        }
        Ok(Trigger::Failure)
    }

    /// Retrieve actual state for the last resolved subtrees.
    ///
    /// Discovered state starts as a canonical copy of the new desired state,
    /// so subtree paths resolved against canonical trees address the same
    /// items; each retrieved subtree is spliced in at its path.
    async fn discover(&mut self) {
        let mut discovered = canonicalize(&self.context.new, &self.context.rules);
        let units: Vec<ExecutionUnit> = self
            .context
            .last_actions
            .iter()
            .enumerate()
            .map(|(index, action)| ExecutionUnit::discovery(action, index))
            .collect();

        let job = ExecutionJob::new(
            JobKind::Discover,
            units,
            self.context.state_bundle(),
            StateTree::Object(Default::default()),
        );

        if !job.is_noop() {
            match self.executor.execute(&job, &self.shutdown).await {
                Ok(outcome) if outcome.success => {
                    self.splice(&mut discovered, outcome);
                }
                Ok(_) => tracing::warn!(
                    instance = %self.context.instance,
                    "discovery failed, assuming desired state"
                ),
                Err(e) => tracing::warn!(
                    instance = %self.context.instance,
                    error = %e,
                    "discovery could not run, assuming desired state"
                ),
            }
        }

        self.context.discovered = discovered;
    }

    fn splice(&self, discovered: &mut StateTree, outcome: ExecutionOutcome) {
        for (index, subtree) in outcome.discovered {
            let Some(action) = self.context.last_actions.get(index) else {
                tracing::warn!(index, "discovered state for unknown unit, ignoring");
                continue;
            };
            if let Err(e) = replace(discovered, &action.subtree_path, subtree) {
                tracing::warn!(
                    path = %action.subtree_path,
                    error = %e,
                    "cannot place discovered subtree"
                );
            }
        }
    }

    /// Run a job and record the pass; any unresolved change fails it
    async fn run_job(&mut self, job: &ExecutionJob, unresolved: usize) -> PassOutcome {
        let actions: Vec<String> = job.units.iter().map(|u| u.name.clone()).collect();
        let mut outcome = if job.is_noop() {
            tracing::debug!(job = %job.id, "nothing to execute");
            PassOutcome::Skipped
        } else {
            match self.executor.execute(job, &self.shutdown).await {
                Ok(outcome) if outcome.success => PassOutcome::Success,
                Ok(_) => PassOutcome::Failure,
                Err(e) => {
                    tracing::error!(
                        executor = self.executor.name(),
                        job = %job.id,
                        error = %e,
                        "executor error"
                    );
                    PassOutcome::Failure
                }
            }
        };
        if unresolved > 0 && outcome.is_success() {
            tracing::warn!(
                instance = %self.context.instance,
                kind = %job.kind,
                failures = unresolved,
                "some changes could not be resolved"
            );
            outcome = PassOutcome::Failure;
        }

        tracing::info!(
            instance = %self.context.instance,
            state = %self.state,
            kind = %job.kind,
            units = job.units.len(),
            outcome = %outcome,
            "pass completed"
        );
        self.record(job.id, job.kind, actions, outcome);
        outcome
    }

    fn record(&mut self, id: Uuid, kind: JobKind, actions: Vec<String>, outcome: PassOutcome) {
        self.sink.put(TelemetryEvent::PassCompleted {
            instance: self.context.instance.clone(),
            state: self.state,
            actions: actions.len(),
            outcome,
        });
        self.history.push(PassRecord {
            id,
            state: self.state,
            kind,
            actions,
            outcome,
            at: Utc::now(),
        });
    }

    /// Run the VALIDATE tasks of the last resolved actions
    pub async fn validate_last(&mut self) -> Result<ExecutionOutcome> {
        let units: Vec<ExecutionUnit> = self
            .context
            .last_actions
            .iter()
            .map(ExecutionUnit::validation)
            .collect();
        let job = ExecutionJob::new(
            JobKind::Validate,
            units,
            self.context.state_bundle(),
            StateTree::Object(Default::default()),
        );
        if job.is_noop() {
            return Ok(ExecutionOutcome::success());
        }
        self.executor.execute(&job, &self.shutdown).await
    }
}

fn signal(outcome: PassOutcome) -> Trigger {
    if outcome.is_success() {
        Trigger::Success
    } else {
        Trigger::Failure
    }
}
