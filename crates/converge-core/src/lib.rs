//! Reconciliation controller, action executor and configuration for converge
//!
//! - [`fsm`]: the state machine as a pure transition table
//! - [`controller`]: per-instance controller running transition chains
//! - [`task`]: controller tasks, handles and reports
//! - [`executor`]: the action executor interface and the playbook runner
//! - [`telemetry`]: observability events and sinks
//! - [`config`]: `converge.toml`

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod executor;
pub mod fsm;
pub mod task;
pub mod telemetry;

pub use config::{ControllerConfig, ConvergeConfig, ExecutorConfig};
pub use context::ReconciliationContext;
pub use controller::{Event, PassOutcome, PassRecord, ReconciliationController};
pub use error::{Error, Result};
pub use executor::{
    ActionExecutor, ExecutionJob, ExecutionOutcome, JobKind, PlaybookExecutor, ShutdownFlag,
};
pub use fsm::{State, Trigger};
pub use task::{ControllerHandle, ControllerReport, join_controller, spawn_controller};
pub use telemetry::{ChannelSink, EventSink, NullSink, TelemetryEvent};
