//! Observability channel
//!
//! Controllers push [`TelemetryEvent`]s into an [`EventSink`]; what happens
//! to them (a socket, a log, a test assertion) is the sink's business.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use converge_tree::StructuralPath;

use crate::controller::PassOutcome;
use crate::fsm::State;

/// Something observable happened inside a controller
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    StateChanged {
        instance: String,
        from: State,
        to: State,
        at: DateTime<Utc>,
    },
    PassCompleted {
        instance: String,
        state: State,
        actions: usize,
        outcome: PassOutcome,
    },
    /// An event arrived while a transition chain was running
    EventBuffered {
        instance: String,
        event: String,
        pending: usize,
    },
    /// Changes no rule governs
    Unmatched {
        instance: String,
        paths: Vec<StructuralPath>,
    },
}

/// Receives telemetry events. Must not block.
pub trait EventSink: Send + Sync {
    fn put(&self, event: TelemetryEvent);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn put(&self, _event: TelemetryEvent) {}
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl ChannelSink {
    /// A sink and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn put(&self, event: TelemetryEvent) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.tx.send(event);
    }
}
