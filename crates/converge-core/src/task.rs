//! Controller task and handle
//!
//! Each controller runs as its own tokio task with a private inbox. While a
//! transition chain runs, the task keeps draining the inbox into a buffer so
//! senders never wait on reconciliation; every time the controller comes to
//! rest, one buffered event is taken before the inbox is read again.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use converge_tree::{StateTree, fingerprint};

use crate::controller::{Event, PassRecord, ReconciliationController};
use crate::fsm::State;
use crate::telemetry::TelemetryEvent;
use crate::{Error, Result};

/// Inbox capacity of a spawned controller
pub const INBOX_CAPACITY: usize = 64;

/// Sends events to a running controller. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    instance: String,
    tx: mpsc::Sender<Event>,
}

impl ControllerHandle {
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub async fn send(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::ControllerClosed {
                instance: self.instance.clone(),
            })
    }

    pub async fn desired_state(&self, tree: StateTree) -> Result<()> {
        self.send(Event::NewDesiredState(tree)).await
    }

    pub async fn system_state(&self, tree: StateTree) -> Result<()> {
        self.send(Event::SystemState(tree)).await
    }

    pub async fn poll(&self) -> Result<()> {
        self.send(Event::Poll).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Event::Shutdown).await
    }
}

/// What a controller task leaves behind
#[derive(Debug, Clone, Serialize)]
pub struct ControllerReport {
    pub instance: String,
    pub state: State,
    pub current: StateTree,
    /// [`fingerprint`] of `current`
    pub current_fingerprint: String,
    pub discovered: StateTree,
    pub history: Vec<PassRecord>,
}

impl From<ReconciliationController> for ControllerReport {
    fn from(controller: ReconciliationController) -> Self {
        let (context, state, history) = controller.into_parts();
        Self {
            instance: context.instance,
            state,
            current_fingerprint: fingerprint(&context.current),
            current: context.current,
            discovered: context.discovered,
            history,
        }
    }
}

/// Spawn `controller` onto the current tokio runtime.
///
/// The task ends on `Shutdown`, or once every handle is dropped and the
/// buffer is empty.
pub fn spawn_controller(
    controller: ReconciliationController,
) -> (ControllerHandle, JoinHandle<ControllerReport>) {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    let handle = ControllerHandle {
        instance: controller.context().instance.clone(),
        tx,
    };
    let task = tokio::spawn(run(controller, rx));
    (handle, task)
}

/// Wait for a spawned controller and unwrap its report
pub async fn join_controller(task: JoinHandle<ControllerReport>) -> Result<ControllerReport> {
    task.await.map_err(|e| Error::ControllerTask {
        message: e.to_string(),
    })
}

fn poll_ticker(period: Option<Duration>) -> Option<Interval> {
    let period = period?;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run(mut controller: ReconciliationController, mut rx: mpsc::Receiver<Event>) -> ControllerReport {
    controller.start();

    let instance = controller.context().instance.clone();
    let shutdown = controller.shutdown_flag().clone();
    let sink = controller.sink().clone();
    let mut ticker = poll_ticker(controller.config().poll_interval());
    let mut buffered: VecDeque<Event> = VecDeque::new();
    let mut inbox_open = true;

    tracing::info!(instance = %instance, "controller started");

    loop {
        let event = match buffered.pop_front() {
            Some(event) => event,
            None if !inbox_open => break,
            None => tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
                _ = next_tick(&mut ticker) => Event::Poll,
            },
        };

        if matches!(event, Event::Shutdown) {
            shutdown.request();
            break;
        }

        let mut stop = false;
        {
            let chain = controller.handle(event);
            tokio::pin!(chain);
            loop {
                tokio::select! {
                    _ = &mut chain => break,
                    received = rx.recv(), if inbox_open => match received {
                        Some(Event::Shutdown) => {
                            tracing::info!(instance = %instance, "shutdown requested mid-reconciliation");
                            shutdown.request();
                            stop = true;
                        }
                        Some(event) => {
                            let name = event.name();
                            tracing::debug!(instance = %instance, event = name, "buffering event");
                            buffered.push_back(event);
                            sink.put(TelemetryEvent::EventBuffered {
                                instance: instance.clone(),
                                event: name.to_string(),
                                pending: buffered.len(),
                            });
                        }
                        None => inbox_open = false,
                    },
                }
            }
        }
        if stop {
            break;
        }
    }

    tracing::info!(instance = %instance, state = %controller.state(), "controller stopped");
    ControllerReport::from(controller)
}
