//! Controller behaviour driven through a scripted executor

use std::sync::Arc;

use converge_core::{
    ChannelSink, ControllerConfig, Event, ExecutionOutcome, JobKind, PassOutcome,
    ReconciliationContext, ReconciliationController, State, TelemetryEvent,
};
use converge_test_utils::{Scenario, ScriptedExecutor};
use pretty_assertions::assert_eq;
use serde_json::json;

fn controller(scenario: &Scenario, executor: &ScriptedExecutor) -> ReconciliationController {
    let context = ReconciliationContext::new("edge-1", Arc::clone(&scenario.rules))
        .with_current(scenario.old.clone());
    ReconciliationController::new(context, Arc::new(executor.clone()))
}

#[tokio::test]
async fn test_new_desired_state_is_applied() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new();
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(controller.context().current, scenario.new);
    assert_eq!(executor.kinds(), vec![JobKind::Apply, JobKind::Discover]);

    let apply = &executor.jobs()[0];
    assert_eq!(apply.units.len(), 1);
    assert_eq!(apply.units[0].name, "CREATE root['routers'][0] all");
    assert!(apply.diff.get("dictionary_item_added").is_some());

    let discover = &executor.jobs()[1];
    assert_eq!(discover.units[0].name, "discovery for all discovery_id 0");

    assert_eq!(controller.history().len(), 1);
    assert_eq!(controller.history()[0].outcome, PassOutcome::Success);
}

#[tokio::test]
async fn test_unchanged_desired_state_runs_nothing() {
    let scenario = Scenario::load("reorder");
    let executor = ScriptedExecutor::new();
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert!(executor.jobs().is_empty());
    assert!(controller.history().is_empty());
}

#[tokio::test]
async fn test_failure_then_retry_success() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new().then_fail();
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(controller.context().current, scenario.new);
    assert_eq!(
        executor.kinds(),
        vec![JobKind::Apply, JobKind::Retry, JobKind::Discover]
    );

    let jobs = executor.jobs();
    assert_eq!(jobs[0].units, jobs[1].units);
    assert_ne!(jobs[0].id, jobs[1].id);
}

#[tokio::test]
async fn test_executor_error_counts_as_failure() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new().then_error("runner not installed");
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(executor.kinds()[..2], [JobKind::Apply, JobKind::Retry]);
    assert_eq!(controller.history()[0].outcome, PassOutcome::Failure);
}

#[tokio::test]
async fn test_successful_revert_restores_current() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new().then_fail().then_fail();
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(controller.context().current, scenario.old);
    assert_eq!(controller.context().new, scenario.old);
    assert_eq!(
        executor.kinds(),
        vec![
            JobKind::Apply,
            JobKind::Retry,
            JobKind::Revert,
            JobKind::Discover
        ]
    );
    assert_eq!(
        executor.jobs()[2].units[0].name,
        "DELETE root['routers'][0] all"
    );
}

#[tokio::test]
async fn test_two_failures_after_apply_end_in_help() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new().then_fail().then_fail().then_fail();
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Help);
    assert_eq!(controller.context().current, scenario.old);
    assert_eq!(
        executor.kinds(),
        vec![JobKind::Apply, JobKind::Retry, JobKind::Revert]
    );

    // Help keeps storing desired state but never resumes on its own
    let later = json!({"hostname": "edge-2"});
    controller.handle(Event::NewDesiredState(later.clone())).await;
    controller.handle(Event::Poll).await;

    assert_eq!(controller.state(), State::Help);
    assert_eq!(controller.context().new, later);
    assert_eq!(executor.jobs().len(), 3);
}

#[tokio::test]
async fn test_discovered_drift_is_resolved_again() {
    let scenario = Scenario::load("add_to_empty");
    let drifted = ExecutionOutcome::success().with_discovered(0, json!({"name": "R1", "shutdown": true}));
    let executor = ScriptedExecutor::new().then_succeed().then_discover(drifted);
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(controller.context().current, scenario.new);
    assert_eq!(
        executor.kinds(),
        vec![
            JobKind::Apply,
            JobKind::Discover,
            JobKind::Apply,
            JobKind::Discover
        ]
    );
    // Second apply brings the drifted router back in line
    assert_eq!(
        executor.jobs()[2].units[0].name,
        "UPDATE root['routers'][0] all"
    );
}

#[tokio::test]
async fn test_failed_discovery_assumes_desired_state() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new().then_succeed().then_fail();
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(controller.context().current, scenario.new);
    assert_eq!(controller.context().discovered, scenario.new);
}

#[tokio::test]
async fn test_pass_limit_parks_in_waiting() {
    let scenario = Scenario::load("add_to_empty");
    let mut executor = ScriptedExecutor::new();
    for _ in 0..6 {
        executor = executor.then_succeed().then_discover(
            ExecutionOutcome::success().with_discovered(0, json!({"name": "R1", "flapping": true})),
        );
    }
    let mut controller = controller(&scenario, &executor).with_config(ControllerConfig {
        max_passes: 3,
        ..ControllerConfig::default()
    });

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(controller.context().current, scenario.old);
    let last = controller.history().last().unwrap();
    assert_eq!(last.outcome, PassOutcome::Aborted);
    assert_eq!(
        executor
            .kinds()
            .iter()
            .filter(|k| **k == JobKind::Apply)
            .count(),
        3
    );
}

#[tokio::test]
async fn test_system_state_drift_is_repaired() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new();
    let context = ReconciliationContext::new("edge-1", Arc::clone(&scenario.rules))
        .with_current(scenario.new.clone());
    let mut controller = ReconciliationController::new(context, Arc::new(executor.clone()));

    // The router disappeared behind our back
    controller
        .handle(Event::SystemState(scenario.old.clone()))
        .await;

    assert_eq!(controller.state(), State::Waiting);
    assert_eq!(executor.kinds(), vec![JobKind::Apply]);
    assert_eq!(
        executor.jobs()[0].units[0].name,
        "CREATE root['routers'][0] all"
    );
    assert_eq!(controller.context().discovered, scenario.new);
}

#[tokio::test]
async fn test_poll_without_drift_is_quiet() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new();
    let mut controller = controller(&scenario, &executor);

    controller.handle(Event::Poll).await;

    assert_eq!(controller.state(), State::Waiting);
    assert!(executor.jobs().is_empty());
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new();
    let (sink, mut rx) = ChannelSink::new();
    let mut controller = controller(&scenario, &executor).with_sink(Arc::new(sink));

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;
    drop(controller);

    let mut visited = Vec::new();
    while let Some(event) = rx.recv().await {
        if let TelemetryEvent::StateChanged { to, .. } = event {
            visited.push(to);
        }
    }
    assert_eq!(
        visited,
        vec![
            State::Waiting,
            State::Diff1,
            State::Resolve1,
            State::Discover1,
            State::Diff2,
            State::Waiting,
        ]
    );
}

#[tokio::test]
async fn test_validate_last_runs_validate_tasks() {
    let scenario = Scenario::load("add_to_empty");
    let executor = ScriptedExecutor::new();
    let mut controller = controller(&scenario, &executor);

    controller
        .handle(Event::NewDesiredState(scenario.new.clone()))
        .await;
    let outcome = controller.validate_last().await.unwrap();

    assert!(outcome.success);
    assert_eq!(executor.kinds().last(), Some(&JobKind::Validate));
}

const HOST_ROUTED_RULES: &str = r"
rules:
  - rule_selector: root['routers'][\d+]
    inventory_selector: host
    create:
      tasks: create_router.yml
    delete:
      tasks: delete_router.yml
";

fn host_routed_rules() -> Arc<converge_rules::RuleSet> {
    Arc::new(converge_rules::RuleSet::parse_yaml(HOST_ROUTED_RULES).unwrap())
}

#[tokio::test]
async fn test_unresolvable_change_escalates_to_help() {
    let executor = ScriptedExecutor::new();
    let context = ReconciliationContext::new("edge-1", host_routed_rules()).with_current(json!({}));
    let mut controller = ReconciliationController::new(context, Arc::new(executor.clone()));

    let new = json!({"routers": [{"name": "R1"}]});
    controller.handle(Event::NewDesiredState(new.clone())).await;

    assert_eq!(controller.state(), State::Help);
    assert_ne!(controller.context().current, new);
    assert!(executor.jobs().is_empty());

    let passes: Vec<_> = controller
        .history()
        .iter()
        .map(|pass| (pass.kind, pass.outcome))
        .collect();
    assert_eq!(
        passes,
        vec![
            (JobKind::Apply, PassOutcome::Failure),
            (JobKind::Retry, PassOutcome::Failure),
            (JobKind::Revert, PassOutcome::Failure),
        ]
    );
}

#[tokio::test]
async fn test_partially_resolved_pass_is_recorded_as_failure() {
    let executor = ScriptedExecutor::new();
    let (sink, mut rx) = ChannelSink::new();
    let context = ReconciliationContext::new("edge-1", host_routed_rules()).with_current(json!({}));
    let mut controller =
        ReconciliationController::new(context, Arc::new(executor.clone())).with_sink(Arc::new(sink));

    let new = json!({"routers": [{"name": "R1", "host": "h1"}, {"name": "R2"}]});
    controller.handle(Event::NewDesiredState(new.clone())).await;

    // The resolvable sibling still runs on every pass
    assert_eq!(
        executor.kinds(),
        vec![JobKind::Apply, JobKind::Retry, JobKind::Revert]
    );
    assert_eq!(executor.jobs()[0].units.len(), 1);
    assert_eq!(controller.state(), State::Help);
    assert!(
        controller
            .history()
            .iter()
            .all(|pass| pass.outcome == PassOutcome::Failure)
    );
    drop(controller);

    let mut published = Vec::new();
    while let Some(event) = rx.recv().await {
        if let TelemetryEvent::PassCompleted { outcome, .. } = event {
            published.push(outcome);
        }
    }
    assert_eq!(published, vec![PassOutcome::Failure; 3]);
}
