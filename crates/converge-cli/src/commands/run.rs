//! Run command implementation
//!
//! Drives one controller against the playbook runner. Without `--watch` the
//! controller handles the desired state once and the command reports where
//! it came to rest; with `--watch` it keeps polling until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use converge_core::{
    ControllerReport, ConvergeConfig, Event, PlaybookExecutor, ReconciliationContext,
    ReconciliationController, State, join_controller, spawn_controller,
};
use converge_rules::RuleSet;
use converge_tree::{StateTree, load_document};

use crate::error::{CliError, Result};

/// Arguments of `converge run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub desired: PathBuf,
    pub rules: PathBuf,
    pub current: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub instance: String,
    pub watch: bool,
    pub json: bool,
}

/// Run the controller; exits 0 when it came to rest converged
pub async fn run_reconcile(options: RunOptions) -> Result<i32> {
    let config = ConvergeConfig::discover(options.config.as_deref())?;
    let rules = Arc::new(RuleSet::load(&options.rules)?);
    let desired = load_document(&options.desired)?;
    let current = match &options.current {
        Some(path) => load_document(path)?,
        None => StateTree::Object(Default::default()),
    };

    let mut controller_config = config.controller.clone();
    if options.watch {
        if controller_config.poll_interval().is_none() {
            return Err(CliError::user(
                "--watch needs controller.poll_interval_secs > 0 in the configuration",
            ));
        }
    } else {
        controller_config.poll_interval_secs = 0;
    }

    let context = ReconciliationContext::new(options.instance.clone(), rules).with_current(current);
    let executor = Arc::new(PlaybookExecutor::new(config.executor.clone()));
    let controller = ReconciliationController::new(context, executor).with_config(controller_config);

    tracing::info!(instance = %options.instance, desired = %options.desired.display(), "reconciling");

    let report = if options.watch {
        watch(controller, desired).await?
    } else {
        once(controller, desired).await?
    };

    print_report(&report, options.json)?;
    Ok(exit_code(&report))
}

/// Handle the desired state in-process; Ctrl-C stops the running job
async fn once(mut controller: ReconciliationController, desired: StateTree) -> Result<ControllerReport> {
    let shutdown = controller.shutdown_flag().clone();
    {
        let chain = controller.handle(Event::NewDesiredState(desired));
        tokio::pin!(chain);
        tokio::select! {
            _ = &mut chain => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("interrupted, stopping the running job");
                shutdown.request();
                chain.await;
            }
        }
    }
    Ok(ControllerReport::from(controller))
}

/// Spawn the controller and keep it polling until Ctrl-C
async fn watch(controller: ReconciliationController, desired: StateTree) -> Result<ControllerReport> {
    let (handle, task) = spawn_controller(controller);
    handle.desired_state(desired).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(instance = %handle.instance(), "interrupted, shutting down");
    handle.shutdown().await?;

    Ok(join_controller(task).await?)
}

fn exit_code(report: &ControllerReport) -> i32 {
    let converged = report.state == State::Waiting
        && report
            .history
            .last()
            .is_none_or(|pass| pass.outcome.is_success());
    if converged { 0 } else { 1 }
}

fn print_report(report: &ControllerReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for pass in &report.history {
        let outcome = if pass.outcome.is_success() {
            pass.outcome.to_string().green()
        } else {
            pass.outcome.to_string().red()
        };
        println!(
            "{} {:<8} {:<8} {}",
            pass.at.format("%H:%M:%S").to_string().dimmed(),
            pass.kind.to_string(),
            outcome,
            pass.actions.join(", ")
        );
    }

    match report.state {
        State::Help => println!(
            "{} {} needs attention: reconciliation failed and could not be reverted",
            "HELP".red().bold(),
            report.instance
        ),
        _ if exit_code(report) == 0 => println!(
            "{} {} converged {}",
            "OK".green().bold(),
            report.instance,
            report.current_fingerprint.dimmed()
        ),
        _ => println!(
            "{} {} did not converge",
            "FAILED".red().bold(),
            report.instance
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::JobKind;
    use converge_test_utils::{Scenario, ScriptedExecutor};

    fn controller(executor: &ScriptedExecutor) -> (ReconciliationController, Scenario) {
        let scenario = Scenario::load("add_to_empty");
        let context = ReconciliationContext::new("edge-1", Arc::clone(&scenario.rules))
            .with_current(scenario.old.clone());
        let controller = ReconciliationController::new(context, Arc::new(executor.clone()));
        (controller, scenario)
    }

    #[tokio::test]
    async fn test_once_converges() {
        let executor = ScriptedExecutor::new();
        let (controller, scenario) = controller(&executor);

        let report = once(controller, scenario.new.clone()).await.unwrap();
        assert_eq!(report.current, scenario.new);
        assert_eq!(exit_code(&report), 0);
        assert_eq!(executor.kinds(), vec![JobKind::Apply, JobKind::Discover]);
    }

    #[tokio::test]
    async fn test_help_is_a_failing_exit() {
        let executor = ScriptedExecutor::new().then_fail().then_fail().then_fail();
        let (controller, scenario) = controller(&executor);

        let report = once(controller, scenario.new.clone()).await.unwrap();
        assert_eq!(report.state, State::Help);
        assert_eq!(exit_code(&report), 1);
    }

    #[tokio::test]
    async fn test_watch_requires_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("converge.toml");
        std::fs::write(&config, "[controller]\npoll_interval_secs = 0\n").unwrap();

        let fixtures = converge_test_utils::fixtures_dir().join("scenarios/add_to_empty");
        let options = RunOptions {
            desired: fixtures.join("new.yaml"),
            rules: fixtures.join("rules.yaml"),
            current: None,
            config: Some(config),
            instance: "edge-1".to_string(),
            watch: true,
            json: false,
        };

        let err = run_reconcile(options).await.unwrap_err();
        assert!(matches!(err, CliError::User { .. }));
    }
}
