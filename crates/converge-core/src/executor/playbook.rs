//! Playbook-based action executor
//!
//! Each job gets a fresh private data directory laid out for
//! `ansible-runner`:
//!
//! ```text
//! <tmp>/
//!   env/settings        idle_timeout / job_timeout, both 0 (not enforced)
//!   env/cmdline
//!   env/passwords       only when a become password is configured
//!   inventory
//!   project/            copy of the configured project source
//!   project/playbook.yml
//!   project/state_vars.yml
//!   project/diff_vars.yml
//!   project/destructured_vars_<i>.yml
//! ```
//!
//! After a successful run, `project/discovered_state_<i>.yml` files written by
//! retrieve tasks are read back as discovered subtrees.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::Command;

use converge_rules::{ExecutionUnit, TaskRef};
use converge_tree::{StateTree, parse_yaml, to_yaml_string};

use super::{ActionExecutor, ExecutionJob, ExecutionOutcome, ShutdownFlag};
use crate::config::ExecutorConfig;
use crate::{Error, Result};

const PLAYBOOK_FILE: &str = "playbook.yml";
const STATE_VARS_FILE: &str = "state_vars.yml";
const DIFF_VARS_FILE: &str = "diff_vars.yml";

/// How often the shutdown flag is checked while the runner is going
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Runs execution units as plays through an external runner program
#[derive(Debug, Clone)]
pub struct PlaybookExecutor {
    config: ExecutorConfig,
}

impl PlaybookExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Lay out the private data directory for `job` under `dir`
    pub fn write_workspace(&self, job: &ExecutionJob, dir: &Path) -> Result<()> {
        let env_dir = dir.join("env");
        let project_dir = dir.join("project");
        create_dir(&env_dir)?;
        create_dir(&project_dir.join("roles"))?;

        if self.config.project_src.is_dir() {
            copy_tree(&self.config.project_src, &project_dir)?;
        } else {
            tracing::warn!(
                path = %self.config.project_src.display(),
                "project source is not a directory, nothing copied"
            );
        }

        let password = self.become_password();

        write_file(
            &env_dir.join("settings"),
            &json!({"idle_timeout": 0, "job_timeout": 0}).to_string(),
        )?;
        let cmdline = match password {
            Some(_) => format!("--ask-become-pass {}", self.config.cmdline),
            None => self.config.cmdline.clone(),
        };
        write_file(&env_dir.join("cmdline"), cmdline.trim())?;
        if let Some(password) = password {
            let passwords = json!({
                "SUDO password:": password,
                "BECOME password:": password,
            });
            write_file(&env_dir.join("passwords"), &to_yaml_string(&passwords)?)?;
        }

        write_file(&dir.join("inventory"), &self.config.inventory)?;
        write_file(&project_dir.join(STATE_VARS_FILE), &to_yaml_string(&job.state)?)?;
        write_file(&project_dir.join(DIFF_VARS_FILE), &to_yaml_string(&job.diff)?)?;
        for (index, unit) in job.units.iter().enumerate() {
            write_file(
                &project_dir.join(destructured_vars_file(index)),
                &to_yaml_string(&Value::Object(unit.vars.clone()))?,
            )?;
        }
        write_file(&project_dir.join(PLAYBOOK_FILE), &to_yaml_string(&playbook(&job.units))?)?;

        Ok(())
    }

    fn become_password(&self) -> Option<String> {
        let var = self.config.become_password_env.as_deref()?;
        std::env::var(var).ok().filter(|p| !p.is_empty())
    }

    /// Run the runner program over `dir`, returning whether it exited cleanly
    async fn run_runner(&self, dir: &Path, shutdown: &ShutdownFlag) -> Result<bool> {
        let mut child = Command::new(&self.config.program)
            .arg("run")
            .arg(dir)
            .arg("-p")
            .arg(PLAYBOOK_FILE)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::executor(format!("failed to start `{}`: {}", self.config.program, e)))?;

        loop {
            if let Some(status) = child.try_wait().map_err(|e| Error::io(dir, e))? {
                tracing::debug!(status = %status, "runner exited");
                return Ok(status.success());
            }
            if shutdown.is_requested() {
                tracing::info!("shutdown requested, stopping runner");
                child.kill().await.map_err(|e| Error::io(dir, e))?;
                return Ok(false);
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
    }
}

#[async_trait]
impl ActionExecutor for PlaybookExecutor {
    fn name(&self) -> &str {
        &self.config.program
    }

    async fn execute(&self, job: &ExecutionJob, shutdown: &ShutdownFlag) -> Result<ExecutionOutcome> {
        let workspace = tempfile::Builder::new()
            .prefix("converge_playbook")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        let dir = workspace.path();

        {
            let executor = self.clone();
            let job = job.clone();
            let dir = dir.to_path_buf();
            blocking(move || executor.write_workspace(&job, &dir)).await?;
        }
        tracing::info!(
            job = %job.id,
            kind = %job.kind,
            units = job.units.len(),
            dir = %dir.display(),
            "starting playbook run"
        );

        if !self.run_runner(dir, shutdown).await? {
            return Ok(ExecutionOutcome::failure());
        }

        let project_dir = dir.join("project");
        let units = job.units.len();
        let discovered = blocking(move || read_discovered(&project_dir, units)).await?;
        Ok(ExecutionOutcome {
            success: true,
            discovered,
        })
    }
}

/// Run filesystem work off the async worker threads
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::executor(format!("workspace task failed: {}", e)))?
}

fn destructured_vars_file(index: usize) -> String {
    format!("destructured_vars_{}.yml", index)
}

fn discovered_state_file(index: usize) -> String {
    format!("discovered_state_{}.yml", index)
}

fn include_vars(file: &str, name: Option<&str>, title: &str) -> Value {
    let mut args = Map::new();
    args.insert("file".to_string(), Value::from(file));
    if let Some(name) = name {
        args.insert("name".to_string(), Value::from(name));
    }
    json!({"name": title, "include_vars": Value::Object(args)})
}

fn task(unit: &ExecutionUnit, task: &TaskRef) -> Value {
    match task {
        TaskRef::Tasks(file) => json!({"name": unit.name, "include_tasks": {"file": file}}),
        TaskRef::Role(role) => json!({"name": unit.name, "include_role": {"name": role}}),
    }
}

/// One play per unit, variable includes first
pub fn playbook(units: &[ExecutionUnit]) -> StateTree {
    let plays = units
        .iter()
        .enumerate()
        .map(|(index, unit)| {
            let mut tasks = vec![
                include_vars(&destructured_vars_file(index), None, "include destructured_vars"),
                include_vars(DIFF_VARS_FILE, Some("diff"), "include diff_vars"),
                include_vars(STATE_VARS_FILE, Some("state"), "include state_vars"),
            ];
            tasks.extend(unit.tasks.iter().map(|t| task(unit, t)));

            let mut play = Map::new();
            play.insert("name".to_string(), Value::from(unit.name.as_str()));
            play.insert("hosts".to_string(), Value::from(unit.hosts.as_str()));
            play.insert("gather_facts".to_string(), Value::Bool(false));
            if let Some(escalate) = unit.escalate {
                play.insert("become".to_string(), Value::Bool(escalate));
            }
            play.insert("tasks".to_string(), Value::Array(tasks));
            Value::Object(play)
        })
        .collect();
    Value::Array(plays)
}

fn read_discovered(project_dir: &Path, units: usize) -> Result<BTreeMap<usize, StateTree>> {
    let mut discovered = BTreeMap::new();
    for index in 0..units {
        let path = project_dir.join(discovered_state_file(index));
        if !path.is_file() {
            continue;
        }
        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        discovered.insert(index, parse_yaml(&content)?);
    }
    tracing::debug!(count = discovered.len(), "read discovered state artifacts");
    Ok(discovered)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io(path, e))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| Error::io(path, e))
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    create_dir(dest)?;
    for entry in fs::read_dir(src).map_err(|e| Error::io(src, e))? {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| Error::io(&from, e))?;
        }
    }
    Ok(())
}
