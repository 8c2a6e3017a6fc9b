//! `converge.toml` parsing
//!
//! Every field is defaulted, so an empty file (or no file) is a valid
//! configuration.
//!
//! ```toml
//! [controller]
//! poll_interval_secs = 0   # 0 disables the poll ticker
//! max_passes = 32
//!
//! [executor]
//! program = "ansible-runner"
//! project_src = "."
//! cmdline = "-v"
//! become_password_env = "CONVERGE_BECOME_PASSWORD"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default file name looked up in the working directory
pub const CONFIG_FILE: &str = "converge.toml";

fn default_max_passes() -> usize {
    32
}

fn default_program() -> String {
    "ansible-runner".to_string()
}

fn default_project_src() -> PathBuf {
    PathBuf::from(".")
}

fn default_inventory() -> String {
    "[all]\nlocalhost ansible_connection=local\n".to_string()
}

fn default_cmdline() -> String {
    "-v".to_string()
}

fn default_become_password_env() -> Option<String> {
    Some("CONVERGE_BECOME_PASSWORD".to_string())
}

/// Controller loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Seconds between poll ticks; 0 disables polling
    #[serde(default)]
    pub poll_interval_secs: u64,

    /// Resolve passes one event may trigger before the controller gives up
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 0,
            max_passes: default_max_passes(),
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

/// Playbook runner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Runner program invoked as `<program> run <dir> -p playbook.yml`
    #[serde(default = "default_program")]
    pub program: String,

    /// Directory whose contents are copied into every job's project directory
    #[serde(default = "default_project_src")]
    pub project_src: PathBuf,

    /// Inventory file contents
    #[serde(default = "default_inventory")]
    pub inventory: String,

    /// Extra command line passed through `env/cmdline`
    #[serde(default = "default_cmdline")]
    pub cmdline: String,

    /// Environment variable holding the privilege escalation password
    #[serde(default = "default_become_password_env")]
    pub become_password_env: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            project_src: default_project_src(),
            inventory: default_inventory(),
            cmdline: default_cmdline(),
            become_password_env: default_become_password_env(),
        }
    }
}

/// Parsed `converge.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergeConfig {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl ConvergeConfig {
    /// Parse a configuration from TOML content
    ///
    /// ```
    /// use converge_core::config::ConvergeConfig;
    ///
    /// let config = ConvergeConfig::parse("[controller]\nmax_passes = 4\n").unwrap();
    /// assert_eq!(config.controller.max_passes, 4);
    /// assert_eq!(config.executor.program, "ansible-runner");
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Load from `path`. Relative `project_src` is resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = Self::parse(&content)?;

        if config.executor.project_src.is_relative() {
            if let Some(dir) = path.parent() {
                config.executor.project_src = dir.join(&config.executor.project_src);
            }
        }
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else `./converge.toml` if present, else defaults
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
