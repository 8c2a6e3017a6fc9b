//! Error types for converge-core

use std::path::PathBuf;

/// Result type for converge-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring, executing or driving a controller
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The action executor could not be started or its results could not be read
    #[error("Executor error: {message}")]
    Executor { message: String },

    /// One event triggered more resolve passes than allowed
    #[error("No convergence after {passes} passes")]
    NoConvergence { passes: usize },

    /// The controller task is gone
    #[error("Controller for `{instance}` is no longer running")]
    ControllerClosed { instance: String },

    /// The controller task panicked or was aborted
    #[error("Controller task failed: {message}")]
    ControllerTask { message: String },

    /// I/O error with path context
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Transparent wrappers for underlying crate errors
    #[error(transparent)]
    Rules(#[from] converge_rules::Error),

    #[error(transparent)]
    Tree(#[from] converge_tree::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn executor(message: impl Into<String>) -> Self {
        Self::Executor {
            message: message.into(),
        }
    }

    /// True for a rule/diff inconsistency that no retry can repair
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::Rules(converge_rules::Error::StructuralInvariant { .. })
        )
    }
}
