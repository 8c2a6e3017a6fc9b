//! Error types for converge-tree

use std::path::PathBuf;

/// Result type for converge-tree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in converge-tree operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid structural path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Not-found is an expected outcome when probing two trees for a subtree
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Failed to parse {format} document: {message}")]
    ParseError { format: String, message: String },

    #[error("Failed to read document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(path: impl ToString) -> Self {
        Self::PathNotFound {
            path: path.to_string(),
        }
    }

    pub fn parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            format: format.into(),
            message: message.into(),
        }
    }

    /// True when the error only says a location is absent from a tree
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. })
    }
}
