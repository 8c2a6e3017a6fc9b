//! Error types for converge-rules

/// Result type for converge-rules operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading rules or resolving changes
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rule selector did not compile to a valid pattern
    #[error("Invalid rule selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },

    /// The rule document does not match the rule schema
    #[error("Invalid rule document: {message}")]
    InvalidRules { message: String },

    /// A matched subtree exists in neither tree being compared.
    ///
    /// This is a rule/diff inconsistency, never transient drift.
    #[error("Structural invariant violated: `{path}` matched but is absent from both trees")]
    StructuralInvariant { path: String },

    /// A declared `vars` or `inventory_selector` sub-path could not be resolved
    /// against the matched subtree. Fatal to that one action only.
    #[error("Cannot resolve `{selector}` in subtree `{path}`: {reason}")]
    SelectorResolution {
        path: String,
        selector: String,
        reason: String,
    },

    #[error(transparent)]
    Tree(#[from] converge_tree::Error),
}

impl Error {
    pub fn selector_resolution(
        path: impl ToString,
        selector: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SelectorResolution {
            path: path.to_string(),
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that only invalidate a single resolved action
    pub fn is_action_local(&self) -> bool {
        matches!(self, Self::SelectorResolution { .. })
    }
}
