//! State trees, structural paths, and tree diffing for converge
//!
//! A [`StateTree`] is any tree-structured document: scalars, ordered
//! sequences, and mappings with string keys. Desired state, discovered state,
//! and every subtree pulled out of either are all state trees.
//!
//! - [`path`]: [`StructuralPath`] addressing and subtree extraction
//! - [`diff`]: structural comparison producing a categorized [`ChangeSet`]
//! - [`document`]: YAML/JSON loading and fingerprinting

pub mod diff;
pub mod document;
pub mod error;
pub mod path;

pub use diff::{ChangeSet, TreeKind, TypeChange, ValueChange, diff};
pub use document::{fingerprint, load_document, parse_json, parse_yaml, to_yaml_string};
pub use error::{Error, Result};
pub use path::{PathSegment, StructuralPath, extract, replace};

/// A tree-structured state document.
///
/// Mapping insertion order is preserved for serialization but is not
/// significant for comparison.
pub type StateTree = serde_json::Value;
