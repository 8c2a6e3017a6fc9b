//! Loading and serializing state documents

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{Error, Result, StateTree};

/// Parse a YAML document into a state tree.
///
/// An empty document is the absent tree (`null`).
pub fn parse_yaml(content: &str) -> Result<StateTree> {
    if content.trim().is_empty() {
        return Ok(StateTree::Null);
    }
    serde_yaml::from_str(content).map_err(|e| Error::parse("YAML", e.to_string()))
}

/// Parse a JSON document into a state tree
pub fn parse_json(content: &str) -> Result<StateTree> {
    serde_json::from_str(content).map_err(|e| Error::parse("JSON", e.to_string()))
}

/// Load a document from disk, choosing the format by extension.
///
/// `.json` files are parsed as JSON; everything else as YAML.
pub fn load_document(path: &Path) -> Result<StateTree> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        parse_json(&content)
    } else {
        parse_yaml(&content)
    }
}

/// Serialize a tree as block-style YAML
pub fn to_yaml_string(tree: &StateTree) -> Result<String> {
    Ok(serde_yaml::to_string(tree)?)
}

/// SHA-256 fingerprint of a tree's canonical JSON encoding
pub fn fingerprint(tree: &StateTree) -> String {
    let encoded = serde_json::to_vec(tree).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    format!("sha256:{:x}", hasher.finalize())
}
