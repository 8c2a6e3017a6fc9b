//! Structural paths and subtree extraction
//!
//! A [`StructuralPath`] addresses a location inside a [`StateTree`] from its
//! root. It renders in the bracketed form used throughout change-sets and
//! rule selectors:
//!
//! - Mapping key steps: `root['routers']`
//! - Sequence index steps: `root['routers'][0]`
//! - Combined: `root['routers'][0]['interfaces'][1]['name']`
//!
//! Rule variables and inventory selectors may also use the shorter dotted
//! form relative to a subtree (`name`, `interfaces[0].name`), accepted by
//! [`StructuralPath::parse_relative`].
//!
//! # Examples
//!
//! ```
//! use converge_tree::path::{extract, PathSegment, StructuralPath};
//! use serde_json::json;
//!
//! let path = StructuralPath::parse("root['routers'][0]['name']").unwrap();
//! assert_eq!(path.segments(), &[
//!     PathSegment::Key("routers".to_string()),
//!     PathSegment::Index(0),
//!     PathSegment::Key("name".to_string()),
//! ]);
//!
//! let tree = json!({"routers": [{"name": "R1"}]});
//! assert_eq!(extract(&tree, &path).unwrap(), &json!("R1"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result, StateTree};

/// A single step of a structural path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// A key in a mapping (e.g., `'routers'` in `root['routers']`)
    Key(String),
    /// An index in a sequence (e.g., 0 in `root['routers'][0]`)
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) if key.contains('\\') || (key.contains('\'') && key.contains('"')) => {
                f.write_str("['")?;
                for c in key.chars() {
                    if c == '\\' || c == '\'' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("']")
            }
            PathSegment::Key(key) if key.contains('\'') => write!(f, "[\"{}\"]", key),
            PathSegment::Key(key) => write!(f, "['{}']", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Root-relative access path through a state tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructuralPath {
    segments: Vec<PathSegment>,
}

impl StructuralPath {
    /// The path of the tree root itself
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Path extended by a mapping key step
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.into()));
        Self { segments }
    }

    /// Path extended by a sequence index step
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    /// True when `prefix` addresses this location or one of its ancestors
    pub fn starts_with(&self, prefix: &StructuralPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Split off the last step, returning the parent path and that step
    pub fn parent(&self) -> Option<(StructuralPath, &PathSegment)> {
        let (last, rest) = self.segments.split_last()?;
        Some((Self::from_segments(rest.to_vec()), last))
    }

    /// Parse the bracketed `root[...]` form.
    ///
    /// Keys may be quoted with either single or double quotes; inside a key
    /// a backslash takes the next character literally.
    ///
    /// ```
    /// use converge_tree::path::{PathSegment, StructuralPath};
    ///
    /// let path = StructuralPath::parse(r#"root["it's"][3]"#).unwrap();
    /// assert_eq!(path.segments(), &[
    ///     PathSegment::Key("it's".to_string()),
    ///     PathSegment::Index(3),
    /// ]);
    /// assert!(StructuralPath::parse("routers[0]").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let rest = trimmed
            .strip_prefix("root")
            .ok_or_else(|| Error::invalid_path(input, "path must start with `root`"))?;

        let mut segments = Vec::new();
        let mut chars = rest.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != '[' {
                return Err(Error::invalid_path(input, format!("unexpected `{}`", ch)));
            }
            match chars.peek().copied() {
                Some(quote @ ('\'' | '"')) => {
                    chars.next();
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some(c) if c == quote => break,
                            Some('\\') => match chars.next() {
                                Some(c) => key.push(c),
                                None => return Err(Error::invalid_path(input, "unterminated key")),
                            },
                            Some(c) => key.push(c),
                            None => return Err(Error::invalid_path(input, "unterminated key")),
                        }
                    }
                    if chars.next() != Some(']') {
                        return Err(Error::invalid_path(input, "expected `]` after key"));
                    }
                    segments.push(PathSegment::Key(key));
                }
                Some(_) => {
                    let mut digits = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(c);
                    }
                    if !closed {
                        return Err(Error::invalid_path(input, "unterminated index"));
                    }
                    let index = digits.trim().parse::<usize>().map_err(|_| {
                        Error::invalid_path(input, format!("`{}` is not a sequence index", digits))
                    })?;
                    segments.push(PathSegment::Index(index));
                }
                None => return Err(Error::invalid_path(input, "dangling `[`")),
            }
        }

        Ok(Self { segments })
    }

    /// Parse a path relative to a subtree.
    ///
    /// Accepts the bracketed `root[...]` form as well as dotted keys with
    /// array indexing (`interfaces[0].name`). An empty string addresses the
    /// subtree itself.
    ///
    /// ```
    /// use converge_tree::path::{PathSegment, StructuralPath};
    ///
    /// let dotted = StructuralPath::parse_relative("interfaces[0].name").unwrap();
    /// let bracketed = StructuralPath::parse_relative("root['interfaces'][0]['name']").unwrap();
    /// assert_eq!(dotted, bracketed);
    /// assert!(StructuralPath::parse_relative("").unwrap().is_root());
    /// ```
    pub fn parse_relative(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed == "root" || trimmed.starts_with("root[") {
            return Self::parse(trimmed);
        }

        let mut segments = Vec::new();
        let mut current_key = String::new();
        let mut chars = trimmed.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    if !current_key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                    }
                }
                '[' => {
                    if !current_key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                    }
                    let mut index_str = String::new();
                    let mut closed = false;
                    for ch in chars.by_ref() {
                        if ch == ']' {
                            closed = true;
                            break;
                        }
                        index_str.push(ch);
                    }
                    if !closed {
                        return Err(Error::invalid_path(input, "unterminated index"));
                    }
                    let index = index_str.trim().parse::<usize>().map_err(|_| {
                        Error::invalid_path(
                            input,
                            format!("`{}` is not a sequence index", index_str),
                        )
                    })?;
                    segments.push(PathSegment::Index(index));
                }
                _ => current_key.push(ch),
            }
        }

        if !current_key.is_empty() {
            segments.push(PathSegment::Key(current_key));
        }

        Ok(Self { segments })
    }
}

impl fmt::Display for StructuralPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("root")?;
        for segment in &self.segments {
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for StructuralPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for StructuralPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StructuralPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Extract the subtree at `path`.
///
/// Fails with [`Error::PathNotFound`] when a key is missing, an index is out
/// of range, or the walk steps into a scalar.
pub fn extract<'a>(tree: &'a StateTree, path: &StructuralPath) -> Result<&'a StateTree> {
    let mut current = tree;
    for segment in path.segments() {
        let next = match segment {
            PathSegment::Key(key) => current.as_object().and_then(|map| map.get(key)),
            PathSegment::Index(index) => current.as_array().and_then(|seq| seq.get(*index)),
        };
        current = next.ok_or_else(|| Error::not_found(path))?;
    }
    Ok(current)
}

/// Mutable counterpart of [`extract`]
pub fn extract_mut<'a>(tree: &'a mut StateTree, path: &StructuralPath) -> Result<&'a mut StateTree> {
    let mut current = tree;
    for segment in path.segments() {
        let next = match segment {
            PathSegment::Key(key) => current.as_object_mut().and_then(|map| map.get_mut(key)),
            PathSegment::Index(index) => current.as_array_mut().and_then(|seq| seq.get_mut(*index)),
        };
        current = next.ok_or_else(|| Error::not_found(path))?;
    }
    Ok(current)
}

/// Replace the subtree at an existing location, returning the previous one.
///
/// Mapping keys under an existing parent mapping are inserted if missing;
/// sequence indices must already exist.
pub fn replace(tree: &mut StateTree, path: &StructuralPath, value: StateTree) -> Result<StateTree> {
    let Some((parent_path, last)) = path.parent() else {
        return Ok(std::mem::replace(tree, value));
    };
    let parent = extract_mut(tree, &parent_path)?;
    match last {
        PathSegment::Key(key) => {
            let map = parent.as_object_mut().ok_or_else(|| Error::not_found(path))?;
            Ok(map.insert(key.clone(), value).unwrap_or(StateTree::Null))
        }
        PathSegment::Index(index) => {
            let slot = parent
                .as_array_mut()
                .and_then(|seq| seq.get_mut(*index))
                .ok_or_else(|| Error::not_found(path))?;
            Ok(std::mem::replace(slot, value))
        }
    }
}
