//! Rule selector compilation
//!
//! A selector is a structural path literal such as `root['routers'][0]`
//! which may embed raw regular-expression fragments, most commonly `\d+`
//! for "any sequence index": `root['routers'][\d+]`.
//!
//! Compilation escapes only the path punctuation (brackets, quotes, braces,
//! parentheses, pipe, anchors, dot, hyphen, `&`, `~`, hash, whitespace) so it
//! matches literally. Alphanumerics, `+`, `*`, `?` and backslash pass through
//! untouched, which is what lets `\d+` keep its regex meaning.

use regex::Regex;

use crate::{Error, Result};

/// Characters escaped with a backslash
const LITERAL_PUNCTUATION: &[char] = &[
    '(', ')', '[', ']', '{', '}', '-', '|', '^', '$', '.', '&', '~', '#', '\'', '"',
];

/// Escape the structural punctuation of a selector
///
/// ```
/// use converge_rules::matcher::escape;
///
/// assert_eq!(escape(r"root['routers'][\d+]"), r"root\[\'routers\'\]\[\d+\]");
/// ```
pub fn escape(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len() * 2);
    for ch in selector.chars() {
        match ch {
            ' ' => out.push_str(r"\x20"),
            '\t' => out.push_str(r"\t"),
            '\n' => out.push_str(r"\n"),
            '\r' => out.push_str(r"\r"),
            '\x0b' => out.push_str(r"\v"),
            '\x0c' => out.push_str(r"\f"),
            c if LITERAL_PUNCTUATION.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// A compiled rule selector
#[derive(Debug, Clone)]
pub struct PathMatcher {
    selector: String,
    regex: Regex,
}

impl PathMatcher {
    /// Compile a selector that matches any path it is a prefix of.
    ///
    /// The pattern is anchored at the start and captures the selector-covered
    /// prefix as group 1, discarding any deeper trailing segments.
    pub fn compile(selector: &str) -> Result<Self> {
        Self::build(selector, format!(r"(?s)^({}).*$", escape(selector)))
    }

    /// Compile a selector that must cover the whole path
    pub fn compile_exact(selector: &str) -> Result<Self> {
        Self::build(selector, format!(r"(?s)^({})$", escape(selector)))
    }

    fn build(selector: &str, pattern: String) -> Result<Self> {
        let regex = Regex::new(&pattern).map_err(|e| Error::InvalidSelector {
            selector: selector.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            selector: selector.to_string(),
            regex,
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Match `path`, returning the prefix covered by the selector
    ///
    /// ```
    /// use converge_rules::PathMatcher;
    ///
    /// let matcher = PathMatcher::compile(r"root['routers'][\d+]").unwrap();
    /// assert_eq!(
    ///     matcher.match_path("root['routers'][12]['interfaces'][0]"),
    ///     Some("root['routers'][12]"),
    /// );
    /// assert_eq!(matcher.match_path("root['routers']"), None);
    /// ```
    pub fn match_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.regex
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r"root['routers'][\d+]", "root['routers'][0]", Some("root['routers'][0]"))]
    #[case(r"root['routers'][\d+]", "root['routers'][3]['name']", Some("root['routers'][3]"))]
    #[case(r"root['routers'][\d+]", "root['routers']", None)]
    #[case(r"root['routers'][\d+]", "root['switches'][0]", None)]
    #[case("root['routers']", "root['routers'][0]['name']", Some("root['routers']"))]
    #[case("root['a']", "root['ab']", None)]
    #[case("root['a.b']", "root['aXb']", None)]
    #[case(r"root['routers'][\d+]['interfaces'][\d+]", "root['routers'][1]['interfaces'][2]['ip']", Some("root['routers'][1]['interfaces'][2]"))]
    fn test_match_path(
        #[case] selector: &str,
        #[case] path: &str,
        #[case] expected: Option<&str>,
    ) {
        let matcher = PathMatcher::compile(selector).unwrap();
        assert_eq!(matcher.match_path(path), expected);
    }

    #[test]
    fn test_match_is_anchored_at_start() {
        let matcher = PathMatcher::compile("['routers']").unwrap();
        assert_eq!(matcher.match_path("root['routers']"), None);
    }

    #[test]
    fn test_whitespace_and_hash_match_literally() {
        let matcher = PathMatcher::compile("root['my key#1']").unwrap();
        assert_eq!(
            matcher.match_path("root['my key#1']['x']"),
            Some("root['my key#1']")
        );
        assert_eq!(matcher.match_path("root['mykey#1']"), None);
    }

    #[test]
    fn test_exact_matcher() {
        let matcher = PathMatcher::compile_exact(r"root['routers']").unwrap();
        assert!(matcher.is_match("root['routers']"));
        assert!(!matcher.is_match("root['routers'][0]"));
    }

    #[test]
    fn test_invalid_regex_fragment_is_reported() {
        let err = PathMatcher::compile(r"root['a'][\d+]\").unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }));
    }
}
