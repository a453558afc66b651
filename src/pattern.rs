//! Route patterns and path matching.
//!
//! A pattern is a `/`-separated template whose segments are either literal
//! text or a named parameter wrapped in braces:
//!
//! ```text
//! /users/{id}/books/{bookId}
//!  ^^^^^  ^^^^ ^^^^^ ^^^^^^^^
//!  lit    param lit   param
//! ```
//!
//! Matching is a single pairwise walk over the segments. Both sides are split
//! on every `/`, empty segments included, so `/users/` has three segments and
//! matches `/users/{id}` with `id = ""`. There is no backtracking, no
//! wildcard, and no optional segment.
//!
//! Each path segment is percent-decoded after splitting, so `%2F` never
//! splits a segment and `/users/a%20b` binds `id = "a b"`. Invalid UTF-8 in a
//! decoded segment is replaced with U+FFFD.

use std::collections::HashMap;
use std::fmt;

use percent_encoding::percent_decode_str;

use crate::error::Error;

/// Path parameters extracted by a successful match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params {
    inner: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Outcome of matching a path against a pattern.
///
/// A pattern with no parameters that matches yields `Matched` with empty
/// [`Params`]; that is never confused with `Mismatch`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathMatch {
    Matched(Params),
    Mismatch,
}

impl PathMatch {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    pub fn into_params(self) -> Option<Params> {
        match self {
            Self::Matched(params) => Some(params),
            Self::Mismatch => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => Self::Param(name.to_owned()),
            None => Self::Literal(raw.to_owned()),
        }
    }
}

/// A parsed, validated route pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parses and validates `pattern`.
    ///
    /// Rejects patterns that do not start with `/`, parameters with an empty
    /// name (`{}`), and parameter names used twice.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let invalid = |reason: &'static str| Error::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: reason.into(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with `/`"));
        }

        let segments: Vec<Segment> = pattern.split('/').map(Segment::parse).collect();

        let mut seen = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) = segment {
                if name.is_empty() {
                    return Err(invalid("parameter name must not be empty"));
                }
                if seen.contains(&name.as_str()) {
                    return Err(Error::InvalidPattern {
                        pattern: pattern.to_owned(),
                        reason: format!("parameter `{name}` appears more than once").into(),
                    });
                }
                seen.push(name.as_str());
            }
        }

        Ok(Self { raw: pattern.to_owned(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the parameter segments, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches a concrete request path against this pattern.
    pub fn matches(&self, path: &str) -> PathMatch {
        // Cheap count check before allocating anything.
        if path.split('/').count() != self.segments.len() {
            return PathMatch::Mismatch;
        }

        let mut params = Params::new();
        for (segment, raw) in self.segments.iter().zip(path.split('/')) {
            let actual = percent_decode_str(raw).decode_utf8_lossy();
            match segment {
                Segment::Literal(expected) if *expected != *actual => return PathMatch::Mismatch,
                Segment::Literal(_) => {}
                Segment::Param(name) => params.insert(name.as_str(), actual),
            }
        }
        PathMatch::Matched(params)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Matches `path` against an unparsed `pattern` string.
///
/// No validation is applied to `pattern`: if a name repeats, the later
/// segment's value wins.
///
/// ```rust
/// use vireo::{match_path, PathMatch};
///
/// let params = match_path("/users/{id}", "/users/123").into_params().unwrap();
/// assert_eq!(params.get("id"), Some("123"));
///
/// assert_eq!(match_path("/users/{id}", "/user/123"), PathMatch::Mismatch);
/// ```
pub fn match_path(pattern: &str, path: &str) -> PathMatch {
    let segments = pattern.split('/').map(Segment::parse).collect();
    Pattern { raw: pattern.to_owned(), segments }.matches(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> PathMatch {
        PathMatch::Matched(pairs.iter().copied().collect())
    }

    #[test]
    fn single_param() {
        assert_eq!(match_path("/users/{id}", "/users/123"), params(&[("id", "123")]));
    }

    #[test]
    fn multiple_params() {
        assert_eq!(
            match_path("/users/{id}/books/{bookId}", "/users/123/books/456"),
            params(&[("id", "123"), ("bookId", "456")]),
        );
    }

    #[test]
    fn literal_mismatch() {
        assert_eq!(match_path("/users/{id}", "/user/123"), PathMatch::Mismatch);
    }

    #[test]
    fn literal_match_is_byte_exact() {
        assert_eq!(match_path("/Users", "/users"), PathMatch::Mismatch);
        assert_eq!(match_path("/users", "/users"), params(&[]));
    }

    #[test]
    fn root_is_a_match_with_no_params() {
        let m = match_path("/", "/");
        assert!(m.is_match());
        assert_eq!(m, params(&[]));
    }

    #[test]
    fn segment_count_mismatch_never_binds() {
        assert_eq!(match_path("/users/{id}", "/users/1/extra"), PathMatch::Mismatch);
        assert_eq!(match_path("/users/{id}", "/users"), PathMatch::Mismatch);
        assert_eq!(match_path("/", "/users"), PathMatch::Mismatch);
    }

    #[test]
    fn param_binds_empty_segment() {
        assert_eq!(match_path("/users/{id}", "/users/"), params(&[("id", "")]));
        assert_eq!(match_path("/{a}/{b}", "//x"), params(&[("a", ""), ("b", "x")]));
    }

    #[test]
    fn segments_are_percent_decoded_after_splitting() {
        assert_eq!(match_path("/users/{id}", "/users/a%20b"), params(&[("id", "a b")]));
        assert_eq!(match_path("/files/{name}", "/files/a%2Fb"), params(&[("name", "a/b")]));
        assert_eq!(match_path("/caf\u{e9}", "/caf%C3%A9"), params(&[]));
    }

    #[test]
    fn trailing_slash_is_a_segment() {
        assert_eq!(match_path("/users", "/users/"), PathMatch::Mismatch);
    }

    #[test]
    fn parse_rejects_bad_patterns() {
        assert!(matches!(Pattern::parse("users"), Err(Error::InvalidPattern { .. })));
        assert!(matches!(Pattern::parse("/users/{}"), Err(Error::InvalidPattern { .. })));
        assert!(matches!(
            Pattern::parse("/a/{id}/b/{id}"),
            Err(Error::InvalidPattern { reason, .. }) if reason.contains("`id`")
        ));
    }

    #[test]
    fn half_braced_segment_is_literal() {
        let pattern = Pattern::parse("/files/{name").unwrap();
        assert_eq!(pattern.param_names().count(), 0);
        assert!(pattern.matches("/files/{name").is_match());
        assert!(!pattern.matches("/files/readme").is_match());
    }

    #[test]
    fn param_names_in_order() {
        let pattern = Pattern::parse("/orgs/{org}/repos/{repo}").unwrap();
        assert_eq!(pattern.param_names().collect::<Vec<_>>(), ["org", "repo"]);
        assert_eq!(pattern.to_string(), "/orgs/{org}/repos/{repo}");
    }
}
