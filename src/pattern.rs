//! Route path templates.
//!
//! ```text
//! /users/:id/files/*rest
//!  └lit┘ └par┘ └lit┘ └wildcard (must be last)
//! ```
//!
//! Empty segments are ignored on both sides, so `/a//b/` and `/a/b` are the
//! same path. Matching yields the captured parameters and a *rank vector*,
//! one entry per consumed template segment. Lower ranks are more specific;
//! the router compares rank vectors lexicographically to pick a winner.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use crate::error::ConfigError;

const LITERAL: u8 = 0;
const PARAM: u8 = 1;
const WILDCARD: u8 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Param(String),
    Wildcard(Option<String>),
}

/// A compiled, validated route template.
#[derive(Clone, Debug, Default)]
pub(crate) struct Pattern {
    segments: Vec<Segment>,
}

/// Result of a successful [`Pattern::matches`].
#[derive(Debug)]
pub(crate) struct Captured {
    pub(crate) params: Vec<(String, String)>,
    pub(crate) rank: Vec<u8>,
}

impl Pattern {
    pub(crate) fn parse(src: &str) -> Result<Self, ConfigError> {
        if !src.starts_with('/') {
            return Err(ConfigError::pattern(src, "pattern must start with `/`"));
        }

        let mut segments = Vec::new();
        for part in split(src) {
            let segment = if let Some(name) = part.strip_prefix(':') {
                if !is_ident(name) {
                    return Err(ConfigError::pattern(src, "parameter name must be an identifier"));
                }
                Segment::Param(name.to_owned())
            } else if let Some(name) = part.strip_prefix('*') {
                if name.is_empty() {
                    Segment::Wildcard(None)
                } else if is_ident(name) {
                    Segment::Wildcard(Some(name.to_owned()))
                } else {
                    return Err(ConfigError::pattern(src, "wildcard name must be an identifier"));
                }
            } else if part.contains([':', '*']) {
                return Err(ConfigError::pattern(src, "`:` and `*` may only start a segment"));
            } else {
                Segment::Literal(part.to_owned())
            };
            segments.push(segment);
        }

        let pattern = Self { segments };
        pattern.validate(src)?;
        Ok(pattern)
    }

    /// `self` followed by `rest`, re-validated as a whole.
    pub(crate) fn join(&self, rest: &Pattern) -> Result<Self, ConfigError> {
        let mut segments = self.segments.clone();
        segments.extend(rest.segments.iter().cloned());
        let joined = Self { segments };
        joined.validate(&joined.to_string())?;
        Ok(joined)
    }

    /// Two patterns with the same shape accept exactly the same paths.
    pub(crate) fn same_shape(&self, other: &Pattern) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|pair| match pair {
                (Segment::Literal(a), Segment::Literal(b)) => a == b,
                (Segment::Param(_), Segment::Param(_)) => true,
                (Segment::Wildcard(_), Segment::Wildcard(_)) => true,
                _ => false,
            })
    }

    pub(crate) fn matches(&self, path: &[&str], case_sensitive: bool) -> Option<Captured> {
        let mut params = Vec::new();
        let mut rank = Vec::with_capacity(self.segments.len());

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard(name) => {
                    if let Some(name) = name {
                        params.push((name.clone(), decode(&path[i..].join("/"))));
                    }
                    rank.push(WILDCARD);
                    return Some(Captured { params, rank });
                }
                Segment::Literal(literal) => {
                    let part = path.get(i)?;
                    let equal = if case_sensitive {
                        literal == part
                    } else {
                        literal.eq_ignore_ascii_case(part)
                    };
                    if !equal {
                        return None;
                    }
                    rank.push(LITERAL);
                }
                Segment::Param(name) => {
                    let part = path.get(i)?;
                    params.push((name.clone(), decode(part)));
                    rank.push(PARAM);
                }
            }
        }

        (path.len() == self.segments.len()).then_some(Captured { params, rank })
    }

    fn validate(&self, src: &str) -> Result<(), ConfigError> {
        let last = self.segments.len().saturating_sub(1);
        let mut names = HashSet::new();
        for (i, segment) in self.segments.iter().enumerate() {
            let name = match segment {
                Segment::Wildcard(_) if i != last => {
                    return Err(ConfigError::pattern(src, "wildcard must be the last segment"));
                }
                Segment::Param(name) | Segment::Wildcard(Some(name)) => name,
                _ => continue,
            };
            if !names.insert(name.as_str()) {
                return Err(ConfigError::pattern(src, "parameter name used twice"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => write!(f, "/{s}")?,
                Segment::Param(name) => write!(f, "/:{name}")?,
                Segment::Wildcard(None) => f.write_str("/*")?,
                Segment::Wildcard(Some(name)) => write!(f, "/*{name}")?,
            }
        }
        Ok(())
    }
}

/// Splits a request path into its non-empty segments.
pub(crate) fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_owned())
}

fn is_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(pattern: &str, path: &str) -> Option<Captured> {
        Pattern::parse(pattern).unwrap().matches(&split(path), true)
    }

    #[test]
    fn normalizes_slashes_on_display() {
        assert_eq!(Pattern::parse("/a//b/").unwrap().to_string(), "/a/b");
        assert_eq!(Pattern::parse("/").unwrap().to_string(), "/");
        assert_eq!(Pattern::parse("/u/:id/*rest").unwrap().to_string(), "/u/:id/*rest");
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in ["users", "/:", "/:1x", "/a:b", "/fi*le", "/*/x", "/:id/:id", "/*a-b", "/:id/*id"] {
            assert!(
                matches!(Pattern::parse(bad), Err(ConfigError::InvalidPattern { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn captures_and_decodes_params() {
        let c = capture("/users/:id", "/users/j%C3%BCrgen").unwrap();
        assert_eq!(c.params, vec![("id".to_owned(), "jürgen".to_owned())]);
        assert_eq!(c.rank, vec![LITERAL, PARAM]);

        // Invalid UTF-8 after decoding is kept verbatim.
        let c = capture("/raw/:v", "/raw/%FF").unwrap();
        assert_eq!(c.params[0].1, "%FF");
    }

    #[test]
    fn wildcard_matches_zero_or_more_segments() {
        let c = capture("/static/*path", "/static/css/site.css").unwrap();
        assert_eq!(c.params, vec![("path".to_owned(), "css/site.css".to_owned())]);
        assert_eq!(c.rank, vec![LITERAL, WILDCARD]);

        let c = capture("/static/*path", "/static").unwrap();
        assert_eq!(c.params[0].1, "");

        assert!(capture("/*", "/anything/at/all").unwrap().params.is_empty());
    }

    #[test]
    fn length_mismatch_does_not_match() {
        assert!(capture("/a/b", "/a").is_none());
        assert!(capture("/a", "/a/b").is_none());
        assert!(capture("/a/:x", "/b/1").is_none());
    }

    #[test]
    fn case_insensitive_literals() {
        let p = Pattern::parse("/Users").unwrap();
        assert!(p.matches(&split("/users"), true).is_none());
        assert!(p.matches(&split("/users"), false).is_some());
    }

    #[test]
    fn join_revalidates_names() {
        let prefix = Pattern::parse("/orgs/:id").unwrap();
        let ok = Pattern::parse("/repos/:repo").unwrap();
        assert_eq!(prefix.join(&ok).unwrap().to_string(), "/orgs/:id/repos/:repo");
        let clash = Pattern::parse("/users/:id").unwrap();
        assert!(prefix.join(&clash).is_err());
    }

    #[test]
    fn shape_ignores_param_names() {
        let a = Pattern::parse("/u/:id").unwrap();
        let b = Pattern::parse("/u/:name").unwrap();
        let c = Pattern::parse("/u/me").unwrap();
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }
}
