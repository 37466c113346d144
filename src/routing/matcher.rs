//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile path templates into segment matchers at registration time
//! - Match request paths, binding `{name}` captures
//! - Report the remainder consumed by a trailing `*`
//! - Report a redirect when a `//` template requires a trailing slash
//!
//! # Design Decisions
//! - Paths are matched without their leading `/`, after percent-decoding
//! - Matching is case-sensitive and segment-based (no regex)
//! - Malformed input never fails: it simply does not match
//! - Template errors are reported once, when the pattern is compiled

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

/// Error produced when a path template cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("wildcard `*` must be the last segment: {0}")]
    WildcardNotLast(String),

    #[error("capture name `{name}` appears more than once: {template}")]
    DuplicateCapture { name: String, template: String },

    #[error("malformed segment `{segment}`: {template}")]
    MalformedSegment { segment: String, template: String },

    #[error("`//` may appear once, right before a trailing `*` or at the end: {0}")]
    MisplacedDoubleSlash(String),
}

/// One compiled segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly.
    Literal(String),
    /// Matches one non-empty segment and binds it.
    Capture(String),
    /// Matches the rest of the path (zero or more segments).
    Wildcard,
}

/// Result of matching a path against a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch {
    /// The path matched.
    Matched {
        variables: HashMap<String, String>,
        /// Portion consumed by a trailing wildcard, if the pattern has one.
        remainder: Option<String>,
    },
    /// The path matched everything up to a required trailing slash.
    RedirectTrailingSlash,
    /// The path did not match.
    NoMatch,
}

/// A compiled, immutable path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
    /// Segments that, when matched exactly, require a trailing-slash redirect.
    redirect_segments: Option<Vec<Segment>>,
}

impl PathPattern {
    /// Compile a template such as `person/{name}/chores`, `files/*` or `docs//*`.
    ///
    /// A leading `/` is ignored. The empty template matches only the empty path.
    pub fn parse(template: &str) -> Result<Self, PatternError> {
        let trimmed = template.strip_prefix('/').unwrap_or(template);

        let (body, redirect_segments) = match trimmed.find("//") {
            Some(index) => {
                let prefix = &trimmed[..index];
                let suffix = &trimmed[index + 2..];
                if suffix.contains("//") || !(suffix.is_empty() || suffix == "*") {
                    return Err(PatternError::MisplacedDoubleSlash(template.to_string()));
                }
                let redirect = compile_segments(prefix, template)?;
                (format!("{}/{}", prefix, suffix), Some(redirect))
            }
            None => (trimmed.to_string(), None),
        };

        let segments = compile_segments(&body, template)?;

        Ok(Self {
            template: template.to_string(),
            segments,
            redirect_segments,
        })
    }

    /// The original template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a decoded path (without leading `/`).
    pub fn matches(&self, path: &str) -> PathMatch {
        // Checked first: a trailing wildcard would otherwise accept the bare prefix
        if let Some(redirect) = &self.redirect_segments {
            if let Some((_, None)) = match_segments(redirect, path) {
                return PathMatch::RedirectTrailingSlash;
            }
        }

        match match_segments(&self.segments, path) {
            Some((variables, remainder)) => PathMatch::Matched { variables, remainder },
            None => PathMatch::NoMatch,
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn compile_segments(body: &str, template: &str) -> Result<Vec<Segment>, PatternError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<&str> = body.split('/').collect();
    let last = raw.len() - 1;
    let mut names = HashSet::new();
    let mut segments = Vec::with_capacity(raw.len());

    for (index, part) in raw.iter().enumerate() {
        let segment = if *part == "*" {
            if index != last {
                return Err(PatternError::WildcardNotLast(template.to_string()));
            }
            Segment::Wildcard
        } else if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            if name.is_empty() || name.contains(['{', '}', '*']) {
                return Err(PatternError::MalformedSegment {
                    segment: part.to_string(),
                    template: template.to_string(),
                });
            }
            if !names.insert(name.to_string()) {
                return Err(PatternError::DuplicateCapture {
                    name: name.to_string(),
                    template: template.to_string(),
                });
            }
            Segment::Capture(name.to_string())
        } else if part.contains(['{', '}', '*']) {
            return Err(PatternError::MalformedSegment {
                segment: part.to_string(),
                template: template.to_string(),
            });
        } else {
            Segment::Literal(part.to_string())
        };
        segments.push(segment);
    }

    Ok(segments)
}

fn match_segments(
    segments: &[Segment],
    path: &str,
) -> Option<(HashMap<String, String>, Option<String>)> {
    let parts: Vec<&str> = if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    };
    let mut variables = HashMap::new();

    for (index, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Wildcard => {
                let remainder = parts.get(index..).map(|rest| rest.join("/")).unwrap_or_default();
                return Some((variables, Some(remainder)));
            }
            Segment::Literal(literal) => {
                if parts.get(index) != Some(&literal.as_str()) {
                    return None;
                }
            }
            Segment::Capture(name) => match parts.get(index) {
                Some(value) if !value.is_empty() => {
                    variables.insert(name.clone(), (*value).to_string());
                }
                _ => return None,
            },
        }
    }

    if parts.len() == segments.len() {
        Some((variables, None))
    } else {
        None
    }
}
