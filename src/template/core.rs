//! Path template core - hot path for route matching.
//!
//! Matching walks target segments lazily with `split('/')` and never
//! allocates; only `extract` allocates the captured values.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use crate::error::PatternError;

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Ordered name/value pairs for captured parameters and request attributes.
///
/// Names are `Arc<str>` because they come from the compiled template and are
/// shared by every request that matches it.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the target segment exactly
    Literal(Box<str>),
    /// Captures the target segment under this name
    Capture(Arc<str>),
}

/// A compiled route pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pattern: String,
    segments: Vec<Segment>,
}

impl fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathTemplate").field(&self.pattern).finish()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Collapse runs of `/` into one.
///
/// Used for patterns, filter prefixes, mount composition and upgrade paths
/// alike. Leading and trailing slashes are kept; an empty input stays empty.
///
/// ```rust
/// use panrouter::template::normalize;
///
/// assert_eq!(normalize("//api///v1/"), "/api/v1/");
/// assert_eq!(normalize(""), "");
/// ```
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

#[inline]
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl PathTemplate {
    /// Compile a route pattern.
    ///
    /// # Errors
    ///
    /// - [`PatternError::Empty`] for an empty string (`"/"` is the root
    ///   pattern and is valid)
    /// - [`PatternError::MalformedCapture`] when a segment contains `{` or
    ///   `}` without being exactly `{name}`
    /// - [`PatternError::DuplicateCapture`] when a capture name repeats
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        let pattern = normalize(pattern);
        let mut compiled = Vec::with_capacity(pattern.matches('/').count());

        for segment in segments(&pattern) {
            let braced = segment.contains('{') || segment.contains('}');
            if !braced {
                compiled.push(Segment::Literal(segment.into()));
                continue;
            }

            let name = segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .filter(|n| !n.is_empty() && !n.contains('{') && !n.contains('}'));

            let Some(name) = name else {
                return Err(PatternError::MalformedCapture {
                    pattern: pattern.clone(),
                    segment: segment.to_string(),
                });
            };

            let duplicate = compiled
                .iter()
                .any(|s| matches!(s, Segment::Capture(existing) if existing.as_ref() == name));
            if duplicate {
                return Err(PatternError::DuplicateCapture {
                    pattern: pattern.clone(),
                    name: name.to_string(),
                });
            }

            compiled.push(Segment::Capture(Arc::from(name)));
        }

        Ok(Self {
            pattern,
            segments: compiled,
        })
    }

    /// The normalized source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Capture names in declaration order.
    pub fn captures(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Capture(name) => Some(name.as_ref()),
            Segment::Literal(_) => None,
        })
    }

    /// True iff `target` has as many segments as the pattern and every
    /// literal segment equals its counterpart.
    #[must_use]
    pub fn matches(&self, target: &str) -> bool {
        let mut remaining = self.segments.iter();
        for part in segments(target) {
            match remaining.next() {
                Some(Segment::Literal(lit)) if lit.as_ref() == part => {}
                Some(Segment::Capture(_)) => {}
                _ => return false,
            }
        }
        remaining.next().is_none()
    }

    /// Captured values in declaration order.
    ///
    /// Returns an empty vector when `target` does not match.
    #[must_use]
    pub fn extract(&self, target: &str) -> ParamVec {
        if !self.matches(target) {
            return ParamVec::new();
        }
        self.segments
            .iter()
            .zip(segments(target))
            .filter_map(|(seg, part)| match seg {
                Segment::Capture(name) => Some((Arc::clone(name), part.to_owned())),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}
