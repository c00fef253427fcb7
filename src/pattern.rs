//! Wildcard pattern matching.
//!
//! A pattern is plain text in which `*` stands for any run of zero or more
//! characters. There is no escape syntax, so a literal `*` cannot be matched
//! on its own.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Wildcard character understood by [`matches`].
pub const WILDCARD: char = '*';

/// How character case is treated when comparing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    /// `Abc` matches `aBC`
    #[default]
    Insensitive,
    /// Characters must match exactly
    Sensitive,
}

/// Options for [`matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOptions {
    pub case: CaseSensitivity,
}

impl MatchOptions {
    /// Exact-case matching.
    pub const fn case_sensitive() -> Self {
        Self {
            case: CaseSensitivity::Sensitive,
        }
    }

    fn fold<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self.case {
            CaseSensitivity::Sensitive => Cow::Borrowed(text),
            CaseSensitivity::Insensitive => Cow::Owned(text.to_lowercase()),
        }
    }
}

/// Returns true if `candidate` matches the wildcard `pattern`.
///
/// The pattern is split on `*`; the candidate must start with the first
/// segment, end with the last one, and contain the segments in between in
/// order without overlapping. An empty pattern only matches an empty
/// candidate.
pub fn matches(candidate: &str, pattern: &str, options: MatchOptions) -> bool {
    let candidate = options.fold(candidate);
    let pattern = options.fold(pattern);
    matches_folded(&candidate, &pattern)
}

fn matches_folded(candidate: &str, pattern: &str) -> bool {
    if !pattern.contains(WILDCARD) {
        return candidate == pattern;
    }

    let segments: Vec<&str> = pattern.split(WILDCARD).collect();
    // A pattern containing `*` always yields at least two segments.
    let first = segments[0];
    let last = segments[segments.len() - 1];

    if candidate.len() < first.len() + last.len() {
        return false;
    }
    if !candidate.starts_with(first) || !candidate.ends_with(last) {
        return false;
    }

    let mut remaining = &candidate[first.len()..candidate.len() - last.len()];
    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match remaining.find(segment) {
            Some(pos) => remaining = &remaining[pos + segment.len()..],
            None => return false,
        }
    }

    true
}
