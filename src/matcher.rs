//! URI and query string matching.
//!
//! Both sides are percent-decoded before they are handed to the wildcard
//! matcher, so `test%40example.com` and `test@example.com` are equivalent.
//! Paths are otherwise compared as-is: `/api/users` does not match
//! `/api/users/`.

use crate::pattern::{self, CaseSensitivity, MatchOptions};
use http::Uri;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Options controlling how request URIs are matched against [`UriPattern`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UriPatternMatchingOptions {
    /// Case handling for the whole URI text
    pub case: CaseSensitivity,
    /// Only URIs carrying a scheme (`http://...`) can match
    pub require_scheme: bool,
    /// Only URIs carrying a host can match
    pub require_host: bool,
}

impl UriPatternMatchingOptions {
    fn match_options(&self) -> MatchOptions {
        MatchOptions { case: self.case }
    }

    fn accepts(&self, uri: &Uri) -> bool {
        (!self.require_scheme || uri.scheme().is_some())
            && (!self.require_host || uri.host().is_some())
    }
}

/// A wildcard expression matched against full request URIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPattern {
    raw: String,
    decoded: String,
}

impl UriPattern {
    /// Create a pattern from its textual form.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let decoded = percent_decode(&raw).into_owned();
        Self { raw, decoded }
    }

    /// The pattern as it was written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check a request URI against this pattern.
    pub fn is_match(&self, uri: &Uri, options: &UriPatternMatchingOptions) -> bool {
        if !options.accepts(uri) {
            return false;
        }
        let candidate = uri.to_string();
        pattern::matches(
            &percent_decode(&candidate),
            &self.decoded,
            options.match_options(),
        )
    }
}

impl fmt::Display for UriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for UriPattern {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for UriPattern {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Match URI text against a wildcard pattern.
///
/// When the options require a scheme or host, `uri` must parse as a URI
/// carrying them.
pub fn matches_uri(uri: &str, pattern: &str, options: &UriPatternMatchingOptions) -> bool {
    if options.require_scheme || options.require_host {
        match uri.parse::<Uri>() {
            Ok(parsed) if options.accepts(&parsed) => {}
            _ => return false,
        }
    }
    pattern::matches(
        &percent_decode(uri),
        &percent_decode(pattern),
        options.match_options(),
    )
}

/// Match a raw query string against a wildcard pattern.
///
/// A leading `?` is ignored on either side. The comparison is an ordered,
/// literal one after decoding: `a=1&b=2` does not match `b=2&a=1`, though
/// wildcard segments such as `*b=2*` absorb any ordering.
pub fn matches_query(query: &str, pattern: &str, options: MatchOptions) -> bool {
    let query = query.strip_prefix('?').unwrap_or(query);
    let pattern = pattern.strip_prefix('?').unwrap_or(pattern);
    pattern::matches(&percent_decode(query), &percent_decode(pattern), options)
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim, `+` is left
/// alone and invalid UTF-8 is replaced.
pub fn percent_decode(s: &str) -> Cow<'_, str> {
    match urlencoding::decode_binary(s.as_bytes()) {
        Cow::Borrowed(_) => Cow::Borrowed(s),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
