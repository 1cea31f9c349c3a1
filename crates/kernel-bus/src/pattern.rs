//! # Event Patterns
//!
//! Listeners subscribe with a pattern rather than a concrete event name.
//!
//! - `"*"` on its own matches every event.
//! - A pattern without `*` is a literal and matches one event name exactly.
//! - Anything else is a glob over dot-separated segments: `"block.*"` matches
//!   `block.applied` but not `block.applied.late`, `"block.**"` matches both.
//!
//! Globs are compiled once, at subscription time, with `globset`. Dots are
//! mapped onto the glob path separator so `*` never crosses a segment; a `/`
//! inside a name is an ordinary character and is encoded before matching.

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// Pattern that matches every event name.
pub const WILDCARD: &str = "*";

/// A compiled event pattern.
#[derive(Debug, Clone)]
pub enum EventPattern {
    /// Matches every event.
    Any,
    /// Matches exactly one event name.
    Exact(String),
    /// Matches a family of event names.
    Glob {
        /// The pattern as written by the subscriber.
        source: String,
        /// Compiled matcher over the separator-mapped name.
        matcher: GlobMatcher,
    },
}

impl EventPattern {
    /// Compile a pattern.
    ///
    /// Never fails: a glob that cannot be compiled degrades to a literal match
    /// and a warning is logged.
    #[must_use]
    pub fn compile(pattern: &str) -> Self {
        if pattern == WILDCARD {
            return Self::Any;
        }

        if !pattern.contains('*') {
            return Self::Exact(pattern.to_string());
        }

        let glob = to_glob(pattern);
        match GlobBuilder::new(&glob).literal_separator(true).build() {
            Ok(compiled) => Self::Glob {
                source: pattern.to_string(),
                matcher: compiled.compile_matcher(),
            },
            Err(e) => {
                warn!(pattern, error = %e, "Invalid event glob, falling back to literal match");
                Self::Exact(pattern.to_string())
            }
        }
    }

    /// The pattern as it was written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => WILDCARD,
            Self::Exact(name) => name,
            Self::Glob { source, .. } => source,
        }
    }

    /// Whether this pattern contains wildcards.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// Check an event name against this pattern.
    #[must_use]
    pub fn matches(&self, event: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(name) => name == event,
            Self::Glob { matcher, .. } => matcher.is_match(to_path(event)),
        }
    }
}

/// Rewrite a dotted pattern as a glob, escaping everything except `*`.
fn to_glob(pattern: &str) -> String {
    pattern
        .split('.')
        .map(|segment| {
            segment
                .split('*')
                .map(|literal| globset::escape(&encode(literal)))
                .collect::<Vec<_>>()
                .join("*")
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn to_path(event: &str) -> String {
    event.split('.').map(encode).collect::<Vec<_>>().join("/")
}

/// Keep `/` out of the glob separator's way. `%` is encoded first so the
/// mapping stays one-to-one.
fn encode(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}
