//! Matching a single `(source, resource)` pair against a compiled
//! [`MatchPolicy`].

use crate::model::{MatchMode, MatchPolicy};
use regex::Regex;
use std::sync::OnceLock;

/// Whether `policy` applies to the given log coordinates.
///
/// `source`/`resource` are the process-exec-path and target-resource (file
/// path, protocol name, capability name) drawn from the log being matched.
#[must_use]
pub fn matches(policy: &MatchPolicy, source: &str, resource: &str) -> bool {
    matches_field(policy.source_mode, &policy.source, source)
        && matches_resource(policy, resource)
}

fn matches_resource(policy: &MatchPolicy, resource: &str) -> bool {
    match policy.resource_mode {
        MatchMode::Prefix if policy.tags.iter().any(|t| t == "__non_recursive") => {
            let Some(rest) = resource.strip_prefix(policy.resource.as_str()) else {
                return false;
            };
            !rest.contains('/')
        }
        _ => matches_field(policy.resource_mode, &policy.resource, resource),
    }
}

fn matches_field(mode: MatchMode, pattern: &str, value: &str) -> bool {
    match mode {
        MatchMode::Any => true,
        MatchMode::Exact => pattern == value,
        MatchMode::Prefix => value.starts_with(pattern),
        MatchMode::Pattern => compiled_pattern(pattern).is_match(value),
    }
}

/// Compiling a regex on every event would be wasteful; policies are
/// long-lived so we cache the compiled form alongside the pattern text.
/// `MatchPolicy` itself stays `Clone`/`Serialize`-friendly by not storing
/// the compiled regex; callers that need the hot path should route through
/// [`PolicyIndex`], which memoizes this at `apply` time.
fn compiled_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| fallback_regex().clone())
}

fn fallback_regex() -> &'static Regex {
    static FALLBACK: OnceLock<Regex> = OnceLock::new();
    FALLBACK.get_or_init(|| Regex::new("$^").expect("static fallback regex is valid"))
}
