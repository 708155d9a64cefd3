//! The compiled, flattened policy form: [`MatchPolicy`].

use crate::document::Action;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Process,
    File,
    Network,
    Capabilities,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Process => "Process",
            Operation::File => "File",
            Operation::Network => "Network",
            Operation::Capabilities => "Capabilities",
        }
    }
}

/// How a `source` or `resource` string is matched against a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchMode {
    /// Wildcard: matches anything.
    Any,
    /// Exact string equality.
    Exact,
    /// Path-prefix match (directory rules), with an optional recursive bit
    /// folded in by the compiler (non-recursive directory rules only match
    /// direct children).
    Prefix,
    /// Regular-expression match (`match_patterns`).
    Pattern,
}

/// A single flattened, indexable rule derived from a [`crate::document::SecurityPolicy`].
#[derive(Debug, Clone, Serialize)]
pub struct MatchPolicy {
    pub policy_name: String,
    pub severity: u32,
    pub tags: Vec<String>,
    pub message: String,
    pub operation: Operation,
    pub source_mode: MatchMode,
    pub source: String,
    pub resource_mode: MatchMode,
    pub resource: String,
    pub owner_only: bool,
    pub read_only: bool,
    pub action: Action,
    /// The binding this policy was compiled under.
    pub selector_match_names: Vec<String>,
    pub selector_match_labels: std::collections::BTreeMap<String, String>,
    pub selector_identities: Vec<String>,
    pub is_host_policy: bool,
}

impl MatchPolicy {
    /// Total order used to break ties when several policies match the same
    /// log: `Block > Audit > Allow`, then highest `severity`, then
    /// lexicographically-smallest `policy_name`.
    #[must_use]
    pub fn precedence_key(&self) -> (std::cmp::Reverse<u8>, std::cmp::Reverse<u32>, &str) {
        (
            std::cmp::Reverse(self.action.precedence()),
            std::cmp::Reverse(self.severity),
            self.policy_name.as_str(),
        )
    }
}
