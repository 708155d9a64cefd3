//! Raw, user-authored security policy documents.
//!
//! These are the YAML/JSON shapes a cluster operator writes. [`crate::compile`]
//! expands one document into zero or more flattened [`crate::MatchPolicy`]
//! records for the [`crate::PolicyIndex`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityPolicy {
    pub metadata: PolicyMetadata,
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicySpec {
    #[serde(default = "default_severity")]
    pub severity: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub message: String,
    pub selector: Selector,
    #[serde(default)]
    pub process: Option<ProcessRule>,
    #[serde(default)]
    pub file: Option<FileRule>,
    #[serde(default)]
    pub network: Option<NetworkRule>,
    #[serde(default)]
    pub capabilities: Option<CapabilitiesRule>,
    pub action: Action,
}

fn default_severity() -> u32 {
    1
}

/// Binds a policy to the containers (or, for host policies, the node) it
/// applies to.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Selector {
    #[serde(default)]
    pub match_names: Vec<String>,
    #[serde(default)]
    pub match_labels: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub identities: Vec<String>,
}

/// A host policy is identical to a container policy except its selector is
/// named `node_selector` in the source document; it deserializes to the
/// same [`Selector`] shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostSecurityPolicy {
    pub metadata: PolicyMetadata,
    pub spec: HostPolicySpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostPolicySpec {
    #[serde(default = "default_severity")]
    pub severity: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub message: String,
    pub node_selector: Selector,
    #[serde(default)]
    pub process: Option<ProcessRule>,
    #[serde(default)]
    pub file: Option<FileRule>,
    #[serde(default)]
    pub network: Option<NetworkRule>,
    #[serde(default)]
    pub capabilities: Option<CapabilitiesRule>,
    pub action: Action,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProcessRule {
    #[serde(default)]
    pub match_paths: Vec<MatchPath>,
    #[serde(default)]
    pub match_directories: Vec<MatchDirectory>,
    #[serde(default)]
    pub match_patterns: Vec<MatchPattern>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileRule {
    #[serde(default)]
    pub match_paths: Vec<MatchPath>,
    #[serde(default)]
    pub match_directories: Vec<MatchDirectory>,
    #[serde(default)]
    pub match_patterns: Vec<MatchPattern>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NetworkRule {
    /// Protocol families this rule matches, e.g. "tcp", "udp", "unix".
    #[serde(default)]
    pub protocols: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CapabilitiesRule {
    #[serde(default)]
    pub match_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchPath {
    pub path: String,
    #[serde(default)]
    pub owner_only: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub from_source: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchDirectory {
    pub directory: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub owner_only: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub from_source: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchPattern {
    pub pattern: String,
    #[serde(default)]
    pub owner_only: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub from_source: Vec<String>,
}

/// The advisory verdict a matched policy records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum Action {
    Allow,
    Audit,
    Block,
}

impl Action {
    /// Precedence for tie-break: `Block > Audit > Allow`.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Action::Block => 2,
            Action::Audit => 1,
            Action::Allow => 0,
        }
    }
}
