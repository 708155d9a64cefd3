//! Security policy documents, compilation, and the concurrently-readable
//! Policy Index used by the Policy Matcher.

pub mod compile;
pub mod document;
pub mod index;
pub mod matching;
pub mod model;

pub use compile::{compile, compile_host};
pub use document::{
    Action, CapabilitiesRule, FileRule, HostPolicySpec, HostSecurityPolicy, MatchDirectory,
    MatchPath, MatchPattern, NetworkRule, PolicyMetadata, PolicySpec, ProcessRule,
    SecurityPolicy, Selector,
};
pub use index::{PolicyEvent, PolicyIndex};
pub use matching::matches;
pub use model::{MatchMode, MatchPolicy, Operation};
