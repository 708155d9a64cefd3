//! Policy Matcher: `decorate(log) -> log'`.
//!
//! Lives in `karmor-core` rather than `karmor-policy` because it operates
//! on [`Log`], which is itself built from container-registry state; placing
//! the `Log` type in `karmor-policy` would make the policy crate depend on
//! the container/registry layer it is meant to be independent of. See
//! DESIGN.md for the full rationale.

use crate::logbuilder::{Log, LogType};
use crate::registry::ContainerRegistry;
use karmor_policy::{matches, MatchPolicy, PolicyIndex};

pub struct PolicyMatcher<'a> {
    index: &'a PolicyIndex,
    registry: &'a ContainerRegistry,
    enable_host_policy: bool,
    host_labels: &'a [String],
}

impl<'a> PolicyMatcher<'a> {
    #[must_use]
    pub fn new(index: &'a PolicyIndex, registry: &'a ContainerRegistry, enable_host_policy: bool, host_labels: &'a [String]) -> Self {
        Self { index, registry, enable_host_policy, host_labels }
    }

    #[must_use]
    pub fn decorate(&self, mut log: Log) -> Log {
        let candidates = if log.container_id.is_empty() {
            if self.enable_host_policy {
                self.index.host_policies(self.host_labels)
            } else {
                Vec::new()
            }
        } else {
            let labels = self.registry.labels_of(&log.container_id);
            let identities = self.registry.identities_of(&log.container_id);
            self.index.policies_for(Some(log.namespace_name.as_str()), log.pod_name.as_str(), &labels, &identities)
        };

        let mut winners: Vec<&MatchPolicy> = candidates
            .iter()
            .filter(|policy| policy.operation == log.operation)
            .filter(|policy| matches(policy, &log.source, &log.resource))
            .filter(|policy| self.passes_modifiers(policy, &log))
            .collect();

        winners.sort_by(|a, b| a.precedence_key().cmp(&b.precedence_key()));

        if let Some(winner) = winners.into_iter().next() {
            log.policy_name = Some(winner.policy_name.clone());
            log.severity = Some(winner.severity);
            log.tags = winner.tags.iter().filter(|t| !t.starts_with("__")).cloned().collect();
            log.message = Some(winner.message.clone());
            log.action = Some(winner.action);
            log.log_type = if winner.is_host_policy { LogType::MatchedHostPolicy } else { LogType::MatchedPolicy };
        }
        log
    }

    /// `owner_only` requires an external `stat()` this crate cannot perform
    /// without a filesystem collaborator, so the modifier is skipped rather
    /// than treated as a rejected match, with a debug log each time.
    /// `read_only` is checked against data already on the log (set by the
    /// log builder from `O_WRONLY`/`O_RDWR`).
    fn passes_modifiers(&self, policy: &MatchPolicy, log: &Log) -> bool {
        if policy.owner_only {
            tracing::debug!(policy = %policy.policy_name, "owner_only modifier unavailable, skipping");
        }
        if policy.read_only && log.data.contains("flags=") {
            return !is_write_flagged(&log.data);
        }
        true
    }
}

fn is_write_flagged(data: &str) -> bool {
    data.split_whitespace()
        .find_map(|tok| tok.strip_prefix("flags="))
        .is_some_and(|flags| flags.split('|').any(|name| name == "O_WRONLY" || name == "O_RDWR"))
}
