//! The Policy Index: a read-mostly, concurrently-readable table of compiled
//! [`MatchPolicy`] rules, keyed by the container scope they apply to.

use crate::compile::{compile, compile_host};
use crate::document::{HostSecurityPolicy, SecurityPolicy};
use crate::model::MatchPolicy;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A change to the raw policy set, as delivered by the (out-of-scope)
/// cluster policy watcher.
#[derive(Debug, Clone)]
pub enum PolicyEvent {
    Added(SecurityPolicy),
    Modified(SecurityPolicy),
    Deleted(SecurityPolicy),
    HostAdded(HostSecurityPolicy),
    HostModified(HostSecurityPolicy),
    HostDeleted(HostSecurityPolicy),
}

type ScopeKey = (Option<String>, String);

#[derive(Default)]
struct Tables {
    /// Keyed by `(namespace, policy_name)`; a policy can select multiple pod
    /// groups at match time, so storage keys on its identity, not the pod
    /// groups it happens to select.
    scoped: BTreeMap<ScopeKey, Vec<MatchPolicy>>,
    host: BTreeMap<String, Vec<MatchPolicy>>,
}

/// Concurrently-readable index of compiled policies.
///
/// Writers (the cluster policy watcher) call [`PolicyIndex::apply`]; readers
/// (the Policy Matcher) call [`PolicyIndex::policies_for`] /
/// [`PolicyIndex::host_policies`] once per log. Both sides take the
/// [`RwLock`] only for the duration of the call.
#[derive(Default)]
pub struct PolicyIndex {
    tables: RwLock<Tables>,
}

impl PolicyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: PolicyEvent) {
        let mut tables = self.tables.write().expect("policy index lock poisoned");
        match event {
            PolicyEvent::Added(policy) | PolicyEvent::Modified(policy) => {
                let key = (policy.metadata.namespace.clone(), policy.metadata.name.clone());
                tables.scoped.insert(key, compile(&policy));
            }
            PolicyEvent::Deleted(policy) => {
                let key = (policy.metadata.namespace.clone(), policy.metadata.name.clone());
                tables.scoped.remove(&key);
            }
            PolicyEvent::HostAdded(policy) | PolicyEvent::HostModified(policy) => {
                tables.host.insert(policy.metadata.name.clone(), compile_host(&policy));
            }
            PolicyEvent::HostDeleted(policy) => {
                tables.host.remove(&policy.metadata.name);
            }
        }
    }

    /// All `MatchPolicy` rules bound to `pod_group_name` in `namespace`: the
    /// selector's `match_names` AND `match_labels` must both be satisfied
    /// (each vacuously true if empty), with `identities` as an additional
    /// alternative to `match_names`.
    #[must_use]
    pub fn policies_for(
        &self,
        namespace: Option<&str>,
        pod_group_name: &str,
        labels: &[String],
        identities: &[String],
    ) -> Vec<MatchPolicy> {
        let tables = self.tables.read().expect("policy index lock poisoned");
        tables
            .scoped
            .iter()
            .filter(|((ns, _), _)| ns.as_deref() == namespace)
            .flat_map(|(_, rules)| rules.iter())
            .filter(|rule| selects(rule, pod_group_name, labels, identities))
            .cloned()
            .collect()
    }

    /// All host-policy `MatchPolicy` rules whose `node_selector.match_labels`
    /// is satisfied by `node_labels` (vacuously true if empty).
    #[must_use]
    pub fn host_policies(&self, node_labels: &[String]) -> Vec<MatchPolicy> {
        let tables = self.tables.read().expect("policy index lock poisoned");
        tables
            .host
            .values()
            .flatten()
            .filter(|rule| labels_satisfy(&rule.selector_match_labels, node_labels))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let tables = self.tables.read().expect("policy index lock poisoned");
        tables.scoped.values().map(Vec::len).sum::<usize>() + tables.host.values().map(Vec::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn selects(rule: &MatchPolicy, pod_group_name: &str, labels: &[String], identities: &[String]) -> bool {
    let name_match = rule.selector_match_names.is_empty()
        || rule.selector_match_names.iter().any(|n| n == pod_group_name);
    let label_match = labels_satisfy(&rule.selector_match_labels, labels);
    let identity_match = rule.selector_identities.is_empty()
        || rule
            .selector_identities
            .iter()
            .any(|want| identities.iter().any(|have| have == want));
    name_match && label_match && identity_match
}

/// Every `key=value` pair in `required` must be present in `have` (labels
/// stored as `"key=value"` strings). Vacuously true when `required` is
/// empty.
fn labels_satisfy(required: &BTreeMap<String, String>, have: &[String]) -> bool {
    required.iter().all(|(key, value)| {
        have.iter()
            .any(|label| label.split_once('=').is_some_and(|(k, v)| k == key && v == value))
    })
}
