//! Container Registry: the authoritative map from `container_id` to cluster
//! identity, and pod-group membership.
//!
//! The pod-group / container cycle is broken as prescribed: a [`PodGroup`]
//! stores only `container_id`s; the registry separately maps
//! `container_id -> (namespace, pod_group_name)` so looking either way never
//! requires a back-reference stored on the other type.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

/// Immutable identity plus classification of a single container.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Container {
    pub container_id: String,
    pub container_name: String,
    pub host_name: String,
    pub host_ip: String,
    pub namespace: String,
    pub pod_group_name: String,
    pub image: String,
    pub labels: Vec<String>,
    pub identities: Vec<String>,
    pub apparmor_profile: Option<String>,
    pub selinux_profile: Option<String>,
    pub host_volumes: Vec<String>,
}

/// A grouping of containers sharing `(namespace, pod_group_name)`. Exists
/// iff at least one container refers to it.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PodGroup {
    pub namespace: String,
    pub pod_group_name: String,
    pub container_ids: BTreeSet<String>,
    pub labels: Vec<String>,
    pub identities: Vec<String>,
    pub applied_policies: Vec<String>,
    pub apparmor_profile: Option<String>,
    pub selinux_profile: Option<String>,
}

/// The names a container resolves to, or all-empty for an unknown
/// container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerNames {
    pub namespace: String,
    pub pod_group_name: String,
    pub container_name: String,
}

#[derive(Default)]
struct Tables {
    containers: BTreeMap<String, Container>,
    /// `container_id -> (namespace, pod_group_name)`.
    membership: BTreeMap<String, (String, String)>,
    pod_groups: BTreeMap<(String, String), PodGroup>,
}

/// Concurrently-readable container/pod-group state. Writers are the
/// (external) container-runtime and cluster-API watchers; readers are the
/// Log Builder and Policy Matcher.
#[derive(Default)]
pub struct ContainerRegistry {
    tables: RwLock<Tables>,
}

impl ContainerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a container record, attaching it to its pod
    /// group (creating the group if this is the first member).
    pub fn upsert(&self, container: Container) {
        let mut tables = self.tables.write().expect("registry lock poisoned");
        let key = (container.namespace.clone(), container.pod_group_name.clone());
        tables
            .membership
            .insert(container.container_id.clone(), key.clone());

        let group = tables.pod_groups.entry(key.clone()).or_insert_with(|| PodGroup {
            namespace: key.0.clone(),
            pod_group_name: key.1.clone(),
            ..PodGroup::default()
        });
        group.container_ids.insert(container.container_id.clone());
        group.labels = container.labels.clone();
        group.identities = container.identities.clone();

        tables.containers.insert(container.container_id.clone(), container);
    }

    /// Removes a container. Cascades: detaches it from its pod group, and
    /// if the group becomes empty with no policies bound, removes the
    /// group too.
    pub fn remove(&self, container_id: &str) {
        let mut tables = self.tables.write().expect("registry lock poisoned");
        tables.containers.remove(container_id);
        let Some(key) = tables.membership.remove(container_id) else {
            return;
        };
        let should_drop_group = if let Some(group) = tables.pod_groups.get_mut(&key) {
            group.container_ids.remove(container_id);
            group.container_ids.is_empty() && group.applied_policies.is_empty()
        } else {
            false
        };
        if should_drop_group {
            tables.pod_groups.remove(&key);
        }
    }

    /// `(namespace, pod_group_name, container_name)`, all empty strings if
    /// `container_id` is unknown.
    #[must_use]
    pub fn lookup_names(&self, container_id: &str) -> ContainerNames {
        let tables = self.tables.read().expect("registry lock poisoned");
        match tables.containers.get(container_id) {
            Some(c) => ContainerNames {
                namespace: c.namespace.clone(),
                pod_group_name: c.pod_group_name.clone(),
                container_name: c.container_name.clone(),
            },
            None => ContainerNames::default(),
        }
    }

    /// The identities bound to a container, used by the Policy Matcher to
    /// select applicable policies. Empty if the container is unknown.
    #[must_use]
    pub fn identities_of(&self, container_id: &str) -> Vec<String> {
        let tables = self.tables.read().expect("registry lock poisoned");
        tables
            .containers
            .get(container_id)
            .map(|c| c.identities.clone())
            .unwrap_or_default()
    }

    /// The `"key=value"` labels of a container, used by the Policy Matcher
    /// to evaluate a policy's `match_labels` selector. Empty if the
    /// container is unknown.
    #[must_use]
    pub fn labels_of(&self, container_id: &str) -> Vec<String> {
        let tables = self.tables.read().expect("registry lock poisoned");
        tables
            .containers
            .get(container_id)
            .map(|c| c.labels.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn lookup_pod_group(&self, namespace: &str, pod_group_name: &str) -> Option<PodGroup> {
        let tables = self.tables.read().expect("registry lock poisoned");
        tables
            .pod_groups
            .get(&(namespace.to_string(), pod_group_name.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn container_count(&self) -> usize {
        self.tables.read().expect("registry lock poisoned").containers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, pod: &str) -> Container {
        Container {
            container_id: id.to_string(),
            container_name: format!("{id}-name"),
            host_name: "node-1".into(),
            host_ip: "10.0.0.1".into(),
            namespace: "ns1".into(),
            pod_group_name: pod.to_string(),
            image: "nginx:latest".into(),
            labels: vec!["app=web".into()],
            identities: vec!["web".into()],
            apparmor_profile: None,
            selinux_profile: None,
            host_volumes: vec![],
        }
    }

    #[test]
    fn unknown_container_resolves_to_empty_names() {
        let registry = ContainerRegistry::new();
        assert_eq!(registry.lookup_names("missing"), ContainerNames::default());
    }

    #[test]
    fn upsert_then_lookup_roundtrips() {
        let registry = ContainerRegistry::new();
        registry.upsert(container("c1", "web"));
        let names = registry.lookup_names("c1");
        assert_eq!(names.namespace, "ns1");
        assert_eq!(names.pod_group_name, "web");
        assert_eq!(names.container_name, "c1-name");
    }

    #[test]
    fn removal_cascades_to_empty_pod_group() {
        let registry = ContainerRegistry::new();
        registry.upsert(container("c1", "web"));
        assert!(registry.lookup_pod_group("ns1", "web").is_some());
        registry.remove("c1");
        assert!(registry.lookup_pod_group("ns1", "web").is_none());
    }

    #[test]
    fn pod_group_survives_while_siblings_remain() {
        let registry = ContainerRegistry::new();
        registry.upsert(container("c1", "web"));
        registry.upsert(container("c2", "web"));
        registry.remove("c1");
        let group = registry.lookup_pod_group("ns1", "web").expect("group remains");
        assert_eq!(group.container_ids.len(), 1);
        assert!(group.container_ids.contains("c2"));
    }
}
