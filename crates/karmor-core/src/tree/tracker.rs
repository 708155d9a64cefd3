//! Process-Tree Tracker: `host_pid -> PidNode`, with exec-path lookups keyed
//! by `(container_id, namespaced pid)`.

use super::node::PidNode;
use std::collections::HashMap;
use std::sync::RwLock;

/// Grace window (seconds) an exited node is retained before reclamation,
/// on the order of minutes.
pub const DEFAULT_GRACE_WINDOW_SECS: u64 = 120;

struct TrackerInner {
    /// Keyed by `host_pid`, globally unique across the node.
    nodes: HashMap<u32, PidNode>,
    /// `(container_id, namespaced pid) -> host_pid`, maintained alongside
    /// `nodes` so `exec_path_of` can resolve the container-local pid the
    /// Log Builder sees in a `SyscallEvent`.
    by_container_pid: HashMap<(String, u32), u32>,
    container_of: HashMap<u32, String>,
}

pub struct ProcessTreeTracker {
    inner: RwLock<TrackerInner>,
    grace_window_secs: u64,
}

impl Default for ProcessTreeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_WINDOW_SECS)
    }
}

impl ProcessTreeTracker {
    #[must_use]
    pub fn new(grace_window_secs: u64) -> Self {
        Self {
            inner: RwLock::new(TrackerInner {
                nodes: HashMap::new(),
                by_container_pid: HashMap::new(),
                container_of: HashMap::new(),
            }),
            grace_window_secs,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn on_fork(
        &self,
        container_id: &str,
        host_pid: u32,
        ppid: u32,
        pid: u32,
        uid: u32,
        comm: String,
        mnt_ns_id: u64,
        pid_ns_id: u64,
    ) {
        let mut inner = self.inner.write().expect("tracker lock poisoned");
        let node = PidNode::new(host_pid, ppid, pid, uid, comm, mnt_ns_id, pid_ns_id);
        inner.by_container_pid.insert((container_id.to_string(), pid), host_pid);
        inner.container_of.insert(host_pid, container_id.to_string());
        inner.nodes.insert(host_pid, node);
    }

    pub fn on_exec(&self, host_pid: u32, exec_path: String) {
        let mut inner = self.inner.write().expect("tracker lock poisoned");
        if let Some(node) = inner.nodes.get_mut(&host_pid) {
            node.exec_path = Some(exec_path);
        }
    }

    pub fn on_exit(&self, host_pid: u32, now: u64) {
        let mut inner = self.inner.write().expect("tracker lock poisoned");
        if let Some(node) = inner.nodes.get_mut(&host_pid) {
            node.exited = true;
            node.exited_at = Some(now);
        }
    }

    /// The current (or last-known, within the grace window) exec path of
    /// `pid` inside `container_id`, or `None` if untracked.
    #[must_use]
    pub fn exec_path_of(&self, container_id: &str, pid: u32) -> Option<String> {
        let inner = self.inner.read().expect("tracker lock poisoned");
        let host_pid = inner.by_container_pid.get(&(container_id.to_string(), pid))?;
        inner.nodes.get(host_pid).map(|n| n.resolved_source().to_string())
    }

    /// Removes nodes that exited more than the grace window ago. Intended
    /// to run periodically off a timer, not inline with event processing.
    pub fn reclaim(&self, now: u64) {
        let mut inner = self.inner.write().expect("tracker lock poisoned");
        let expired: Vec<u32> = inner
            .nodes
            .iter()
            .filter(|(_, n)| n.exited && n.exited_at.is_some_and(|t| now.saturating_sub(t) > self.grace_window_secs))
            .map(|(&host_pid, _)| host_pid)
            .collect();
        for host_pid in expired {
            let node = inner.nodes.remove(&host_pid);
            if let Some(container_id) = inner.container_of.remove(&host_pid) {
                match node {
                    Some(node) => {
                        inner.by_container_pid.remove(&(container_id, node.pid));
                    }
                    None => {
                        inner.by_container_pid.retain(|_, v| *v != host_pid);
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner.read().expect("tracker lock poisoned").nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_path_of_resolves_to_execd_path() {
        let tracker = ProcessTreeTracker::new(60);
        tracker.on_fork("c1", 42, 1, 42, 0, "sh".into(), 0, 0);
        assert_eq!(tracker.exec_path_of("c1", 42).as_deref(), Some("sh"));
        tracker.on_exec(42, "/bin/sh".into());
        assert_eq!(tracker.exec_path_of("c1", 42).as_deref(), Some("/bin/sh"));
    }

    #[test]
    fn exec_path_of_falls_back_to_comm_before_first_exec() {
        let tracker = ProcessTreeTracker::new(60);
        tracker.on_fork("c1", 7, 1, 7, 0, "nginx".into(), 0, 0);
        assert_eq!(tracker.exec_path_of("c1", 7).as_deref(), Some("nginx"));
    }

    #[test]
    fn untracked_pid_resolves_to_none() {
        let tracker = ProcessTreeTracker::new(60);
        assert_eq!(tracker.exec_path_of("c1", 999), None);
    }

    #[test]
    fn exited_node_served_until_grace_window_expires() {
        let tracker = ProcessTreeTracker::new(10);
        tracker.on_fork("c1", 42, 1, 42, 0, "sh".into(), 0, 0);
        tracker.on_exit(42, 100);
        assert_eq!(tracker.exec_path_of("c1", 42).as_deref(), Some("sh"));
        tracker.reclaim(105);
        assert_eq!(tracker.exec_path_of("c1", 42).as_deref(), Some("sh"));
        tracker.reclaim(120);
        assert_eq!(tracker.exec_path_of("c1", 42), None);
    }

    #[test]
    fn reclaim_frees_the_namespaced_pid_for_reuse() {
        let tracker = ProcessTreeTracker::new(10);
        tracker.on_fork("c1", 42, 1, 7, 0, "sh".into(), 0, 0);
        tracker.on_exit(42, 100);
        tracker.reclaim(200);

        // A new host process reuses the same container-local pid; the
        // reclaimed host_pid's mapping must not shadow it.
        tracker.on_fork("c1", 99, 1, 7, 0, "bash".into(), 0, 0);
        assert_eq!(tracker.exec_path_of("c1", 7).as_deref(), Some("bash"));
    }
}
