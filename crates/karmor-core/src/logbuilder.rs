//! Log Builder: shapes a decoded [`SyscallEvent`] into a container-attributed,
//! operation-shaped [`Log`].

use crate::registry::ContainerRegistry;
use crate::tree::ProcessTreeTracker;
use karmor_common::errno::classify_result;
use karmor_common::oflags::oflags_name;
use karmor_common::{SyscallArgs, SyscallEvent};
use karmor_policy::Operation;
use serde::Serialize;

/// Whether a log is container- or host-origin, and whether a policy has
/// decorated it. The Policy Matcher transitions
/// `ContainerLog -> MatchedPolicy` / `HostLog -> MatchedHostPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum LogType {
    ContainerLog,
    HostLog,
    MatchedPolicy,
    MatchedHostPolicy,
}

/// A fully-shaped, container-attributed telemetry record.
#[derive(Debug, Clone, Serialize)]
pub struct Log {
    pub updated_time: u64,
    pub cluster_name: String,
    pub host_name: String,
    pub namespace_name: String,
    pub pod_name: String,
    pub container_id: String,
    pub container_name: String,
    pub host_pid: u32,
    pub ppid: u32,
    pub pid: u32,
    pub uid: u32,
    pub log_type: LogType,
    pub source: String,
    pub operation: Operation,
    pub resource: String,
    pub data: String,
    pub result: String,
    pub action: Option<karmor_policy::Action>,
    pub policy_name: Option<String>,
    pub severity: Option<u32>,
    pub tags: Vec<String>,
    pub message: Option<String>,
}

/// Everything the builder needs about the event's origin that the ingestor
/// (not the kernel record itself) resolves via mnt/pid namespace or cgroup
/// lookup; out of scope here.
#[derive(Debug, Clone, Default)]
pub struct EventOrigin {
    pub container_id: String,
    pub host_name: String,
    pub cluster_name: String,
}

pub struct LogBuilder<'a> {
    registry: &'a ContainerRegistry,
    tracker: &'a ProcessTreeTracker,
}

impl<'a> LogBuilder<'a> {
    #[must_use]
    pub fn new(registry: &'a ContainerRegistry, tracker: &'a ProcessTreeTracker) -> Self {
        Self { registry, tracker }
    }

    #[must_use]
    pub fn build(&self, event: &SyscallEvent, origin: &EventOrigin, now: u64) -> Log {
        let names = self.registry.lookup_names(&origin.container_id);
        let is_host_origin = origin.container_id.is_empty();

        let source_pid = if event.is_exec() { event.ppid } else { event.pid };
        let source = self
            .tracker
            .exec_path_of(&origin.container_id, source_pid)
            .unwrap_or_else(|| event.comm.clone());

        let (operation, resource, data) = shape(&event.args);
        let result = classify_result(event.retval);

        Log {
            updated_time: now,
            cluster_name: origin.cluster_name.clone(),
            host_name: origin.host_name.clone(),
            namespace_name: names.namespace,
            pod_name: names.pod_group_name,
            container_id: origin.container_id.clone(),
            container_name: names.container_name,
            host_pid: event.host_pid,
            ppid: event.ppid,
            pid: event.pid,
            uid: event.uid,
            log_type: if is_host_origin { LogType::HostLog } else { LogType::ContainerLog },
            source,
            operation,
            resource,
            data,
            result,
            action: None,
            policy_name: None,
            severity: None,
            tags: Vec::new(),
            message: None,
        }
    }

    /// Drop open-family logs that failed with `EACCES` when an auditd
    /// integration is already reporting the same denial, to avoid
    /// double-reporting the one event.
    #[must_use]
    pub fn should_suppress(event: &SyscallEvent, enable_auditd: bool) -> bool {
        enable_auditd
            && matches!(event.args, SyscallArgs::Open { .. } | SyscallArgs::OpenAt { .. })
            && event.retval == -(libc::EACCES as i64)
    }
}

fn shape(args: &SyscallArgs) -> (Operation, String, String) {
    match args {
        SyscallArgs::Open { path, flags } => {
            (Operation::File, path.clone(), format!("flags={}", oflags_name(*flags)))
        }
        SyscallArgs::OpenAt { fd, path, flags } => {
            (Operation::File, path.clone(), format!("fd={fd} flags={}", oflags_name(*flags)))
        }
        SyscallArgs::Close { fd } => (Operation::File, "close".to_string(), format!("fd={fd}")),
        SyscallArgs::Socket { domain, sock_type, protocol } => (
            Operation::Network,
            format!("syscall=socket domain={domain} type={sock_type} protocol={protocol}"),
            String::new(),
        ),
        SyscallArgs::Connect { fd, sockaddr } => {
            (Operation::Network, format!("syscall=connect {}", join_sockaddr(sockaddr)), format!("fd={fd}"))
        }
        SyscallArgs::Accept { fd, sockaddr } => {
            (Operation::Network, format!("syscall=accept {}", join_sockaddr(sockaddr)), format!("fd={fd}"))
        }
        SyscallArgs::Bind { fd, sockaddr } => {
            (Operation::Network, format!("syscall=bind {}", join_sockaddr(sockaddr)), format!("fd={fd}"))
        }
        SyscallArgs::Listen { fd } => (Operation::Network, "syscall=listen".to_string(), format!("fd={fd}")),
        SyscallArgs::Execve { path, .. } | SyscallArgs::ExecveAt { path, .. } => {
            (Operation::Process, path.clone(), String::new())
        }
        SyscallArgs::Fork { child_pid } => (Operation::Process, "fork".to_string(), format!("child_pid={child_pid}")),
        SyscallArgs::Exit => (Operation::Process, "exit".to_string(), String::new()),
    }
}

fn join_sockaddr(sockaddr: &std::collections::BTreeMap<String, String>) -> String {
    sockaddr.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Container, ContainerRegistry};

    fn registry_with_c1() -> ContainerRegistry {
        let registry = ContainerRegistry::new();
        registry.upsert(Container {
            container_id: "c1".into(),
            container_name: "nginx".into(),
            host_name: "node-1".into(),
            host_ip: "10.0.0.1".into(),
            namespace: "ns1".into(),
            pod_group_name: "web".into(),
            image: "nginx:latest".into(),
            labels: vec![],
            identities: vec!["web".into()],
            apparmor_profile: None,
            selinux_profile: None,
            host_volumes: vec![],
        });
        registry
    }

    fn openat_event() -> SyscallEvent {
        SyscallEvent {
            timestamp: 1,
            host_pid: 42,
            ppid: 1,
            pid: 7,
            uid: 0,
            mnt_ns_id: 0,
            pid_ns_id: 0,
            comm: "nginx".into(),
            args: SyscallArgs::OpenAt { fd: -100, path: "/etc/passwd".into(), flags: 0 },
            retval: 0,
        }
    }

    #[test]
    fn unmatched_container_log_shape() {
        let registry = registry_with_c1();
        let tracker = ProcessTreeTracker::new(60);
        let builder = LogBuilder::new(&registry, &tracker);
        let origin = EventOrigin { container_id: "c1".into(), host_name: "node-1".into(), cluster_name: "default".into() };
        let log = builder.build(&openat_event(), &origin, 1000);

        assert_eq!(log.log_type, LogType::ContainerLog);
        assert_eq!(log.container_id, "c1");
        assert_eq!(log.namespace_name, "ns1");
        assert_eq!(log.pod_name, "web");
        assert_eq!(log.container_name, "nginx");
        assert_eq!(log.operation, Operation::File);
        assert_eq!(log.resource, "/etc/passwd");
        assert_eq!(log.data, "fd=-100 flags=O_RDONLY");
        assert_eq!(log.source, "nginx"); // untracked pid 7 falls back to comm
        assert_eq!(log.result, "Passed");
    }

    #[test]
    fn eacces_classifies_and_suppresses_with_auditd() {
        let registry = registry_with_c1();
        let tracker = ProcessTreeTracker::new(60);
        let builder = LogBuilder::new(&registry, &tracker);
        let mut event = openat_event();
        event.retval = -13; // EACCES
        let origin = EventOrigin { container_id: "c1".into(), host_name: "node-1".into(), cluster_name: "default".into() };
        let log = builder.build(&event, &origin, 1000);
        assert_eq!(log.result, "EACCES");
        assert!(LogBuilder::should_suppress(&event, true));
        assert!(!LogBuilder::should_suppress(&event, false));
    }

    #[test]
    fn exec_sources_from_parent_pid_not_self() {
        let registry = registry_with_c1();
        let tracker = ProcessTreeTracker::new(60);
        tracker.on_fork("c1", 12, 1, 12, 0, "cron".into(), 0, 0);
        tracker.on_exec(12, "/usr/sbin/cron".into());

        let builder = LogBuilder::new(&registry, &tracker);
        let event = SyscallEvent {
            timestamp: 1,
            host_pid: 99,
            ppid: 12,
            pid: 99,
            uid: 0,
            mnt_ns_id: 0,
            pid_ns_id: 0,
            comm: "sh".into(),
            args: SyscallArgs::Execve { path: "/bin/sh".into(), argv: vec![] },
            retval: 0,
        };
        let origin = EventOrigin { container_id: "c1".into(), host_name: "node-1".into(), cluster_name: "default".into() };
        let log = builder.build(&event, &origin, 1000);
        assert_eq!(log.source, "/usr/sbin/cron");
    }

    #[test]
    fn unknown_container_produces_host_log_with_empty_names() {
        let registry = ContainerRegistry::new();
        let tracker = ProcessTreeTracker::new(60);
        let builder = LogBuilder::new(&registry, &tracker);
        let origin = EventOrigin::default();
        let log = builder.build(&openat_event(), &origin, 1000);
        assert_eq!(log.log_type, LogType::HostLog);
        assert_eq!(log.namespace_name, "");
        assert_eq!(log.pod_name, "");
        assert_eq!(log.container_name, "");
    }
}
