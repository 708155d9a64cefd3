//! `PidNode`: one tracked process, keyed by host pid.

/// A single process observed by the tracker. `exec_path` reflects the most
/// recent `execve`/`execveat` seen for this pid; until the first exec it
/// holds `None` and callers fall back to `comm`.
#[derive(Debug, Clone)]
pub struct PidNode {
    pub mnt_ns_id: u64,
    pub pid_ns_id: u64,
    pub host_pid: u32,
    pub ppid: u32,
    pub pid: u32,
    pub uid: u32,
    pub comm: String,
    pub exec_path: Option<String>,
    pub exited: bool,
    pub exited_at: Option<u64>,
}

impl PidNode {
    #[must_use]
    pub fn new(host_pid: u32, ppid: u32, pid: u32, uid: u32, comm: String, mnt_ns_id: u64, pid_ns_id: u64) -> Self {
        Self {
            mnt_ns_id,
            pid_ns_id,
            host_pid,
            ppid,
            pid,
            uid,
            comm,
            exec_path: None,
            exited: false,
            exited_at: None,
        }
    }

    /// The path reported by `exec_path_of` lookups: the last exec'd path,
    /// or `comm` if the process never exec'd on record.
    #[must_use]
    pub fn resolved_source(&self) -> &str {
        self.exec_path.as_deref().unwrap_or(&self.comm)
    }
}
