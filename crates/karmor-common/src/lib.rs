//! Shared wire types for the Karmor runtime agent.
//!
//! This crate defines the ABI between the (external, out of scope) kernel
//! event source and the in-scope Event Ingestor: a fixed-layout
//! [`RawSyscallRecord`] on the wire, and the decoded, per-syscall-shaped
//! [`SyscallEvent`]/[`SyscallArgs`] the rest of the pipeline consumes.

pub mod errno;
pub mod oflags;
mod raw;

pub use raw::{RawSyscallRecord, COMM_LEN, DATA_LEN};

use std::collections::BTreeMap;

/// Kernel event identifiers. A `SyscallEvent`'s `args` shape is a total
/// function of this tag (see [`SyscallArgs`]).
pub mod event_id {
    pub const OPEN: u32 = 1;
    pub const OPENAT: u32 = 2;
    pub const CLOSE: u32 = 3;
    pub const SOCKET: u32 = 4;
    pub const CONNECT: u32 = 5;
    pub const ACCEPT: u32 = 6;
    pub const BIND: u32 = 7;
    pub const LISTEN: u32 = 8;
    pub const EXECVE: u32 = 9;
    pub const EXECVEAT: u32 = 10;
    pub const FORK: u32 = 11;
    pub const EXIT: u32 = 12;
}

/// Decoded, per-syscall argument shapes.
///
/// Kept as a tagged enum, rather than a heterogeneous `args[]` tuple, so the
/// compiler enforces arity and element types per `event_id`.
#[derive(Debug, Clone, PartialEq)]
pub enum SyscallArgs {
    Open { path: String, flags: u32 },
    OpenAt { fd: i32, path: String, flags: u32 },
    Close { fd: i32 },
    Socket { domain: u32, sock_type: u32, protocol: u32 },
    Connect { fd: i32, sockaddr: BTreeMap<String, String> },
    Accept { fd: i32, sockaddr: BTreeMap<String, String> },
    Bind { fd: i32, sockaddr: BTreeMap<String, String> },
    Listen { fd: i32 },
    Execve { path: String, argv: Vec<String> },
    ExecveAt { path: String, argv: Vec<String> },
    Fork { child_pid: u32 },
    Exit,
}

impl SyscallArgs {
    /// The `event_id` this shape was decoded for.
    #[must_use]
    pub fn event_id(&self) -> u32 {
        match self {
            Self::Open { .. } => event_id::OPEN,
            Self::OpenAt { .. } => event_id::OPENAT,
            Self::Close { .. } => event_id::CLOSE,
            Self::Socket { .. } => event_id::SOCKET,
            Self::Connect { .. } => event_id::CONNECT,
            Self::Accept { .. } => event_id::ACCEPT,
            Self::Bind { .. } => event_id::BIND,
            Self::Listen { .. } => event_id::LISTEN,
            Self::Execve { .. } => event_id::EXECVE,
            Self::ExecveAt { .. } => event_id::EXECVEAT,
            Self::Fork { .. } => event_id::FORK,
            Self::Exit => event_id::EXIT,
        }
    }
}

/// A decoded kernel event, joined from the raw ring-buffer record.
#[derive(Debug, Clone, PartialEq)]
pub struct SyscallEvent {
    pub timestamp: u64,
    pub host_pid: u32,
    pub ppid: u32,
    pub pid: u32,
    pub uid: u32,
    pub mnt_ns_id: u64,
    pub pid_ns_id: u64,
    pub comm: String,
    pub args: SyscallArgs,
    pub retval: i64,
}

impl SyscallEvent {
    #[must_use]
    pub fn event_id(&self) -> u32 {
        self.args.event_id()
    }

    /// `true` for `execve`/`execveat`, which source from the *parent* pid.
    #[must_use]
    pub fn is_exec(&self) -> bool {
        matches!(self.args, SyscallArgs::Execve { .. } | SyscallArgs::ExecveAt { .. })
    }
}
