//! Event Ingestor: decodes raw fixed-layout kernel records into structured
//! [`SyscallEvent`] values.
//!
//! The kernel probe and ring-buffer reader are external collaborators; this
//! module starts from a lossy single-producer stream of fixed-layout
//! records already in hand.

use karmor_common::{event_id, RawSyscallRecord, SyscallArgs, SyscallEvent};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// `data` fields are NUL-separated UTF-8 strings; which fields are present,
/// and in what order, is a total function of `event_id`. `argv`/sockaddr
/// entries are further separated by `\u{1f}` (ASCII unit separator).
const FIELD_SEP: u8 = 0;
const ARGV_SEP: char = '\u{1f}';

#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("record too short: got {got} need {need}")]
    TooShort { got: usize, need: usize },
    #[error("unrecognized event_id {0}")]
    UnknownEventId(u32),
    #[error("field {field} missing for event_id {event_id}")]
    MissingField { event_id: u32, field: &'static str },
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("field {field} is not a valid integer")]
    InvalidInt { field: &'static str },
}

/// Counts malformed records dropped by [`decode`], surfaced as a `tracing`
/// event and fed into the agent's periodic diagnostics.
#[derive(Default)]
pub struct IngestStats {
    pub malformed_dropped: AtomicU64,
}

impl IngestStats {
    #[must_use]
    pub fn malformed_dropped(&self) -> u64 {
        self.malformed_dropped.load(Ordering::Relaxed)
    }
}

/// Decodes one raw record. Malformed records are never fatal: the caller
/// is expected to increment `stats` and continue the pipeline.
pub fn decode(record: &RawSyscallRecord, stats: &IngestStats) -> Option<SyscallEvent> {
    match try_decode(record) {
        Ok(event) => Some(event),
        Err(err) => {
            stats.malformed_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(error = %err, event_id = record.event_id, "dropping malformed kernel record");
            None
        }
    }
}

fn try_decode(record: &RawSyscallRecord) -> Result<SyscallEvent, DecodeError> {
    let comm_end = record.comm.iter().position(|&b| b == 0).unwrap_or(record.comm.len());
    let comm = std::str::from_utf8(&record.comm[..comm_end])
        .map_err(|_| DecodeError::InvalidUtf8 { field: "comm" })?
        .to_string();

    let data_end = record.data.iter().position(|&b| b == 0).map_or(record.data.len(), |_| record.data.len());
    let fields = split_fields(&record.data[..data_end]);
    let args = decode_args(record.event_id, &fields)?;

    Ok(SyscallEvent {
        timestamp: record.timestamp,
        host_pid: record.host_pid,
        ppid: record.ppid,
        pid: record.pid,
        uid: record.uid,
        mnt_ns_id: record.mnt_ns_id,
        pid_ns_id: record.pid_ns_id,
        comm,
        args,
        retval: record.retval,
    })
}

fn split_fields(data: &[u8]) -> Vec<String> {
    data.split(|&b| b == FIELD_SEP)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

fn decode_args(event_id: u32, fields: &[String]) -> Result<SyscallArgs, DecodeError> {
    let field = |idx: usize, name: &'static str| -> Result<&String, DecodeError> {
        fields.get(idx).ok_or(DecodeError::MissingField { event_id, field: name })
    };
    let as_u32 = |idx: usize, name: &'static str| -> Result<u32, DecodeError> {
        field(idx, name)?.parse().map_err(|_| DecodeError::InvalidInt { field: name })
    };
    let as_i32 = |idx: usize, name: &'static str| -> Result<i32, DecodeError> {
        field(idx, name)?.parse().map_err(|_| DecodeError::InvalidInt { field: name })
    };

    match event_id {
        event_id::OPEN => Ok(SyscallArgs::Open {
            path: field(0, "path")?.clone(),
            flags: as_u32(1, "flags")?,
        }),
        event_id::OPENAT => Ok(SyscallArgs::OpenAt {
            fd: as_i32(0, "fd")?,
            path: field(1, "path")?.clone(),
            flags: as_u32(2, "flags")?,
        }),
        event_id::CLOSE => Ok(SyscallArgs::Close { fd: as_i32(0, "fd")? }),
        event_id::SOCKET => Ok(SyscallArgs::Socket {
            domain: as_u32(0, "domain")?,
            sock_type: as_u32(1, "sock_type")?,
            protocol: as_u32(2, "protocol")?,
        }),
        event_id::CONNECT => Ok(SyscallArgs::Connect {
            fd: as_i32(0, "fd")?,
            sockaddr: decode_sockaddr(field(1, "sockaddr")?),
        }),
        event_id::ACCEPT => Ok(SyscallArgs::Accept {
            fd: as_i32(0, "fd")?,
            sockaddr: decode_sockaddr(field(1, "sockaddr")?),
        }),
        event_id::BIND => Ok(SyscallArgs::Bind {
            fd: as_i32(0, "fd")?,
            sockaddr: decode_sockaddr(field(1, "sockaddr")?),
        }),
        event_id::LISTEN => Ok(SyscallArgs::Listen { fd: as_i32(0, "fd")? }),
        event_id::EXECVE => Ok(SyscallArgs::Execve {
            path: field(0, "path")?.clone(),
            argv: decode_argv(fields.get(1)),
        }),
        event_id::EXECVEAT => Ok(SyscallArgs::ExecveAt {
            path: field(0, "path")?.clone(),
            argv: decode_argv(fields.get(1)),
        }),
        event_id::FORK => Ok(SyscallArgs::Fork { child_pid: as_u32(0, "child_pid")? }),
        event_id::EXIT => Ok(SyscallArgs::Exit),
        other => Err(DecodeError::UnknownEventId(other)),
    }
}

fn decode_argv(field: Option<&String>) -> Vec<String> {
    field
        .map(|s| s.split(ARGV_SEP).filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn decode_sockaddr(field: &str) -> BTreeMap<String, String> {
    field
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
