//! Fixed-layout record as it arrives from the (external) kernel event
//! source: a `repr(C)` header plus a fixed-size variable-data tail that the
//! Event Ingestor interprets according to `event_id` (path strings,
//! sockaddr field=value pairs, ...).
//!
//! Layout mirrors the event struct an eBPF monitor would write into its
//! ring buffer, widened with the extra identity fields `SyscallEvent`
//! requires (ppid/pid/uid/mnt_ns_id/pid_ns_id).

/// Length of the `comm` field, matching `TASK_COMM_LEN` on Linux.
pub const COMM_LEN: usize = 16;

/// Length of the variable-data tail (paths, sockaddr maps, argv, ...).
pub const DATA_LEN: usize = 256;

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RawSyscallRecord {
    pub timestamp: u64,
    pub host_pid: u32,
    pub ppid: u32,
    pub pid: u32,
    pub uid: u32,
    pub mnt_ns_id: u64,
    pub pid_ns_id: u64,
    pub comm: [u8; COMM_LEN],
    pub event_id: u32,
    pub retval: i64,
    pub data: [u8; DATA_LEN],
}

impl RawSyscallRecord {
    pub const fn zeroed() -> Self {
        Self {
            timestamp: 0,
            host_pid: 0,
            ppid: 0,
            pid: 0,
            uid: 0,
            mnt_ns_id: 0,
            pid_ns_id: 0,
            comm: [0u8; COMM_LEN],
            event_id: 0,
            retval: 0,
            data: [0u8; DATA_LEN],
        }
    }
}

impl Default for RawSyscallRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

// Compile-time ABI/layout check: the record must be 8-byte aligned so it
// can be memcpy'd directly out of a ring-buffer slice without an unaligned
// read.
const _: () = assert!(core::mem::align_of::<RawSyscallRecord>() == 8);
