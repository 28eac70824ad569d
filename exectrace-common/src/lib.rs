//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the event record and layout constants shared between the
//! kernel-side tracepoint program and userspace. All types use `#[repr(C)]`
//! for consistent memory layout across the kernel/userspace boundary.

#![no_std]

/// Capacity of the short process name (`comm`) field.
///
/// Matches the kernel's `TASK_COMM_LEN`; the value is NUL-padded and may
/// occupy the full 16 bytes without a terminator.
pub const COMM_LEN: usize = 16;

/// Capacity of the executed-path (`filename`) field.
///
/// Paths longer than this are truncated by the kernel program. The buffer is
/// **not** reliably NUL-terminated; `filename_len` carries the valid length.
pub const FILENAME_CAP: usize = 512;

/// Total wire size of one [`ExecRecord`]: pid + comm + filename + length.
///
/// The layout has no interior padding (every field is 4-byte aligned), so
/// `size_of::<ExecRecord>()` equals this constant.
pub const RECORD_SIZE: usize = 4 + COMM_LEN + FILENAME_CAP + 4;

/// Event written to the `EVENTS` ring buffer on every `sched_process_exec`.
///
/// Written by the eBPF program and decoded field-by-field in userspace.
/// All integer fields are native-endian in the kernel, which is little-endian
/// on every architecture the agent targets; the userspace decoder reads them
/// as little-endian explicitly.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExecRecord {
    /// Process ID (TGID) of the task that called exec.
    pub pid: u32,

    /// Short process name, NUL-padded to [`COMM_LEN`].
    pub comm: [u8; COMM_LEN],

    /// Executed path bytes; only the first `filename_len` bytes are valid.
    pub filename: [u8; FILENAME_CAP],

    /// Number of valid bytes in `filename`, excluding any NUL terminator.
    ///
    /// Signed because the kernel helper that fills `filename` reports its
    /// result as a signed count. Must be in `0 ..= FILENAME_CAP`; anything
    /// else marks the record as malformed.
    pub filename_len: i32,
}

#[cfg(feature = "user")]
use aya::Pod;

// Required for eBPF <-> userspace communication; the type is plain bytes.
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ExecRecord {}
