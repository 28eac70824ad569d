//! Decoded process-execution events.
//!
//! [`ExecEvent::decode`] interprets one raw ring-buffer record positionally
//! against the fixed little-endian layout shared with the kernel program and
//! validates the filename length before any byte is trusted. Decoding is
//! pure: no I/O, no retained references to the input buffer.

use std::borrow::Cow;
use std::fmt;

use exectrace_common::{COMM_LEN, FILENAME_CAP, RECORD_SIZE};

use super::errors::DecodeError;

// Field offsets in the wire layout (pid:4, comm:16, filename:512, len:4).
const COMM_OFFSET: usize = 4;
const FILENAME_OFFSET: usize = COMM_OFFSET + COMM_LEN;
const LEN_OFFSET: usize = FILENAME_OFFSET + FILENAME_CAP;

/// One decoded process execution.
///
/// Immutable value type; construct via [`ExecEvent::decode`]. The filename
/// length has already been validated against the buffer capacity.
#[derive(Clone, Copy)]
pub struct ExecEvent {
    pid: u32,
    comm: [u8; COMM_LEN],
    filename: [u8; FILENAME_CAP],
    filename_len: usize,
}

impl ExecEvent {
    /// Decode one fixed-layout record.
    ///
    /// Records shorter than the schema width are rejected as truncated;
    /// trailing bytes beyond it are ignored (the kernel pads ring-buffer
    /// records to 8-byte boundaries). A filename length outside
    /// `0..=FILENAME_CAP` marks a producer/consumer schema mismatch and
    /// rejects the record rather than truncating it.
    ///
    /// # Errors
    /// Returns [`DecodeError::Truncated`] or [`DecodeError::InvalidLength`];
    /// both are recoverable, the caller logs and continues.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() < RECORD_SIZE {
            return Err(DecodeError::Truncated { len: raw.len(), expected: RECORD_SIZE });
        }

        let mut pid_bytes = [0u8; 4];
        pid_bytes.copy_from_slice(&raw[..COMM_OFFSET]);
        let mut comm = [0u8; COMM_LEN];
        comm.copy_from_slice(&raw[COMM_OFFSET..FILENAME_OFFSET]);
        let mut filename = [0u8; FILENAME_CAP];
        filename.copy_from_slice(&raw[FILENAME_OFFSET..LEN_OFFSET]);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&raw[LEN_OFFSET..LEN_OFFSET + 4]);

        let reported_len = i32::from_le_bytes(len_bytes);
        let filename_len = match usize::try_from(reported_len) {
            Ok(len) if len <= FILENAME_CAP => len,
            _ => return Err(DecodeError::InvalidLength(reported_len)),
        };

        Ok(Self { pid: u32::from_le_bytes(pid_bytes), comm, filename, filename_len })
    }

    /// Process ID (TGID) of the task that called exec.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Short process name, read up to the first NUL or the full 16 bytes.
    #[must_use]
    pub fn command(&self) -> Cow<'_, str> {
        let end = self.comm.iter().position(|&b| b == 0).unwrap_or(COMM_LEN);
        String::from_utf8_lossy(&self.comm[..end])
    }

    /// Executed path, truncated to the kernel-reported length.
    #[must_use]
    pub fn filename(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.filename[..self.filename_len])
    }
}

impl fmt::Debug for ExecEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecEvent")
            .field("pid", &self.pid)
            .field("command", &self.command())
            .field("filename", &self.filename())
            .finish()
    }
}
