//! Structured error types for exectrace
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! The taxonomy mirrors how failures are handled: decode errors are
//! per-record and recoverable, transport/start/read/close errors are
//! session-level and typed by the phase that failed.

use exectrace_common::FILENAME_CAP;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to interpret one raw ring-buffer record.
///
/// Always recoverable: the consumer logs the record and moves on.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("truncated record: got {len} bytes, need {expected}")]
    Truncated { len: usize, expected: usize },

    #[error("filename length {0} outside 0..={cap}", cap = FILENAME_CAP)]
    InvalidLength(i32),
}

/// Terminal signals surfaced by a blocking record read.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The reader was closed. This is the designed shutdown hand-shake, not
    /// a fault; the consumption loop treats it as clean termination.
    #[error("ring buffer reader closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure to open the ring-buffer reader during session start.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("map {0} not found in eBPF object")]
    MapNotFound(&'static str),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fatal failure while acquiring kernel resources.
///
/// No retries happen at this layer; the caller decides whether to restart
/// the process.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("session already started")]
    AlreadyStarted,

    #[error("failed to read eBPF object {path}")]
    ReadObject {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load eBPF object {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: aya::EbpfError,
    },

    #[error("program {0} not found in eBPF object")]
    ProgramNotFound(&'static str),

    #[error("failed to attach to tracepoint {group}/{name}")]
    Attach {
        group: &'static str,
        name: &'static str,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error("failed to open ring buffer reader")]
    Reader(#[source] ReaderError),
}

/// Failure of the event consumption loop.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("session is not running")]
    NotRunning,

    /// A transport error other than the benign closed signal. Fatal to the
    /// session; the caller must not read again.
    #[error("reading from ring buffer failed")]
    Transport(#[source] TransportError),
}

/// Failure while releasing kernel resources.
///
/// Close is best-effort: every release step runs even when an earlier one
/// fails, and the first failure is the one reported.
#[derive(Error, Debug)]
pub enum CloseError {
    #[error("failed to close ring buffer reader")]
    Reader(#[source] io::Error),

    #[error("failed to detach tracepoint")]
    Detach(#[source] aya::programs::ProgramError),

    #[error("failed to unload eBPF program")]
    Unload(#[source] aya::programs::ProgramError),
}
