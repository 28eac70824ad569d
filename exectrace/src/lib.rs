//! # exectrace - Process Execution Tracing Agent
//!
//! exectrace loads a kernel tracepoint program, attaches it to
//! `sched/sched_process_exec`, and streams one fixed-layout record per
//! process execution from kernel space to userspace for logging.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                eBPF Program (Kernel)                │
//! │  Tracepoint: sched/sched_process_exec               │
//! └──────────────────────┬──────────────────────────────┘
//!                        │ ring buffer records
//!                        ▼
//! ┌─────────────────────────────────────────────────────┐
//! │               exectrace (This Crate)                │
//! │                                                     │
//! │  ┌────────────┐   ┌─────────────┐   ┌────────────┐  │
//! │  │ RingReader │──▶│TraceSession │──▶│ EventSink  │  │
//! │  │ (blocking) │   │(select loop)│   │ (log line) │  │
//! │  └────────────┘   └──────┬──────┘   └────────────┘  │
//! │                          │                          │
//! │                          ▼                          │
//! │                   ┌────────────┐                    │
//! │                   │  Decoder   │                    │
//! │                   │ (ExecEvent)│                    │
//! │                   └────────────┘                    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`domain`]: decoded event type, fixed-layout decoder, and the error
//!   taxonomy (per-record recoverable vs. session-fatal vs. benign close)
//! - [`tracing`]: kernel resource lifecycle and the event pipeline
//!   - `ring`: blocking, closable reader over the `EVENTS` ring buffer map
//!   - `session`: start/read/close lifecycle and the cancellable
//!     consumption loop (one background reader, two single-slot channels)
//!   - `sink`: pluggable destination for decoded events
//!
//! ## Lifecycle
//!
//! A [`tracing::TraceSession`] moves `Unstarted → Running → Stopped`:
//! `start` acquires program, attachment, and reader in order; `read` drains
//! records until cancelled or the transport fails; `close` releases the
//! resources in reverse order and is the designed way to unblock a reader
//! still waiting on the kernel.

// Expose modules for testing
pub mod domain;
pub mod tracing;
