//! # exectrace - Main Entry Point
//!
//! Flag-free agent binary: raises the memlock limit, starts a trace
//! session, logs one line per process execution until SIGINT/SIGTERM, then
//! releases kernel resources.
//!
//! The compiled eBPF object is loaded from the `cargo xtask build-ebpf`
//! output path, overridable with the `EXECTRACE_BPF_OBJECT` environment
//! variable.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::signal::unix::{signal, SignalKind};

use exectrace::tracing::{LogSink, TraceSession};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

#[tokio::main]
async fn run() -> Result<()> {
    // One-time process setup, before any kernel resource is touched.
    raise_memlock_limit();

    let object_path = bpf_object_path();
    let mut session = TraceSession::new(&object_path);
    session.start().context("failed to start exec trace session")?;

    info!("tracing process executions, press Ctrl+C to stop");

    let mut sink = LogSink;
    let read_result = session.read(shutdown_signal(), &mut sink).await;

    // Close regardless of how the read loop ended; this is also what reaps
    // the background reader still blocked on the transport.
    let close_result = session.close();

    read_result.context("event consumption failed")?;
    close_result.context("failed to release kernel resources")?;

    info!("shutdown complete");
    Ok(())
}

/// Completes when SIGINT or SIGTERM is delivered.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = &mut ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            warn!("failed to install SIGTERM handler: {err}");
            let _ = ctrl_c.await;
        }
    }
    info!("received shutdown signal, exiting...");
}

/// Allow the process to lock enough memory for eBPF maps (needed on older
/// kernels that charge ring buffers against RLIMIT_MEMLOCK).
#[allow(unsafe_code)]
fn raise_memlock_limit() {
    let limit = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) };
    if ret != 0 {
        debug!("failed to raise memlock limit, ret is: {ret}");
    }
}

/// Compiled eBPF object location.
fn bpf_object_path() -> PathBuf {
    if let Ok(path) = std::env::var("EXECTRACE_BPF_OBJECT") {
        return PathBuf::from(path);
    }
    PathBuf::from("target/bpfel-unknown-none/release/exectrace")
}
