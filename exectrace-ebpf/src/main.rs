//! # eBPF Kernel-Side Instrumentation
//!
//! Tracepoint program that fires on every successful `execve`/`execveat` and
//! streams one fixed-size [`ExecRecord`] per execution to userspace.
//!
//! ## Programs
//!
//! - **Tracepoint**: `sched_process_exec` - attached to `sched/sched_process_exec`
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Ring buffer (256KB) for the exec event stream
//!
//! ## Build
//!
//! Cross-compiled for the BPF target via the workspace helper:
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_probe_read_kernel_str_bytes},
    macros::{map, tracepoint},
    maps::RingBuf,
    programs::TracePointContext,
    EbpfContext,
};
use aya_log_ebpf::debug;
use exectrace_common::ExecRecord;

/// Offset of the `__data_loc char[] filename` field in the tracepoint record.
///
/// Layout from /sys/kernel/debug/tracing/events/sched/sched_process_exec/format:
/// the 8-byte common header is followed by the 4-byte `__data_loc` word whose
/// low 16 bits hold the offset of the string within the record.
const FILENAME_DATA_LOC: usize = 8;

/// Ring buffer carrying one record per process execution.
///
/// When the buffer is full, `reserve` fails and the event is dropped;
/// userspace has no way to observe the gap.
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

#[tracepoint]
pub fn sched_process_exec(ctx: TracePointContext) -> u32 {
    match try_sched_process_exec(&ctx) {
        Ok(()) => 0,
        Err(ret) => ret,
    }
}

fn try_sched_process_exec(ctx: &TracePointContext) -> Result<(), u32> {
    let Some(mut entry) = EVENTS.reserve::<ExecRecord>(0) else {
        debug!(ctx, "ring buffer full, dropping exec event");
        return Err(1);
    };

    // An ExecRecord does not fit on the 512-byte BPF stack; fill the
    // reserved ring buffer slot in place.
    let record = unsafe { &mut *entry.as_mut_ptr() };

    record.pid = (bpf_get_current_pid_tgid() >> 32) as u32;
    record.comm = bpf_get_current_comm().unwrap_or([0u8; 16]);
    record.filename_len = 0;

    let data_loc: u32 = match unsafe { ctx.read_at(FILENAME_DATA_LOC) } {
        Ok(loc) => loc,
        Err(_) => {
            entry.discard(0);
            return Err(1);
        }
    };
    let filename_offset = (data_loc & 0xffff) as usize;

    let read = unsafe {
        bpf_probe_read_kernel_str_bytes(
            ctx.as_ptr().add(filename_offset).cast::<u8>(),
            &mut record.filename,
        )
    };
    match read {
        Ok(filename) => {
            record.filename_len = filename.len() as i32;
        }
        Err(_) => {
            entry.discard(0);
            return Err(1);
        }
    }

    entry.submit(0);
    Ok(())
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
