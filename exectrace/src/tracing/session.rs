//! Kernel resource lifecycle and the event consumption loop.
//!
//! A [`TraceSession`] owns the three kernel resources behind exec tracing
//! (the loaded program objects, the tracepoint attachment, and the ring
//! buffer reader) and acquires/releases them in a strict order:
//!
//! ```text
//! start:  load objects ──▶ attach tracepoint ──▶ open reader
//! close:  close reader ──▶ detach tracepoint ──▶ unload objects
//! ```
//!
//! [`TraceSession::read`] runs the consumption loop until cancelled or the
//! transport fails. Cancellation does not interrupt a read blocked in the
//! kernel; the owner unblocks it with [`TraceSession::close`], which the
//! reader observes as the benign closed signal.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use aya::programs::trace_point::TracePointLinkId;
use aya::programs::TracePoint;
use aya::Ebpf;
use aya_log::EbpfLogger;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task;

use crate::domain::errors::{CloseError, ReadError, ReaderError, StartError, TransportError};
use crate::domain::ExecEvent;

use super::ring::{RecordSource, RingReader};
use super::sink::EventSink;

/// Tracepoint the program attaches to; fires on every successful exec.
const TRACEPOINT_GROUP: &str = "sched";
const TRACEPOINT_NAME: &str = "sched_process_exec";

/// Names baked into the compiled eBPF object.
const EXEC_PROGRAM: &str = "sched_process_exec";
const EVENTS_MAP: &str = "EVENTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unstarted,
    Running,
    Stopped,
}

/// Owns the kernel attachment and ring-buffer reader for one tracing run.
///
/// Lifecycle is `Unstarted → Running → Stopped`: [`start`](Self::start) is
/// the only way in to `Running`, [`close`](Self::close) the only way out,
/// and `Stopped` is terminal. `close` is safe after a failed `start` and
/// while a `read` is still blocked on the transport.
pub struct TraceSession {
    object_path: PathBuf,
    state: State,
    ebpf: Option<Ebpf>,
    link_id: Option<TracePointLinkId>,
    reader: Option<Arc<RingReader>>,
}

impl TraceSession {
    /// Create an unstarted session for the compiled eBPF object at `path`.
    #[must_use]
    pub fn new(object_path: impl Into<PathBuf>) -> Self {
        Self {
            object_path: object_path.into(),
            state: State::Unstarted,
            ebpf: None,
            link_id: None,
            reader: None,
        }
    }

    /// Acquire kernel resources: load the object, attach the tracepoint,
    /// open the ring buffer reader.
    ///
    /// No step is retried; each failure names the step that failed. A
    /// partial acquisition is unwound before returning (everything lives in
    /// locals until all three steps succeed), so a failed `start` leaks
    /// nothing and a subsequent [`close`](Self::close) is still safe.
    ///
    /// # Errors
    /// [`StartError`] identifying the failing step; all fatal.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.state != State::Unstarted {
            return Err(StartError::AlreadyStarted);
        }

        debug!("loading eBPF object from {}", self.object_path.display());
        let data = fs::read(&self.object_path).map_err(|source| StartError::ReadObject {
            path: self.object_path.clone(),
            source,
        })?;
        let mut ebpf = Ebpf::load(&data)
            .map_err(|source| StartError::Load { path: self.object_path.clone(), source })?;

        // Forward kernel-side program logs; absence of log maps is fine.
        if let Err(err) = EbpfLogger::init(&mut ebpf) {
            warn!("failed to initialize eBPF logger: {err}");
        }

        let attach_err = |source| StartError::Attach {
            group: TRACEPOINT_GROUP,
            name: TRACEPOINT_NAME,
            source,
        };
        let program: &mut TracePoint = ebpf
            .program_mut(EXEC_PROGRAM)
            .ok_or(StartError::ProgramNotFound(EXEC_PROGRAM))?
            .try_into()
            .map_err(attach_err)?;
        program.load().map_err(attach_err)?;
        let link_id = program.attach(TRACEPOINT_GROUP, TRACEPOINT_NAME).map_err(attach_err)?;
        debug!("attached tracepoint {TRACEPOINT_GROUP}/{TRACEPOINT_NAME}");

        let map = ebpf
            .take_map(EVENTS_MAP)
            .ok_or(StartError::Reader(ReaderError::MapNotFound(EVENTS_MAP)))?;
        let reader = RingReader::open(map).map_err(StartError::Reader)?;

        self.ebpf = Some(ebpf);
        self.link_id = Some(link_id);
        self.reader = Some(Arc::new(reader));
        self.state = State::Running;
        info!("tracing {TRACEPOINT_GROUP}/{TRACEPOINT_NAME}");
        Ok(())
    }

    /// Consume records until `shutdown` completes or the transport fails.
    ///
    /// Returns `Ok(())` on cancellation and on the benign closed signal; any
    /// other transport error is fatal to the session. Cancellation leaves
    /// the background reader blocked on the transport; the owner must
    /// follow up with [`close`](Self::close) to reap it.
    ///
    /// # Errors
    /// [`ReadError::NotRunning`] outside the `Running` state;
    /// [`ReadError::Transport`] on a terminal transport failure.
    pub async fn read<F, S>(&mut self, shutdown: F, sink: &mut S) -> Result<(), ReadError>
    where
        F: Future<Output = ()>,
        S: EventSink,
    {
        if self.state != State::Running {
            return Err(ReadError::NotRunning);
        }
        let reader = Arc::clone(self.reader.as_ref().ok_or(ReadError::NotRunning)?);
        consume_records(reader, shutdown, sink).await
    }

    /// Release kernel resources in reverse-acquisition order: reader, then
    /// attachment, then program objects.
    ///
    /// Best-effort: every step runs even when an earlier one fails, and the
    /// first failure is reported. Closing the reader is what unblocks a
    /// background read still pending inside [`read`](Self::read). Calling
    /// `close` again, or after a failed `start`, is a no-op.
    ///
    /// # Errors
    /// [`CloseError`] naming the first release step that failed.
    pub fn close(&mut self) -> Result<(), CloseError> {
        self.state = State::Stopped;
        let mut first_failure: Option<CloseError> = None;

        if let Some(reader) = self.reader.take() {
            debug!("closing ring buffer reader");
            if let Err(err) = reader.close() {
                first_failure.get_or_insert(CloseError::Reader(err));
            }
        }

        if let Some(mut ebpf) = self.ebpf.take() {
            if let Err(err) = detach_and_unload(&mut ebpf, self.link_id.take()) {
                first_failure.get_or_insert(err);
            }
            // Dropping the handle releases the maps and remaining objects.
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn detach_and_unload(ebpf: &mut Ebpf, link_id: Option<TracePointLinkId>) -> Result<(), CloseError> {
    let Some(program) = ebpf.program_mut(EXEC_PROGRAM) else {
        return Ok(());
    };
    let program: &mut TracePoint = program.try_into().map_err(CloseError::Detach)?;

    let mut result = Ok(());
    if let Some(link_id) = link_id {
        if let Err(err) = program.detach(link_id) {
            result = Err(CloseError::Detach(err));
        }
    }
    if let Err(err) = program.unload() {
        if result.is_ok() {
            result = Err(CloseError::Unload(err));
        }
    }
    result
}

/// Drain records from `source` until cancellation or a terminal transport
/// signal, decoding each record and emitting it to `sink` in transport
/// order.
///
/// Record retrieval is blocking, so it runs on a dedicated blocking task
/// that hands completed records and the terminal error back over two
/// single-slot channels: the producer cannot run ahead of the consumer by
/// more than one record, and the select below observes cancellation without
/// waiting out a blocked read. A blocked producer is not interrupted by
/// cancellation; only [`RecordSource::close`] unblocks it.
///
/// Decode failures are logged and skipped; they never terminate the loop.
///
/// # Errors
/// [`ReadError::Transport`] on any terminal transport error other than the
/// closed signal, which is treated as clean termination.
pub async fn consume_records<R, F, S>(
    source: Arc<R>,
    shutdown: F,
    sink: &mut S,
) -> Result<(), ReadError>
where
    R: RecordSource + ?Sized,
    F: Future<Output = ()>,
    S: EventSink,
{
    let (record_tx, mut record_rx) = mpsc::channel::<Vec<u8>>(1);
    let (error_tx, mut error_rx) = mpsc::channel::<TransportError>(1);

    // Not awaited: after cancellation the producer stays blocked in the
    // transport until the owner's close() wakes it.
    let _producer = task::spawn_blocking(move || loop {
        match source.read_one() {
            Ok(raw) => {
                if record_tx.blocking_send(raw).is_err() {
                    // Consumer is gone; nothing left to report to.
                    return;
                }
            }
            Err(err) => {
                let _ = error_tx.blocking_send(err);
                return;
            }
        }
    });

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            // Deterministic priority: cancellation first, then records ahead
            // of the terminal signal so records the transport already handed
            // over are not dropped on shutdown.
            biased;

            () = &mut shutdown => {
                debug!("cancellation requested, stopping event consumption");
                return Ok(());
            }
            record = record_rx.recv() => match record {
                Some(raw) => match ExecEvent::decode(&raw) {
                    Ok(event) => sink.emit(&event),
                    Err(err) => warn!("skipping malformed exec record: {err}"),
                },
                // Producer exited; the error channel holds the reason.
                None => break,
            },
            err = error_rx.recv() => {
                return terminal_result(err);
            }
        }
    }

    let err = error_rx.recv().await;
    terminal_result(err)
}

fn terminal_result(err: Option<TransportError>) -> Result<(), ReadError> {
    match err {
        // Reader closed under us: the expected shutdown hand-shake.
        Some(TransportError::Closed) | None => Ok(()),
        Some(err) => Err(ReadError::Transport(err)),
    }
}
