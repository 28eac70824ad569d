//! Pipeline and lifecycle tests that need no kernel: the consumption loop
//! runs against an in-memory blocking record source.

use std::collections::VecDeque;
use std::future;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use exectrace::domain::{ExecEvent, ReadError, StartError, TransportError};
use exectrace::tracing::{consume_records, EventSink, RecordSource, TraceSession};
use exectrace_common::{COMM_LEN, FILENAME_CAP, RECORD_SIZE};
use tokio::time::timeout;

/// Encode one wire record the way the kernel program lays it out.
fn record(pid: u32, comm: &str, filename: &str) -> Vec<u8> {
    let mut buf = vec![0u8; RECORD_SIZE];
    buf[..4].copy_from_slice(&pid.to_le_bytes());
    buf[4..4 + comm.len()].copy_from_slice(comm.as_bytes());
    buf[20..20 + filename.len()].copy_from_slice(filename.as_bytes());
    let len = i32::try_from(filename.len()).unwrap();
    buf[20 + FILENAME_CAP..].copy_from_slice(&len.to_le_bytes());
    buf
}

/// Blocking in-memory record source. `read_one` drains the queue, then
/// blocks until more items arrive or `close` is called.
struct QueueSource {
    state: Mutex<QueueState>,
    cond: Condvar,
}

struct QueueState {
    items: VecDeque<Result<Vec<u8>, TransportError>>,
    closed: bool,
}

impl QueueSource {
    fn new(items: Vec<Result<Vec<u8>, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState { items: items.into(), closed: false }),
            cond: Condvar::new(),
        })
    }
}

impl RecordSource for QueueSource {
    fn read_one(&self) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return item;
            }
            if state.closed {
                return Err(TransportError::Closed);
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    fn close(&self) -> io::Result<()> {
        self.state.lock().unwrap().closed = true;
        self.cond.notify_all();
        Ok(())
    }
}

#[derive(Default)]
struct VecSink(Vec<(u32, String, String)>);

impl EventSink for VecSink {
    fn emit(&mut self, event: &ExecEvent) {
        self.0.push((event.pid(), event.command().into_owned(), event.filename().into_owned()));
    }
}

#[tokio::test]
async fn test_cancellation_returns_promptly_without_close() {
    let source = QueueSource::new(vec![]);
    let mut sink = VecSink::default();

    // Cancellation fires shortly; no records are pending and close is never
    // called, yet read must still return success quickly.
    let result = timeout(
        Duration::from_secs(5),
        consume_records(Arc::clone(&source), tokio::time::sleep(Duration::from_millis(20)), &mut sink),
    )
    .await
    .expect("read did not observe cancellation in time");

    assert!(result.is_ok());
    assert!(sink.0.is_empty());

    // Reap the background reader left blocked on the source.
    source.close().unwrap();
}

#[tokio::test]
async fn test_close_unblocks_pending_read() {
    let source = QueueSource::new(vec![]);

    let consumer = {
        let source = Arc::clone(&source);
        tokio::spawn(async move {
            let mut sink = VecSink::default();
            consume_records(source, future::pending::<()>(), &mut sink).await
        })
    };

    // Give the consumer time to block on the empty source, then close.
    tokio::time::sleep(Duration::from_millis(50)).await;
    source.close().unwrap();

    let result = timeout(Duration::from_secs(5), consumer)
        .await
        .expect("close did not unblock the read")
        .expect("consumer panicked");
    assert!(result.is_ok(), "closed signal must be clean termination, got {result:?}");
}

#[tokio::test]
async fn test_events_delivered_in_order_with_malformed_skipped() {
    let mut bad_length = record(99, "bad", "/bin/bad");
    bad_length[20 + FILENAME_CAP..].copy_from_slice(&600i32.to_le_bytes());

    let source = QueueSource::new(vec![
        Ok(record(1, "systemd", "/usr/lib/systemd/systemd")),
        Ok(vec![0u8; 10]), // truncated
        Ok(record(2, "bash", "/usr/bin/bash")),
        Ok(bad_length),
        Ok(record(3, "cat", "/bin/cat")),
    ]);
    // Queue is pre-loaded; closing now delivers every record first, then the
    // closed signal.
    source.close().unwrap();

    let mut sink = VecSink::default();
    let result = timeout(
        Duration::from_secs(5),
        consume_records(source, future::pending::<()>(), &mut sink),
    )
    .await
    .expect("loop did not terminate");

    assert!(result.is_ok());
    let pids: Vec<u32> = sink.0.iter().map(|(pid, _, _)| *pid).collect();
    assert_eq!(pids, vec![1, 2, 3]);
    assert_eq!(sink.0[1].1, "bash");
    assert_eq!(sink.0[1].2, "/usr/bin/bash");
}

#[tokio::test]
async fn test_transport_error_is_fatal() {
    let source = QueueSource::new(vec![
        Ok(record(1, "bash", "/usr/bin/bash")),
        Err(TransportError::Io(io::Error::other("ring buffer gone"))),
    ]);

    let mut sink = VecSink::default();
    let result = timeout(
        Duration::from_secs(5),
        consume_records(source, future::pending::<()>(), &mut sink),
    )
    .await
    .expect("loop did not terminate");

    assert!(matches!(result, Err(ReadError::Transport(_))));
    // The record handed over before the failure was still delivered.
    assert_eq!(sink.0.len(), 1);
    assert_eq!(sink.0[0].0, 1);
}

#[tokio::test]
async fn test_full_capacity_fields_survive_the_pipeline() {
    let comm = "x".repeat(COMM_LEN);
    let filename = "/".repeat(FILENAME_CAP);
    let source = QueueSource::new(vec![Ok(record(7, &comm, &filename))]);
    source.close().unwrap();

    let mut sink = VecSink::default();
    let result = consume_records(source, future::pending::<()>(), &mut sink).await;

    assert!(result.is_ok());
    assert_eq!(sink.0.len(), 1);
    assert_eq!(sink.0[0].1.len(), COMM_LEN);
    assert_eq!(sink.0[0].2.len(), FILENAME_CAP);
}

#[tokio::test]
async fn test_read_before_start_is_rejected() {
    let mut session = TraceSession::new("/nonexistent/exectrace.o");
    let mut sink = VecSink::default();
    let result = session.read(future::ready(()), &mut sink).await;
    assert!(matches!(result, Err(ReadError::NotRunning)));
}

#[test]
fn test_start_with_missing_object_fails() {
    let mut session = TraceSession::new("/nonexistent/exectrace.o");
    assert!(matches!(session.start(), Err(StartError::ReadObject { .. })));
}

#[test]
fn test_start_with_garbage_object_fails_load() {
    let file = tempfile::NamedTempFile::new().expect("tempfile");
    std::fs::write(file.path(), b"definitely not an ELF object").expect("write");

    let mut session = TraceSession::new(file.path());
    assert!(matches!(session.start(), Err(StartError::Load { .. })));
}

#[test]
fn test_close_is_safe_after_failed_start_and_repeatable() {
    let mut session = TraceSession::new("/nonexistent/exectrace.o");
    assert!(session.start().is_err());

    assert!(session.close().is_ok());
    assert!(session.close().is_ok());

    // Stopped is terminal: the session cannot be restarted.
    assert!(matches!(session.start(), Err(StartError::AlreadyStarted)));
}
