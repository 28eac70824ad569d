//! Outbound delivery of decoded events.

use log::info;

use crate::domain::ExecEvent;

/// Destination for decoded events.
///
/// The session hands every successfully decoded event to exactly one sink,
/// in the order the transport produced the records.
pub trait EventSink {
    fn emit(&mut self, event: &ExecEvent);
}

/// Default sink: one structured log line per execution.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &ExecEvent) {
        info!("pid={} comm={} filename={}", event.pid(), event.command(), event.filename());
    }
}
