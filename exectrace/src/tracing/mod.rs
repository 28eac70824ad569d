//! Event pipeline: ring-buffer transport, session lifecycle, sinks.

pub mod ring;
pub mod session;
pub mod sink;

// Re-export common types
pub use ring::{RecordSource, RingReader};
pub use session::{consume_records, TraceSession};
pub use sink::{EventSink, LogSink};
