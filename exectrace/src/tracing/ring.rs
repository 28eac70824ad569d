//! Blocking ring-buffer reader.
//!
//! aya's [`RingBuf`] only offers a non-blocking `next()`, while the session's
//! background reader needs a blocking read that a concurrent close can
//! interrupt. [`RingReader`] pairs a `poll(2)` wait on the ring buffer fd
//! with an eventfd that [`RingReader::close`] signals, so a blocked read
//! wakes with [`TransportError::Closed`] instead of hanging until the next
//! exec event arrives.

#![allow(unsafe_code)] // eventfd/poll FFI

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use aya::maps::{Map, MapData, RingBuf};

use crate::domain::errors::{ReaderError, TransportError};

/// Source of raw event records for the consumption loop.
///
/// The production implementation is [`RingReader`]; tests substitute an
/// in-memory queue. `read_one` blocks until a record arrives, the transport
/// fails, or another thread calls `close`, which makes the pending and all
/// subsequent reads return [`TransportError::Closed`].
pub trait RecordSource: Send + Sync + 'static {
    /// Block until the next raw record is available.
    ///
    /// # Errors
    /// [`TransportError::Closed`] after `close`; any other error is terminal
    /// for the session.
    fn read_one(&self) -> Result<Vec<u8>, TransportError>;

    /// Unblock a pending `read_one` and fail all future reads with
    /// [`TransportError::Closed`]. Safe to call more than once and safe to
    /// call concurrently with a blocked read.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the wake-up signal cannot be
    /// delivered.
    fn close(&self) -> io::Result<()>;
}

/// Closable blocking reader over the `EVENTS` ring buffer map.
pub struct RingReader {
    ring: Mutex<RingBuf<MapData>>,
    ring_fd: RawFd,
    stop: OwnedFd,
    closed: AtomicBool,
}

impl RingReader {
    /// Wrap an owned ring buffer map in a blocking reader.
    ///
    /// # Errors
    /// Fails if the map is not a ring buffer or the wake-up eventfd cannot
    /// be created.
    pub fn open(map: Map) -> Result<Self, ReaderError> {
        let ring = RingBuf::try_from(map)?;
        let ring_fd = ring.as_raw_fd();
        let stop = new_eventfd()?;
        Ok(Self { ring: Mutex::new(ring), ring_fd, stop, closed: AtomicBool::new(false) })
    }

    /// Wait until the ring buffer has data or the reader is closed.
    fn wait_readable(&self) -> Result<(), TransportError> {
        let mut fds = [
            libc::pollfd { fd: self.ring_fd, events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: self.stop.as_raw_fd(), events: libc::POLLIN, revents: 0 },
        ];
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(TransportError::Io(err));
        }
        if fds[1].revents != 0 {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl RecordSource for RingReader {
    fn read_one(&self) -> Result<Vec<u8>, TransportError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            {
                let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
                let record = ring.next().map(|r| r.to_vec());
                if let Some(record) = record {
                    return Ok(record);
                }
            }
            self.wait_readable()?;
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Wake a reader blocked in poll(2).
        let value = 1u64.to_ne_bytes();
        let written =
            unsafe { libc::write(self.stop.as_raw_fd(), value.as_ptr().cast(), value.len()) };
        if written < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn new_eventfd() -> io::Result<OwnedFd> {
    let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: the fd was just created and has no other owner.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
