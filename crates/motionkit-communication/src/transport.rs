//! Transport seam
//!
//! The core never opens serial ports or sockets itself. A [`Transport`] is
//! the external collaborator that delivers ordered, reliable bytes to the
//! device; inbound bytes come back through the session's receive entry point
//! (`StreamingSession::on_line`), driven by whatever thread or task reads the
//! physical link.

use motionkit_core::{ConnectionError, Result};
use parking_lot::Mutex;

/// Ordered byte sink toward the device
///
/// Writes are fire-and-forget from the core's perspective; the session is
/// solely responsible for never writing more unconfirmed commands than the
/// device buffer can hold.
pub trait Transport: Send + Sync {
    /// Write bytes to the device, preserving call order
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Whether the underlying link is currently open
    fn is_connected(&self) -> bool;
}

/// Transport that drops everything, for sessions constructed before a real
/// link exists
#[derive(Debug, Default)]
pub struct NoOpTransport {
    connected: bool,
}

impl NoOpTransport {
    /// Create a disconnected no-op transport
    pub fn new() -> Self {
        Self { connected: false }
    }

    /// Create a no-op transport that pretends to be connected
    pub fn connected() -> Self {
        Self { connected: true }
    }
}

impl Transport for NoOpTransport {
    fn write(&self, _data: &[u8]) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ConnectionError::WriteFailed {
                reason: "transport not connected".to_string(),
            }
            .into())
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// In-memory transport capturing every write, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingTransport {
    writes: Mutex<Vec<Vec<u8>>>,
    connected: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl RecordingTransport {
    /// Create a connected recording transport
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            connected: Mutex::new(true),
            fail_writes: Mutex::new(false),
        }
    }

    /// Everything written so far, as lossy UTF-8 lines
    pub fn written_lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end().to_string())
            .collect()
    }

    /// Number of writes observed
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// Simulate a link drop
    pub fn set_connected(&self, connected: bool) {
        *self.connected.lock() = connected;
    }

    /// Make every subsequent write fail
    pub fn fail_next_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl Transport for RecordingTransport {
    fn write(&self, data: &[u8]) -> Result<()> {
        if !*self.connected.lock() || *self.fail_writes.lock() {
            return Err(ConnectionError::WriteFailed {
                reason: "simulated write failure".to_string(),
            }
            .into());
        }
        self.writes.lock().push(data.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }
}
