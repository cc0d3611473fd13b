//! Wire protocol adapter seam
//!
//! Wire encodings are protocol-specific and opaque to the streaming session.
//! One adapter family speaks line-oriented plain text with implicit
//! turnaround acknowledgment; another speaks structured JSON messages for
//! both commands and status/queue-depth reports. The session only sees the
//! decoded [`DeviceResponse`] variants.

use motionkit_core::{MachineState, ModalUpdate, Position, SpindleState};

/// A decoded inbound line from the device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceResponse {
    /// The oldest in-flight command was accepted
    Ack,
    /// The oldest in-flight command was rejected; it still consumed a
    /// buffer slot on the device
    CommandError {
        /// Device error code.
        code: u16,
        /// Human-readable message, when the device supplies one.
        message: String,
    },
    /// Unsolicited status/telemetry report
    Status(StatusUpdate),
    /// Device-reported available buffer depth, in commands
    QueueReport(usize),
    /// A probe cycle finished
    ProbeReport {
        /// Whether the probe input triggered.
        triggered: bool,
        /// Position at trigger.
        position: Position,
    },
    /// Informational chatter (banners, settings echo)
    Info(String),
    /// Line noise or a partial line; logged and dropped by the session
    Unrecognized,
}

/// Telemetry carried by a status report
///
/// Every field is optional; devices report what they report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    /// Operational state
    pub state: Option<MachineState>,
    /// Machine position
    pub machine_position: Option<Position>,
    /// Work position in the active frame
    pub work_position: Option<Position>,
    /// Current velocity, units per minute
    pub velocity: Option<f64>,
    /// Spindle state
    pub spindle: Option<SpindleState>,
    /// Modal context fields confirmed by this report
    pub modal: ModalUpdate,
    /// A coordinate frame offset the device confirmed
    pub confirmed_offset: Option<(motionkit_core::CoordinateFrame, Position)>,
}

/// Protocol-specific encoding and decoding
///
/// Selected alongside the firmware implementation; the streaming session is
/// generic over this seam.
pub trait ProtocolAdapter: Send + Sync {
    /// Encode one command for the wire, including line termination
    fn encode(&self, command: &str) -> Vec<u8>;

    /// Decode one inbound line
    fn decode(&self, line: &str) -> DeviceResponse;

    /// Out-of-band status query bytes
    fn status_query(&self) -> Vec<u8>;

    /// Out-of-band queue-depth query bytes, if the protocol has one
    fn queue_depth_query(&self) -> Option<Vec<u8>> {
        None
    }

    /// Immediate feed-hold control sequence
    fn feed_hold(&self) -> Vec<u8>;

    /// Immediate cycle-start / resume control sequence
    fn cycle_start(&self) -> Vec<u8>;

    /// Immediate buffer-flush control sequence
    fn queue_flush(&self) -> Vec<u8>;
}
