//! # MotionKit Communication
//!
//! Flow-controlled streaming of motion commands to CNC-class devices.
//! Commands are queued as execution tokens, streamed under a buffer-credit
//! model that never overruns the device's receive buffer, and confirmed in
//! strict send order. Firmware implementations for the JSON and plain-text
//! protocol families sit behind one trait, dispatched by device-reported
//! version.
//!
//! The transport itself (serial port, TCP socket, test double) is a
//! collaborator behind the [`Transport`] trait; this crate never opens
//! ports.

pub mod config;
pub mod execution;
pub mod firmware;
pub mod offsets;
pub mod probing;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{HomingConfig, StreamingConfig};
pub use execution::{ExecutionQueue, ExecutionToken};
pub use firmware::grbl::GrblService;
pub use firmware::tinyg::TinygService;
pub use firmware::{FirmwareSelector, FirmwareService, FirmwareVersion, VersionRange};
pub use offsets::CoordinateOffsetTable;
pub use probing::{ProbeHandle, ProbeOutcome, ProbingService};
pub use protocol::{DeviceResponse, ProtocolAdapter, StatusUpdate};
pub use session::StreamingSession;
pub use transport::{NoOpTransport, RecordingTransport, Transport};
