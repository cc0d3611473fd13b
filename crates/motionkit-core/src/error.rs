//! Error handling for MotionKit
//!
//! Provides error types for all layers of the streaming core:
//! - Controller errors (execution queue, probing, machine values)
//! - Connection errors (transport seam)
//! - Firmware errors (version dispatch, protocol adapters)
//!
//! All error types use `thiserror` for ergonomic error handling.
//!
//! Propagation policy: errors raised at submission time are returned to the
//! caller synchronously. Errors discovered asynchronously (a write failure in
//! the middle of a stream, a malformed response line) are handled locally by
//! the session and only the resulting state transition is visible through the
//! event surface.

use thiserror::Error;

/// Controller error type
///
/// Represents errors related to command execution, probing and the
/// machine value store.
#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    /// Operation attempted while the transport is disconnected
    #[error("Controller not connected")]
    NotConnected,

    /// Device-side flow control is disabled; streaming would overrun the
    /// receive buffer
    #[error("Flow control is disabled on the device; streaming refused")]
    FlowControlDisabled,

    /// Queue-report verbosity is off while planner buffer checking is required
    #[error("Queue reporting is disabled; planner buffer checking is impossible")]
    QueueReportingDisabled,

    /// A probe was requested while another probe is still outstanding
    #[error("A probe cycle is already pending")]
    ProbeAlreadyPending,

    /// The pending probe was cancelled before the device reported a result
    #[error("Probe cycle cancelled")]
    ProbeCancelled,

    /// A machine value was accessed without being declared first
    #[error("Machine value {id} was never declared")]
    UndeclaredValue {
        /// The identifier of the undeclared value.
        id: String,
    },

    /// A machine value update carried the wrong type
    #[error("Machine value {id} holds a different type")]
    ValueTypeMismatch {
        /// The identifier of the mistyped value.
        id: String,
    },

    /// Generic controller error
    #[error("Controller error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Connection error type
///
/// Represents errors raised at the transport seam. The core never opens
/// ports itself; these surface from the collaborator that does.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// A write to the transport failed mid-stream
    #[error("Transport write failed: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Generic connection error
    #[error("Connection error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Firmware error type
///
/// Represents errors specific to firmware version dispatch and protocol
/// adapters.
#[derive(Error, Debug, Clone)]
pub enum FirmwareError {
    /// No registered implementation covers the detected version
    #[error("Firmware version {version} not supported")]
    UnsupportedVersion {
        /// The unsupported firmware version.
        version: String,
    },

    /// A registered version range overlaps an existing one
    #[error("Version range [{min},{max}] overlaps an already registered range")]
    RangeOverlap {
        /// Lower bound of the rejected range.
        min: String,
        /// Upper bound of the rejected range.
        max: String,
    },

    /// An inverted range was registered (min > max)
    #[error("Invalid version range: {min} > {max}")]
    InvalidRange {
        /// Lower bound of the rejected range.
        min: String,
        /// Upper bound of the rejected range.
        max: String,
    },

    /// A version string could not be parsed
    #[error("Malformed firmware version: {version}")]
    MalformedVersion {
        /// The version string that failed to parse.
        version: String,
    },

    /// No firmware implementation has been activated yet
    #[error("No active firmware implementation")]
    NoActiveFirmware,

    /// Generic firmware error
    #[error("Firmware error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Main error type for MotionKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Firmware error
    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Check if this is a firmware error
    pub fn is_firmware_error(&self) -> bool {
        matches!(self, Error::Firmware(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
