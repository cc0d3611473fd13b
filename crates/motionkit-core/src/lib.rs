//! # MotionKit Core
//!
//! Core types, traits, and utilities for MotionKit.
//! Provides the fundamental abstractions for modal interpreter context,
//! machine telemetry values, session events, and the error taxonomy shared
//! by every firmware implementation.

pub mod context;
pub mod error;
pub mod events;
pub mod machine;
pub mod types;

pub use context::{
    CoordinateFrame, DistanceMode, ModalContext, ModalUpdate, MotionMode, Plane,
};

pub use error::{ConnectionError, ControllerError, Error, FirmwareError, Result};

pub use events::{
    EventCategory, EventFilter, SessionEvent, SessionEventBus, SubscriptionId, TokenId, TokenState,
};

pub use machine::{MachineState, MachineValue, MachineValueId, MachineValueStore, SpindleState};

pub use types::{Axis, Position, Units};
