//! Modal interpreter context
//!
//! Tracks the persistent interpreter settings of the device: units, active
//! plane, distance mode, motion mode, feedrate, active coordinate frame, tool
//! number and position. The context is confirmation-authoritative: it is
//! mutated only by applying device-confirmed updates from the receive path,
//! never by optimistic client writes.

use crate::types::{Position, Units};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distance interpretation mode (G90/G91)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMode {
    /// Absolute coordinates (G90)
    #[default]
    Absolute,
    /// Incremental coordinates (G91)
    Incremental,
}

/// Active working plane (G17/G18/G19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Plane {
    /// XY plane (G17)
    #[default]
    Xy,
    /// ZX plane (G18)
    Zx,
    /// YZ plane (G19)
    Yz,
}

/// Active motion mode (G0/G1/G2/G3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionMode {
    /// Rapid positioning (G0)
    #[default]
    Rapid,
    /// Linear feed motion (G1)
    Linear,
    /// Clockwise arc (G2)
    ArcCw,
    /// Counter-clockwise arc (G3)
    ArcCcw,
}

/// Work coordinate frames (G54..G59)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CoordinateFrame {
    /// G54, the power-on default frame
    #[default]
    G54,
    /// G55
    G55,
    /// G56
    G56,
    /// G57
    G57,
    /// G58
    G58,
    /// G59
    G59,
}

impl CoordinateFrame {
    /// All supported frames, in G-code order
    pub const ALL: [CoordinateFrame; 6] = [
        CoordinateFrame::G54,
        CoordinateFrame::G55,
        CoordinateFrame::G56,
        CoordinateFrame::G57,
        CoordinateFrame::G58,
        CoordinateFrame::G59,
    ];

    /// The G-code word selecting this frame
    pub fn gcode(&self) -> &'static str {
        match self {
            CoordinateFrame::G54 => "G54",
            CoordinateFrame::G55 => "G55",
            CoordinateFrame::G56 => "G56",
            CoordinateFrame::G57 => "G57",
            CoordinateFrame::G58 => "G58",
            CoordinateFrame::G59 => "G59",
        }
    }

    /// The 1-based index devices use in coordinate-system reports
    pub fn index(&self) -> u8 {
        match self {
            CoordinateFrame::G54 => 1,
            CoordinateFrame::G55 => 2,
            CoordinateFrame::G56 => 3,
            CoordinateFrame::G57 => 4,
            CoordinateFrame::G58 => 5,
            CoordinateFrame::G59 => 6,
        }
    }

    /// Resolve a frame from its 1-based report index
    pub fn from_index(index: u8) -> Option<CoordinateFrame> {
        CoordinateFrame::ALL.get(index.checked_sub(1)? as usize).copied()
    }
}

impl fmt::Display for CoordinateFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gcode())
    }
}

/// Modal interpreter context
///
/// Exactly one coordinate frame is active at any time, and the position is
/// always expressed in the current unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModalContext {
    /// Current unit
    pub unit: Units,
    /// Current distance mode
    pub distance_mode: DistanceMode,
    /// Current working plane
    pub plane: Plane,
    /// Current motion mode
    pub motion_mode: MotionMode,
    /// Active coordinate frame
    pub frame: CoordinateFrame,
    /// Programmed feedrate, units per minute
    pub feedrate: f64,
    /// Selected tool number
    pub tool: u32,
    /// Work position in the active frame
    pub position: Position,
}

/// A partial, device-confirmed context update
///
/// Every field is optional; `ModalContext::apply` merges only the fields the
/// device actually reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalUpdate {
    /// Reported unit
    pub unit: Option<Units>,
    /// Reported distance mode
    pub distance_mode: Option<DistanceMode>,
    /// Reported plane
    pub plane: Option<Plane>,
    /// Reported motion mode
    pub motion_mode: Option<MotionMode>,
    /// Reported active frame
    pub frame: Option<CoordinateFrame>,
    /// Reported feedrate
    pub feedrate: Option<f64>,
    /// Reported tool number
    pub tool: Option<u32>,
    /// Reported work position
    pub position: Option<Position>,
}

impl ModalUpdate {
    /// True when the update carries no field at all
    pub fn is_empty(&self) -> bool {
        *self == ModalUpdate::default()
    }
}

impl ModalContext {
    /// Merge a confirmed device update into the context
    pub fn apply(&mut self, update: &ModalUpdate) {
        if let Some(unit) = update.unit {
            self.unit = unit;
        }
        if let Some(mode) = update.distance_mode {
            self.distance_mode = mode;
        }
        if let Some(plane) = update.plane {
            self.plane = plane;
        }
        if let Some(mode) = update.motion_mode {
            self.motion_mode = mode;
        }
        if let Some(frame) = update.frame {
            self.frame = frame;
        }
        if let Some(feedrate) = update.feedrate {
            self.feedrate = feedrate;
        }
        if let Some(tool) = update.tool {
            self.tool = tool;
        }
        if let Some(position) = update.position {
            self.position = position;
        }
    }
}
