//! Line-oriented wire protocol
//!
//! Commands go out as plain text lines; the device answers `ok` or
//! `error:N` per command. Status arrives as angle-bracket reports
//! (`<Run|WPos:...|FS:...>`), probe results and offset/parser-state dumps as
//! square-bracket messages, and single realtime bytes drive hold, resume,
//! status queries and buffer flush.

use crate::protocol::{DeviceResponse, ProtocolAdapter, StatusUpdate};
use motionkit_core::{
    CoordinateFrame, DistanceMode, MachineState, ModalUpdate, MotionMode, Plane, Position,
    SpindleState, Units,
};

/// Adapter for the plain-text firmware family
#[derive(Debug, Default)]
pub struct LineProtocol;

impl LineProtocol {
    /// Create the adapter
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolAdapter for LineProtocol {
    fn encode(&self, command: &str) -> Vec<u8> {
        let mut bytes = command.as_bytes().to_vec();
        bytes.push(b'\n');
        bytes
    }

    fn decode(&self, line: &str) -> DeviceResponse {
        let line = line.trim();
        if line.is_empty() {
            return DeviceResponse::Unrecognized;
        }
        if line == "ok" {
            return DeviceResponse::Ack;
        }
        if let Some(code) = line.strip_prefix("error:") {
            return match code.trim().parse::<u16>() {
                Ok(code) => DeviceResponse::CommandError {
                    code,
                    message: String::new(),
                },
                Err(_) => DeviceResponse::Unrecognized,
            };
        }
        if let Some(code) = line.strip_prefix("ALARM:") {
            tracing::warn!("Device alarm {code}");
            return DeviceResponse::Status(StatusUpdate {
                state: Some(MachineState::Alarm),
                ..Default::default()
            });
        }
        if let Some(body) = line.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            return decode_status(body);
        }
        if let Some(body) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return decode_bracket(body);
        }
        if line.starts_with("Grbl") || line.starts_with('$') {
            return DeviceResponse::Info(line.to_string());
        }
        DeviceResponse::Unrecognized
    }

    fn status_query(&self) -> Vec<u8> {
        b"?".to_vec()
    }

    fn feed_hold(&self) -> Vec<u8> {
        b"!".to_vec()
    }

    fn cycle_start(&self) -> Vec<u8> {
        b"~".to_vec()
    }

    fn queue_flush(&self) -> Vec<u8> {
        // Ctrl-X soft reset empties the planner and input buffers
        vec![0x18]
    }
}

fn decode_state(name: &str) -> MachineState {
    // Sub-states like "Hold:0" carry a qualifier after the colon
    match name.split(':').next().unwrap_or(name) {
        "Idle" => MachineState::Ready,
        "Run" | "Jog" => MachineState::MotionRunning,
        "Hold" | "Door" => MachineState::MotionHold,
        "Home" => MachineState::Homing,
        "Alarm" => MachineState::Alarm,
        "Check" => MachineState::Ready,
        _ => MachineState::Undefined,
    }
}

fn parse_triplet(value: &str) -> Option<Position> {
    let mut parts = value.split(',').map(str::trim).map(str::parse::<f64>);
    Some(Position::linear(
        parts.next()?.ok()?,
        parts.next()?.ok()?,
        parts.next()?.ok()?,
    ))
}

fn decode_status(body: &str) -> DeviceResponse {
    let mut fields = body.split('|');
    let Some(state) = fields.next() else {
        return DeviceResponse::Unrecognized;
    };
    let mut update = StatusUpdate {
        state: Some(decode_state(state)),
        ..Default::default()
    };
    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key {
            "MPos" => update.machine_position = parse_triplet(value),
            "WPos" => update.work_position = parse_triplet(value),
            "FS" => {
                // Feed and spindle speed; only the feed component is velocity
                update.velocity = value
                    .split(',')
                    .next()
                    .and_then(|feed| feed.trim().parse().ok());
            }
            "F" => update.velocity = value.trim().parse().ok(),
            _ => {}
        }
    }
    DeviceResponse::Status(update)
}

fn decode_bracket(body: &str) -> DeviceResponse {
    if let Some(value) = body.strip_prefix("PRB:") {
        // [PRB:1.000,2.000,3.000:1]
        let (coords, flag) = match value.rsplit_once(':') {
            Some(parts) => parts,
            None => (value, "0"),
        };
        let Some(position) = parse_triplet(coords) else {
            return DeviceResponse::Unrecognized;
        };
        return DeviceResponse::ProbeReport {
            triggered: flag.trim() == "1",
            position,
        };
    }
    if let Some(value) = body.strip_prefix("GC:") {
        return DeviceResponse::Status(StatusUpdate {
            modal: decode_parser_state(value),
            spindle: decode_spindle_word(value),
            ..Default::default()
        });
    }
    for frame in CoordinateFrame::ALL {
        if let Some(value) = body.strip_prefix(&format!("{}:", frame.gcode())) {
            let Some(offset) = parse_triplet(value) else {
                return DeviceResponse::Unrecognized;
            };
            return DeviceResponse::Status(StatusUpdate {
                confirmed_offset: Some((frame, offset)),
                ..Default::default()
            });
        }
    }
    DeviceResponse::Info(body.to_string())
}

/// Spindle word from a `[GC:...]` parser-state dump
fn decode_spindle_word(value: &str) -> Option<SpindleState> {
    value.split_whitespace().find_map(|word| match word {
        "M3" | "M4" => Some(SpindleState::On),
        "M5" => Some(SpindleState::Off),
        _ => None,
    })
}

/// Modal words from a `[GC:...]` parser-state dump
fn decode_parser_state(value: &str) -> ModalUpdate {
    let mut modal = ModalUpdate::default();
    for word in value.split_whitespace() {
        match word {
            "G0" => modal.motion_mode = Some(MotionMode::Rapid),
            "G1" => modal.motion_mode = Some(MotionMode::Linear),
            "G2" => modal.motion_mode = Some(MotionMode::ArcCw),
            "G3" => modal.motion_mode = Some(MotionMode::ArcCcw),
            "G17" => modal.plane = Some(Plane::Xy),
            "G18" => modal.plane = Some(Plane::Zx),
            "G19" => modal.plane = Some(Plane::Yz),
            "G20" => modal.unit = Some(Units::INCH),
            "G21" => modal.unit = Some(Units::MM),
            "G90" => modal.distance_mode = Some(DistanceMode::Absolute),
            "G91" => modal.distance_mode = Some(DistanceMode::Incremental),
            _ => {
                if let Some(frame) = CoordinateFrame::ALL
                    .into_iter()
                    .find(|frame| frame.gcode() == word)
                {
                    modal.frame = Some(frame);
                } else if let Some(feed) = word.strip_prefix('F') {
                    modal.feedrate = feed.parse().ok();
                } else if let Some(tool) = word.strip_prefix('T') {
                    modal.tool = tool.parse().ok();
                }
            }
        }
    }
    modal
}
