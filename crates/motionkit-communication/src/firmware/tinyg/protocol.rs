//! JSON wire protocol
//!
//! Commands go out wrapped in a `{"gc":...}` object; the device answers with
//! response envelopes carrying a footer status code, plus unsolicited status
//! (`sr`), queue (`qr`) and probe (`prb`) reports. Offset confirmations
//! arrive as `{"g54":{...}}`..`{"g59":{...}}` objects.

use crate::protocol::{DeviceResponse, ProtocolAdapter, StatusUpdate};
use motionkit_core::{
    CoordinateFrame, DistanceMode, MachineState, ModalUpdate, MotionMode, Plane, Position,
    SpindleState, Units,
};
use serde_json::{json, Value};

/// Adapter for the JSON-speaking firmware family
#[derive(Debug, Default)]
pub struct JsonProtocol;

impl JsonProtocol {
    /// Create the adapter
    pub fn new() -> Self {
        Self
    }

    fn decode_object(&self, value: &Value) -> DeviceResponse {
        if let Some(report) = value.get("prb") {
            return decode_probe(report);
        }
        if let Some(depth) = value.get("qr").and_then(Value::as_u64) {
            return DeviceResponse::QueueReport(depth as usize);
        }
        if let Some(report) = value.get("sr") {
            return DeviceResponse::Status(decode_status(report));
        }
        if let Some(offset) = decode_offset(value) {
            return DeviceResponse::Status(StatusUpdate {
                confirmed_offset: Some(offset),
                ..Default::default()
            });
        }
        if let Some(report) = value.get("er") {
            return DeviceResponse::CommandError {
                code: report.get("st").and_then(Value::as_u64).unwrap_or(0) as u16,
                message: report
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
        }
        if let Some(body) = value.get("r") {
            // Reports can also arrive inside a response envelope
            if let Some(report) = body.get("prb") {
                return decode_probe(report);
            }
            if let Some(depth) = body.get("qr").and_then(Value::as_u64) {
                return DeviceResponse::QueueReport(depth as usize);
            }
            if let Some(report) = body.get("sr") {
                return DeviceResponse::Status(decode_status(report));
            }
            if let Some(offset) = decode_offset(body) {
                return DeviceResponse::Status(StatusUpdate {
                    confirmed_offset: Some(offset),
                    ..Default::default()
                });
            }
            // Footer: [revision, status, bytes-available]
            let status = value
                .get("f")
                .and_then(|f| f.get(1))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            return if status == 0 {
                DeviceResponse::Ack
            } else {
                DeviceResponse::CommandError {
                    code: status as u16,
                    message: String::new(),
                }
            };
        }
        DeviceResponse::Unrecognized
    }
}

impl ProtocolAdapter for JsonProtocol {
    fn encode(&self, command: &str) -> Vec<u8> {
        let mut bytes = json!({ "gc": command }).to_string().into_bytes();
        bytes.push(b'\n');
        bytes
    }

    fn decode(&self, line: &str) -> DeviceResponse {
        let line = line.trim();
        if line.is_empty() {
            return DeviceResponse::Unrecognized;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) if value.is_object() => self.decode_object(&value),
            Ok(_) => DeviceResponse::Unrecognized,
            Err(_) => DeviceResponse::Unrecognized,
        }
    }

    fn status_query(&self) -> Vec<u8> {
        b"{\"sr\":null}\n".to_vec()
    }

    fn queue_depth_query(&self) -> Option<Vec<u8>> {
        Some(b"{\"qr\":null}\n".to_vec())
    }

    fn feed_hold(&self) -> Vec<u8> {
        b"!".to_vec()
    }

    fn cycle_start(&self) -> Vec<u8> {
        b"~".to_vec()
    }

    fn queue_flush(&self) -> Vec<u8> {
        b"%".to_vec()
    }
}

/// Device numeric states, per the firmware's `stat` enumeration
fn decode_state(stat: u64) -> MachineState {
    match stat {
        0 => MachineState::Undefined,
        1 => MachineState::Ready,
        2 => MachineState::Alarm,
        3 => MachineState::ProgramStop,
        4 => MachineState::ProgramEnd,
        5 => MachineState::MotionRunning,
        6 => MachineState::MotionHold,
        9 => MachineState::Homing,
        _ => MachineState::Undefined,
    }
}

fn decode_status(report: &Value) -> StatusUpdate {
    let mut update = StatusUpdate::default();
    let num = |key: &str| report.get(key).and_then(Value::as_f64);

    if let Some(stat) = report.get("stat").and_then(Value::as_u64) {
        update.state = Some(decode_state(stat));
    }
    update.velocity = num("vel");
    if let Some(spe) = report.get("spe").and_then(Value::as_u64) {
        update.spindle = Some(if spe == 0 {
            SpindleState::Off
        } else {
            SpindleState::On
        });
    }

    let work = [num("posx"), num("posy"), num("posz"), num("posa")];
    if work.iter().any(Option::is_some) {
        update.work_position = Some(Position {
            x: work[0].unwrap_or(0.0),
            y: work[1].unwrap_or(0.0),
            z: work[2].unwrap_or(0.0),
            a: work[3].unwrap_or(0.0),
            ..Position::ZERO
        });
    }
    let machine = [num("mpox"), num("mpoy"), num("mpoz"), num("mpoa")];
    if machine.iter().any(Option::is_some) {
        update.machine_position = Some(Position {
            x: machine[0].unwrap_or(0.0),
            y: machine[1].unwrap_or(0.0),
            z: machine[2].unwrap_or(0.0),
            a: machine[3].unwrap_or(0.0),
            ..Position::ZERO
        });
    }

    let mut modal = ModalUpdate::default();
    if let Some(coor) = report.get("coor").and_then(Value::as_u64) {
        modal.frame = CoordinateFrame::from_index(coor as u8);
    }
    if let Some(unit) = report.get("unit").and_then(Value::as_u64) {
        modal.unit = Some(if unit == 0 { Units::INCH } else { Units::MM });
    }
    if let Some(dist) = report.get("dist").and_then(Value::as_u64) {
        modal.distance_mode = Some(if dist == 0 {
            DistanceMode::Absolute
        } else {
            DistanceMode::Incremental
        });
    }
    if let Some(momo) = report.get("momo").and_then(Value::as_u64) {
        modal.motion_mode = match momo {
            0 => Some(MotionMode::Rapid),
            1 => Some(MotionMode::Linear),
            2 => Some(MotionMode::ArcCw),
            3 => Some(MotionMode::ArcCcw),
            _ => None,
        };
    }
    if let Some(plan) = report.get("plan").and_then(Value::as_u64) {
        modal.plane = match plan {
            0 => Some(Plane::Xy),
            1 => Some(Plane::Zx),
            2 => Some(Plane::Yz),
            _ => None,
        };
    }
    modal.feedrate = num("feed");
    update.modal = modal;
    update
}

fn decode_probe(report: &Value) -> DeviceResponse {
    let num = |key: &str| report.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    DeviceResponse::ProbeReport {
        triggered: report.get("e").and_then(Value::as_u64) == Some(1),
        position: Position::linear(num("x"), num("y"), num("z")),
    }
}

fn decode_offset(value: &Value) -> Option<(CoordinateFrame, Position)> {
    for frame in CoordinateFrame::ALL {
        if let Some(report) = value.get(frame.gcode().to_ascii_lowercase()) {
            let num = |key: &str| report.get(key).and_then(Value::as_f64).unwrap_or(0.0);
            return Some((frame, Position::linear(num("x"), num("y"), num("z"))));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wraps_command() {
        let protocol = JsonProtocol::new();
        assert_eq!(protocol.encode("G0 X1"), b"{\"gc\":\"G0 X1\"}\n".to_vec());
    }

    #[test]
    fn test_decode_ack_and_error_from_footer() {
        let protocol = JsonProtocol::new();
        assert_eq!(
            protocol.decode(r#"{"r":{},"f":[1,0,10]}"#),
            DeviceResponse::Ack
        );
        assert_eq!(
            protocol.decode(r#"{"r":{},"f":[1,20,10]}"#),
            DeviceResponse::CommandError {
                code: 20,
                message: String::new()
            }
        );
    }

    #[test]
    fn test_decode_queue_report() {
        let protocol = JsonProtocol::new();
        assert_eq!(
            protocol.decode(r#"{"qr":17}"#),
            DeviceResponse::QueueReport(17)
        );
        assert_eq!(
            protocol.decode(r#"{"r":{"qr":28},"f":[1,0,10]}"#),
            DeviceResponse::QueueReport(28)
        );
    }

    #[test]
    fn test_decode_status_report() {
        let protocol = JsonProtocol::new();
        let line = r#"{"sr":{"stat":5,"vel":812.5,"posx":1.5,"posy":2.0,"posz":-0.5,"coor":2,"unit":1,"dist":0,"momo":1,"spe":1}}"#;
        match protocol.decode(line) {
            DeviceResponse::Status(update) => {
                assert_eq!(update.state, Some(MachineState::MotionRunning));
                assert_eq!(update.velocity, Some(812.5));
                assert_eq!(update.work_position, Some(Position::linear(1.5, 2.0, -0.5)));
                assert_eq!(update.spindle, Some(SpindleState::On));
                assert_eq!(update.modal.frame, Some(CoordinateFrame::G55));
                assert_eq!(update.modal.unit, Some(Units::MM));
                assert_eq!(update.modal.distance_mode, Some(DistanceMode::Absolute));
                assert_eq!(update.modal.motion_mode, Some(MotionMode::Linear));
            }
            other => panic!("Expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_spindle_disable() {
        let protocol = JsonProtocol::new();
        match protocol.decode(r#"{"sr":{"spe":0}}"#) {
            DeviceResponse::Status(update) => {
                assert_eq!(update.spindle, Some(SpindleState::Off));
            }
            other => panic!("Expected status, got {other:?}"),
        }
        // Reports without the field leave the spindle untouched
        match protocol.decode(r#"{"sr":{"vel":0.0}}"#) {
            DeviceResponse::Status(update) => assert_eq!(update.spindle, None),
            other => panic!("Expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_probe_report() {
        let protocol = JsonProtocol::new();
        assert_eq!(
            protocol.decode(r#"{"prb":{"e":1,"x":10.0,"y":0.0,"z":-2.5}}"#),
            DeviceResponse::ProbeReport {
                triggered: true,
                position: Position::linear(10.0, 0.0, -2.5)
            }
        );
    }

    #[test]
    fn test_decode_offset_confirmation() {
        let protocol = JsonProtocol::new();
        match protocol.decode(r#"{"r":{"g55":{"x":7.0,"y":2.0,"z":0.0}},"f":[1,0,10]}"#) {
            DeviceResponse::Status(update) => {
                assert_eq!(
                    update.confirmed_offset,
                    Some((CoordinateFrame::G55, Position::linear(7.0, 2.0, 0.0)))
                );
            }
            other => panic!("Expected offset status, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_lines_are_unrecognized() {
        let protocol = JsonProtocol::new();
        assert_eq!(protocol.decode("{\"sr\":"), DeviceResponse::Unrecognized);
        assert_eq!(protocol.decode("garbage"), DeviceResponse::Unrecognized);
        assert_eq!(protocol.decode(""), DeviceResponse::Unrecognized);
        assert_eq!(protocol.decode("[1,2,3]"), DeviceResponse::Unrecognized);
    }
}
