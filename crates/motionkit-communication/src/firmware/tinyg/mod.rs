//! Firmware implementation for the JSON protocol family
//!
//! Devices of this family acknowledge every command with a response envelope
//! and advertise planner buffer depth through queue reports, so the session
//! runs with planner buffer checking on. Homing is the `G28.2` cycle, axis
//! zeroing is `G28.3`, probing is `G38.2`.

pub mod protocol;

use super::{gcode_number, FirmwareService};
use crate::config::StreamingConfig;
use crate::offsets::CoordinateOffsetTable;
use crate::probing::ProbeHandle;
use crate::session::StreamingSession;
use crate::transport::Transport;
use async_trait::async_trait;
use motionkit_core::{
    Axis, CoordinateFrame, DistanceMode, MachineState, MachineValueStore, ModalContext, Position,
    Result, SessionEventBus, TokenId,
};
use protocol::JsonProtocol;
use std::sync::Arc;

/// Streaming service for JSON-protocol devices
pub struct TinygService {
    session: StreamingSession,
    config: StreamingConfig,
}

impl TinygService {
    /// Build the service over a transport
    pub fn new(transport: Arc<dyn Transport>, config: StreamingConfig) -> Self {
        let session =
            StreamingSession::new(transport, Arc::new(JsonProtocol::new()), config.clone());
        Self { session, config }
    }

    fn axis_words(position: Position, axes: &[Axis]) -> String {
        axes.iter()
            .map(|&axis| format!(" {}{}", axis.letter(), gcode_number(position.get(axis))))
            .collect()
    }

    fn enabled_homing_axes(&self) -> Vec<Axis> {
        let homing = self.config.homing;
        [
            (Axis::X, homing.x),
            (Axis::Y, homing.y),
            (Axis::Z, homing.z),
            (Axis::A, homing.a),
        ]
        .into_iter()
        .filter_map(|(axis, enabled)| enabled.then_some(axis))
        .collect()
    }

    fn offset_command(frame: CoordinateFrame, offset: Position) -> String {
        format!(
            "G10 L2 P{} X{} Y{} Z{}",
            frame.index(),
            gcode_number(offset.x),
            gcode_number(offset.y),
            gcode_number(offset.z),
        )
    }

    fn offsets(&self) -> Arc<CoordinateOffsetTable> {
        self.session.offsets()
    }

    /// `G28.3` for the given axes; an empty list zeroes the linear axes
    fn zero_command(axes: &[Axis]) -> String {
        let axes = if axes.is_empty() {
            &[Axis::X, Axis::Y, Axis::Z][..]
        } else {
            axes
        };
        let words: String = axes
            .iter()
            .map(|axis| format!(" {}0", axis.letter()))
            .collect();
        format!("G28.3{words}")
    }
}

#[async_trait]
impl FirmwareService for TinygService {
    fn name(&self) -> &str {
        "tinyg"
    }

    async fn start(&self) -> Result<()> {
        self.session.start();
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.session.shutdown();
        Ok(())
    }

    fn submit(&self, commands: Vec<String>) -> Result<TokenId> {
        self.session.submit(commands)
    }

    fn pause(&self, paused: bool) -> Result<()> {
        self.session.pause(paused)
    }

    fn stop_motion(&self) -> Result<()> {
        self.session.stop()
    }

    fn resume(&self) -> Result<()> {
        self.session.resume()
    }

    fn probe(&self, axis: Axis, feedrate: f64, target: f64) -> Result<ProbeHandle> {
        let handle = self.session.begin_probe()?;
        let command = format!(
            "G38.2 {}{} F{}",
            axis.letter(),
            gcode_number(target),
            gcode_number(feedrate),
        );
        if let Err(err) = self.session.submit(vec![command]) {
            // The probe command never entered the queue
            self.session.cancel_probe();
            return Err(err);
        }
        Ok(handle)
    }

    fn offset(&self, frame: CoordinateFrame) -> Position {
        self.offsets().get(frame)
    }

    fn set_offset(&self, frame: CoordinateFrame, offset: Position) -> Result<TokenId> {
        let token = self
            .session
            .submit(vec![Self::offset_command(frame, offset)])?;
        self.offsets().set_local(frame, offset);
        Ok(token)
    }

    fn select_frame(&self, frame: CoordinateFrame) -> Result<TokenId> {
        self.session.submit(vec![frame.gcode().to_string()])
    }

    fn reset_current_frame(&self) -> Result<TokenId> {
        let context = self.session.context();
        let active = context.frame;
        let zeroing =
            CoordinateOffsetTable::zeroing_offset(context.position, self.offsets().get(active));
        let token = self
            .session
            .submit(vec![Self::offset_command(active, zeroing)])?;
        self.offsets().set_local(active, zeroing);
        Ok(token)
    }

    fn home(&self) -> Result<TokenId> {
        let axes = self.enabled_homing_axes();
        let words: String = axes
            .iter()
            .map(|axis| format!(" {}0", axis.letter()))
            .collect();
        self.session.submit(vec![format!("G28.2{words}")])
    }

    fn jog(&self, axis: Axis, distance: f64, feedrate: f64) -> Result<TokenId> {
        let mut commands = vec![
            "G91".to_string(),
            format!(
                "G1 {}{} F{}",
                axis.letter(),
                gcode_number(distance),
                gcode_number(feedrate),
            ),
        ];
        // Put the interpreter back the way the running program expects it
        if self.session.context().distance_mode == DistanceMode::Absolute {
            commands.push("G90".to_string());
        }
        self.session.submit(commands)
    }

    fn spindle_on(&self) -> Result<TokenId> {
        self.session.submit(vec!["M3".to_string()])
    }

    fn spindle_off(&self) -> Result<TokenId> {
        self.session.submit(vec!["M5".to_string()])
    }

    fn zero_axes(&self, axes: &[Axis]) -> Result<TokenId> {
        self.session.submit(vec![Self::zero_command(axes)])
    }

    fn move_to(&self, position: Position, feedrate: f64) -> Result<TokenId> {
        let words = Self::axis_words(position, &[Axis::X, Axis::Y, Axis::Z]);
        let mut commands = vec![
            "G90".to_string(),
            format!("G1{words} F{}", gcode_number(feedrate)),
        ];
        if self.session.context().distance_mode == DistanceMode::Incremental {
            commands.push("G91".to_string());
        }
        self.session.submit(commands)
    }

    fn machine_state(&self) -> MachineState {
        self.session.values().machine_state()
    }

    fn values(&self) -> Arc<MachineValueStore> {
        self.session.values()
    }

    fn context(&self) -> ModalContext {
        self.session.context()
    }

    fn events(&self) -> Arc<SessionEventBus> {
        self.session.events()
    }

    fn on_line(&self, line: &str) {
        self.session.on_line(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use motionkit_core::{ControllerError, Error};

    fn service() -> (TinygService, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let service = TinygService::new(transport.clone(), StreamingConfig::default());
        (service, transport)
    }

    #[test]
    fn test_homing_command_respects_axis_config() {
        let transport = Arc::new(RecordingTransport::new());
        let config = StreamingConfig {
            homing: crate::config::HomingConfig {
                x: true,
                y: false,
                z: true,
                a: false,
            },
            ..Default::default()
        };
        let service = TinygService::new(transport, config);
        let axes = service.enabled_homing_axes();
        assert_eq!(axes, vec![Axis::X, Axis::Z]);
    }

    #[test]
    fn test_zero_command_defaults_to_linear_axes() {
        assert_eq!(TinygService::zero_command(&[]), "G28.3 X0 Y0 Z0");
        assert_eq!(TinygService::zero_command(&[Axis::Z]), "G28.3 Z0");
        assert_eq!(
            TinygService::zero_command(&[Axis::X, Axis::A]),
            "G28.3 X0 A0"
        );
    }

    #[test]
    fn test_offset_command_format() {
        let command =
            TinygService::offset_command(CoordinateFrame::G55, Position::linear(7.0, 2.5, 0.0));
        assert_eq!(command, "G10 L2 P2 X7 Y2.5 Z0");
    }

    #[test]
    fn test_probe_conflict_rejected_before_submit() {
        let (service, _transport) = service();
        let _first = service.probe(Axis::Z, 50.0, -10.0).unwrap();
        match service.probe(Axis::Z, 50.0, -10.0) {
            Err(Error::Controller(ControllerError::ProbeAlreadyPending)) => {}
            other => panic!("Expected ProbeAlreadyPending, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_jog_holds_and_flushes() {
        let (service, transport) = service();
        service.stop_jog().unwrap();
        assert_eq!(transport.written_lines(), vec!["!", "%"]);
    }

    #[test]
    fn test_submit_refused_when_disconnected() {
        let (service, transport) = service();
        transport.set_connected(false);
        match service.submit(vec!["G0 X1".to_string()]) {
            Err(Error::Controller(ControllerError::NotConnected)) => {}
            other => panic!("Expected NotConnected, got {other:?}"),
        }
    }
}
