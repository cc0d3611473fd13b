//! Firmware implementation for the plain-text protocol family
//!
//! Devices of this family have no queue-depth report, so planner buffer
//! checking is forced off and flow control runs purely on the
//! one-credit-per-acknowledgment model. Homing is the `$H` cycle, axis
//! zeroing rewrites the active frame with `G10 L20`, probing is `G38.2`.

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
use protocol::LineProtocol;
use std::sync::Arc;

/// Streaming service for plain-text-protocol devices
pub struct GrblService {
    session: StreamingSession,
}

impl GrblService {
    /// Build the service over a transport
    pub fn new(transport: Arc<dyn Transport>, config: StreamingConfig) -> Self {
        let config = StreamingConfig {
            // No queue-depth report exists in this protocol
            planner_buffer_check: false,
            ..config
        };
        let session = StreamingSession::new(transport, Arc::new(LineProtocol::new()), config);
        Self { session }
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

    /// `G10 L20` rewrite of the active frame so the listed axes read zero;
    /// an empty list zeroes the linear axes
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
        format!("G10 L20 P0{words}")
    }
}

#[async_trait]
impl FirmwareService for GrblService {
    fn name(&self) -> &str {
        "grbl"
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
        // The homing cycle and its axis mask are configured on the device
        self.session.submit(vec!["$H".to_string()])
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
        let words: String = [Axis::X, Axis::Y, Axis::Z]
            .iter()
            .map(|&axis| format!(" {}{}", axis.letter(), gcode_number(position.get(axis))))
            .collect();
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
