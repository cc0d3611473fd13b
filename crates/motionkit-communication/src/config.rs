//! Streaming configuration
//!
//! Inputs consumed but not owned by the core. An external configuration
//! collaborator (preferences store, CLI, test harness) builds one of these
//! and hands it to the session at start.

use serde::{Deserialize, Serialize};

/// Per-axis homing enablement
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HomingConfig {
    /// Home the X axis during the homing cycle
    pub x: bool,
    /// Home the Y axis during the homing cycle
    pub y: bool,
    /// Home the Z axis during the homing cycle
    pub z: bool,
    /// Home the A axis during the homing cycle
    pub a: bool,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            x: true,
            y: true,
            z: true,
            a: false,
        }
    }
}

/// Configuration for one streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Commands the device buffer accepts when empty, used as the initial
    /// buffer credit until the device reports otherwise
    pub buffer_capacity: usize,
    /// Interval between status / queue-depth polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Whether device-side flow control is enabled; streaming is refused
    /// when it is not
    pub flow_control: bool,
    /// Whether planner buffer space is checked via queue-depth reports
    pub planner_buffer_check: bool,
    /// Per-axis homing enablement
    pub homing: HomingConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 28,
            poll_interval_ms: 200,
            flow_control: true,
            planner_buffer_check: true,
            homing: HomingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_streams() {
        let config = StreamingConfig::default();
        assert!(config.flow_control);
        assert!(config.buffer_capacity > 0);
        assert!(config.homing.x && !config.homing.a);
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = StreamingConfig {
            buffer_capacity: 4,
            poll_interval_ms: 50,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: StreamingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.buffer_capacity, 4);
        assert_eq!(back.poll_interval_ms, 50);
    }
}
