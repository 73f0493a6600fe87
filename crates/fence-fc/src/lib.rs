pub mod mav;
pub mod modes;
pub mod safety;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// Autopilot endpoint: "udp:host:port", "udpout:host:port",
    /// "tcp:host:port" or "serial:/dev/ttyX:baud".
    pub connection: String,

    /// MAVLink ids we use (ground side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (FC side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// Deadline for heartbeat and first position fix during connect. Default 30s.
    pub connect_timeout_ms: Option<u64>,

    /// Telemetry interval requested from the autopilot. Default 1s.
    pub stream_interval_us: Option<u32>,

    /// Our own heartbeat send rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,

    /// Minimum spacing between mode-change commands. Default 2s.
    pub mode_command_interval_ms: Option<u64>,
}
