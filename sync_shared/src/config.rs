//! Configuration system.
//!
//! Loads client configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

use crate::movement::SyncMode;

/// Root client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Account name sent at login.
    #[serde(default = "default_username")]
    pub username: String,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Outbound ring buffer size in bytes.
    #[serde(default = "default_send_buffer_size")]
    pub send_buffer_size: usize,
    /// Foreground tick rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Ping cadence in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: f32,
    /// Interval of movement upload to the server, in seconds.
    #[serde(default = "default_upload_interval")]
    pub upload_interval: f32,
    #[serde(default)]
    pub movement: MovementConfig,
}

/// Movement reconciliation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Strategy for simulated entities.
    pub mode: SyncMode,
    /// Interval of movement sync from the server, in seconds.
    pub sync_interval: f32,
    /// Position divergence beyond which blending correction starts.
    pub correction_distance: f32,
    /// Position divergence beyond which the pose snaps outright.
    pub hard_snap_distance: f32,
    /// Yaw divergence (degrees) beyond which blending correction starts.
    pub correction_rotation: f32,
    /// Yaw divergence (degrees) beyond which rotation snaps outright.
    pub hard_snap_rotation: f32,
    /// Forward-extrapolate rotation by RTT. Off by default: human-driven
    /// turning changes too fast for the prediction to be worth much.
    pub predict_rotation: bool,
    /// Pin predicted pitch to zero each tick instead of letting the
    /// angular-velocity integration tilt the character.
    pub clamp_prediction_pitch: bool,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Interpolate,
            sync_interval: 0.1,
            correction_distance: 1.0,
            hard_snap_distance: 3.0,
            correction_rotation: 30.0,
            hard_snap_rotation: 90.0,
            predict_rotation: false,
            clamp_prediction_pitch: true,
        }
    }
}

fn default_username() -> String {
    "Player".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_send_buffer_size() -> usize {
    64 * 1024
}

fn default_tick_hz() -> u32 {
    60
}

fn default_ping_interval() -> f32 {
    1.0
}

fn default_upload_interval() -> f32 {
    1.0 / 30.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            username: default_username(),
            connect_timeout_ms: default_connect_timeout_ms(),
            send_buffer_size: default_send_buffer_size(),
            tick_hz: default_tick_hz(),
            ping_interval: default_ping_interval(),
            upload_interval: default_upload_interval(),
            movement: MovementConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = ClientConfig::from_json_str(
            r#"{"server_addr": "10.0.0.1:5000", "movement": {"mode": "predict", "sync_interval": 0.05, "correction_distance": 1.0, "hard_snap_distance": 3.0, "correction_rotation": 30.0, "hard_snap_rotation": 90.0, "predict_rotation": false, "clamp_prediction_pitch": true}}"#,
        )
        .unwrap();
        assert_eq!(cfg.server_addr, "10.0.0.1:5000");
        assert_eq!(cfg.username, "Player");
        assert_eq!(cfg.movement.mode, SyncMode::Predict);
        assert_eq!(cfg.movement.sync_interval, 0.05);
    }
}
