//! Configuration loading (spec §6, §10.3).

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub listen: ListenConfig,
    #[serde(default)]
    pub rooms: RoomConfig,
    #[serde(default)]
    pub durability: DurabilityConfig,
}

/// Server-wide identity and observability knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Prometheus metrics HTTP port. `0` disables the endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            metrics_port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_metrics_port() -> u16 {
    9090
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address the WebSocket gateway binds to (e.g. "0.0.0.0:1999").
    pub address: SocketAddr,
    /// Path prefix rooms are addressed under, e.g. `/rooms` for
    /// `/rooms/<room_id>` (spec §6).
    #[serde(default = "default_room_path_prefix")]
    pub room_path_prefix: String,
}

fn default_room_path_prefix() -> String {
    "/rooms".to_string()
}

/// Room-engine tuning knobs (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Per-connection undo/redo stack cap (spec §4.4).
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Client-side cursor-update throttle. The room engine itself never
    /// throttles (spec §4.5); this is surfaced to clients in the welcome
    /// envelope so they know what cadence the server expects.
    #[serde(default = "default_cursor_throttle_ms")]
    pub cursor_throttle_ms: u64,
    /// Debounce window before a room's durability hook is invoked with a
    /// fresh snapshot (spec §5).
    #[serde(default = "default_flush_debounce_ms")]
    pub flush_debounce_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            cursor_throttle_ms: default_cursor_throttle_ms(),
            flush_debounce_ms: default_flush_debounce_ms(),
        }
    }
}

fn default_history_cap() -> usize {
    100
}

fn default_cursor_throttle_ms() -> u64 {
    50
}

fn default_flush_debounce_ms() -> u64 {
    2000
}

/// Durability-hook backend selection.
#[derive(Debug, Clone, Deserialize)]
pub struct DurabilityConfig {
    /// `"redb"` or `"none"`.
    #[serde(default = "default_durability_backend")]
    pub backend: String,
    #[serde(default = "default_durability_path")]
    pub path: String,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            backend: default_durability_backend(),
            path: default_durability_path(),
        }
    }
}

fn default_durability_backend() -> String {
    "none".to_string()
}

fn default_durability_path() -> String {
    "collabd.redb".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let toml = r#"
            [listen]
            address = "0.0.0.0:1999"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rooms.history_cap, 100);
        assert_eq!(config.rooms.flush_debounce_ms, 2000);
        assert_eq!(config.listen.room_path_prefix, "/rooms");
        assert_eq!(config.durability.backend, "none");
    }

    #[test]
    fn overrides_take_effect() {
        let toml = r#"
            [listen]
            address = "127.0.0.1:2004"
            room_path_prefix = "/r"

            [rooms]
            history_cap = 50

            [durability]
            backend = "redb"
            path = "/tmp/rooms.redb"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rooms.history_cap, 50);
        assert_eq!(config.listen.room_path_prefix, "/r");
        assert_eq!(config.durability.backend, "redb");
    }
}
