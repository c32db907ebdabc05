use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Streaming settings, read from a TOML file. Every key is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Collector URL, e.g. `http://127.0.0.1:56078`.
    pub collector_address: String,
    /// Player id sent with every update. Blank means "use the session id".
    pub player_id: Option<String>,
    /// Aggregator tick.
    pub poll_interval_ms: u64,
    /// Longest quiet stretch before an unchanged record is sent again.
    pub heartbeat_interval_ms: u64,
    /// HTTP/2 keep-alive ping interval.
    pub keep_alive_interval_ms: u64,
    /// Keep-alive ack timeout.
    pub keep_alive_timeout_ms: u64,
    /// Outbound messages buffered per stream session.
    pub send_buffer: usize,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            collector_address: "http://127.0.0.1:56078".to_string(),
            player_id: None,
            poll_interval_ms: 250,
            heartbeat_interval_ms: 1_000,
            keep_alive_interval_ms: 5_000,
            keep_alive_timeout_ms: 3_000,
            send_buffer: 32,
        }
    }
}

impl StreamerConfig {
    /// Reads a TOML file; missing keys take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: StreamerConfig = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Configured player id, or `session_id` when none is set.
    pub fn resolve_player_id(&self, session_id: &str) -> String {
        match self.player_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => session_id.to_string(),
        }
    }

    /// Aggregator tick.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Keep-alive ping interval.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// Keep-alive ack timeout.
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }
}
