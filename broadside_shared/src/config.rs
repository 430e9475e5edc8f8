//! Configuration system.
//!
//! Loads server configuration from JSON strings/files (file IO left to app).
//! Only the listen port is meant to be operator-facing; the remaining knobs
//! exist so tests can shorten timers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::DEFAULT_MAX_FRAME_BYTES;

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:3001`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Delay between firing and cannons becoming loaded again.
    #[serde(default = "default_reload_ms")]
    pub reload_ms: u64,
    /// Period of the wind drift tick.
    #[serde(default = "default_wind_period_ms")]
    pub wind_period_ms: u64,
    /// Per-session outbound queue depth before events are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Largest inbound frame accepted.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

pub const DEFAULT_PORT: u16 = 3001;

fn default_listen_addr() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

fn default_reload_ms() -> u64 {
    3000
}

fn default_wind_period_ms() -> u64 {
    30_000
}

fn default_outbound_queue() -> usize {
    256
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            reload_ms: default_reload_ms(),
            wind_period_ms: default_wind_period_ms(),
            outbound_queue: default_outbound_queue(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON and checks the timer fields.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        if cfg.wind_period_ms == 0 {
            anyhow::bail!("wind_period_ms must be at least 1");
        }
        Ok(cfg)
    }

    /// Replaces the port of `listen_addr`, keeping the host.
    pub fn set_port(&mut self, port: u16) {
        let host = self
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        self.listen_addr = format!("{host}:{port}");
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_ms)
    }

    /// Never zero; a zero period would make the clock interval panic.
    pub fn wind_period(&self) -> Duration {
        Duration::from_millis(self.wind_period_ms.max(1))
    }
}
