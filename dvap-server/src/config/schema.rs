//! Configuration schema structs

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dvap_utils::{DvapError, Result};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub websocket: WebSocketConfig,
    pub events: EventsConfig,
}

/// WebSocket broadcast settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Interface to listen on (default: 127.0.0.1)
    pub host: String,
    /// Port to listen on; 0 picks a free port (default: 9000)
    pub port: u16,
    /// Broadcast cadence in milliseconds (default: 50)
    pub tick_interval_ms: u64,
    /// Bytes read per socket per pass (default: 4096)
    pub read_buffer_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9000,
            tick_interval_ms: 50,
            read_buffer_size: 4096,
        }
    }
}

impl WebSocketConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub async fn socket_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.port).await
    }
}

/// Server-Sent-Events notification stream settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Serve the event stream (default: true)
    pub enabled: bool,
    /// Interface to listen on (default: 127.0.0.1)
    pub host: String,
    /// Port to listen on; 0 picks a free port (default: 8000)
    pub port: u16,
    /// Delay between queue polls per stream in milliseconds (default: 50)
    pub poll_interval_ms: u64,
    /// Notifications kept before the oldest is dropped (default: 1024)
    pub max_queued: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 8000,
            poll_interval_ms: 50,
            max_queued: 1024,
        }
    }
}

impl EventsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub async fn socket_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.port).await
    }
}

/// Resolve off the runtime threads; hostnames may need a DNS round trip
async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| DvapError::InvalidAddress(format!("{}:{}", host, port)))?
        .next()
        .ok_or_else(|| DvapError::InvalidAddress(format!("{}:{}", host, port)))
}
