// Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-level settings for the relay client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay WebSocket endpoints, tried in order
    pub relay_urls: Vec<String>,

    /// Join a room channel instead of the plain user channel
    pub room: Option<String>,

    /// Deadline for a pushed event to be acknowledged
    pub push_timeout_secs: u64,

    /// Deadline for the channel join acknowledgment. When it elapses the
    /// join is logged as timed out but not failed.
    pub join_timeout_secs: u64,

    /// Socket keepalive interval
    pub heartbeat_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_urls: Vec::new(),
            room: None,
            push_timeout_secs: 10,
            join_timeout_secs: 10,
            heartbeat_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}
