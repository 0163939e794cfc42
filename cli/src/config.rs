// Configuration management for the Sotto CLI
//
// Cross-platform config stored in:
// - macOS/Linux: ~/.config/sotto/config.json
// - Windows: %APPDATA%\sotto\config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sotto_core::ClientConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relay WebSocket endpoints, tried in order
    pub relay_urls: Vec<String>,

    /// Room channel to join instead of the plain user channel
    pub room: Option<String>,

    /// Peer topics pinged for presence after every join
    pub peers: Vec<String>,

    /// Storage path for identity and history
    pub storage_path: Option<String>,

    /// Deadline for a pushed message to be acknowledged, in seconds
    pub push_timeout_secs: u64,

    /// Deadline for the channel join acknowledgment, in seconds
    pub join_timeout_secs: u64,

    /// Socket keepalive interval, in seconds
    pub heartbeat_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            relay_urls: Vec::new(),
            room: None,
            peers: Vec::new(),
            storage_path: None,
            push_timeout_secs: defaults.push_timeout_secs,
            join_timeout_secs: defaults.join_timeout_secs,
            heartbeat_secs: defaults.heartbeat_secs,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("sotto");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("sotto");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if config_file.exists() {
            let contents =
                std::fs::read_to_string(&config_file).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let config_file = Self::config_file()?;
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_file, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Settings the core connection consumes
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            relay_urls: self.relay_urls.clone(),
            room: self.room.clone(),
            push_timeout_secs: self.push_timeout_secs,
            join_timeout_secs: self.join_timeout_secs,
            heartbeat_secs: self.heartbeat_secs,
        }
    }

    /// Add a peer topic to the presence list
    pub fn add_peer(&mut self, peer: String) -> Result<()> {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
            self.save()?;
        }
        Ok(())
    }

    /// Remove a peer topic from the presence list
    pub fn remove_peer(&mut self, peer: &str) -> Result<()> {
        self.peers.retain(|p| p != peer);
        self.save()?;
        Ok(())
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "relay_urls" => {
                self.relay_urls = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "room" => {
                self.room = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "storage_path" => {
                self.storage_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "push_timeout_secs" => {
                self.push_timeout_secs = value.parse().context("Invalid number")?;
            }
            "join_timeout_secs" => {
                self.join_timeout_secs = value.parse().context("Invalid number")?;
            }
            "heartbeat_secs" => {
                self.heartbeat_secs = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.save()?;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "relay_urls" => Some(self.relay_urls.join(",")),
            "room" => self.room.clone(),
            "storage_path" => self.storage_path.clone(),
            "push_timeout_secs" => Some(self.push_timeout_secs.to_string()),
            "join_timeout_secs" => Some(self.join_timeout_secs.to_string()),
            "heartbeat_secs" => Some(self.heartbeat_secs.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("relay_urls".to_string(), self.relay_urls.join(",")),
            (
                "room".to_string(),
                self.room.clone().unwrap_or_else(|| "(none)".to_string()),
            ),
            (
                "storage_path".to_string(),
                self.storage_path
                    .clone()
                    .unwrap_or_else(|| "(auto)".to_string()),
            ),
            (
                "push_timeout_secs".to_string(),
                format!("{}s", self.push_timeout_secs),
            ),
            (
                "join_timeout_secs".to_string(),
                format!("{}s", self.join_timeout_secs),
            ),
            ("heartbeat_secs".to_string(), format!("{}s", self.heartbeat_secs)),
            ("peers".to_string(), self.peers.len().to_string()),
        ]
    }
}
