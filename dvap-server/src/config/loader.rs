//! Configuration loader

use std::path::Path;

use dvap_utils::{config_file, DvapError, Result};

use super::ServerConfig;

/// Upper bound for tick and poll intervals
const MAX_INTERVAL_MS: u64 = 10_000;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<ServerConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(ServerConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<ServerConfig> {
        if !path.exists() {
            return Err(DvapError::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| DvapError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<ServerConfig> {
        toml::from_str(content).map_err(|e| DvapError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &ServerConfig) -> Result<()> {
        let ws = &config.websocket;
        let events = &config.events;

        if ws.tick_interval_ms == 0 || ws.tick_interval_ms > MAX_INTERVAL_MS {
            return Err(DvapError::config(format!(
                "websocket.tick_interval_ms must be between 1 and {}",
                MAX_INTERVAL_MS
            )));
        }

        if ws.read_buffer_size < 64 {
            return Err(DvapError::config(
                "websocket.read_buffer_size must be at least 64",
            ));
        }

        if events.poll_interval_ms == 0 || events.poll_interval_ms > MAX_INTERVAL_MS {
            return Err(DvapError::config(format!(
                "events.poll_interval_ms must be between 1 and {}",
                MAX_INTERVAL_MS
            )));
        }

        if events.max_queued == 0 {
            return Err(DvapError::config("events.max_queued must be at least 1"));
        }

        if events.enabled && ws.port != 0 && ws.port == events.port && ws.host == events.host {
            return Err(DvapError::config(format!(
                "websocket and events cannot both listen on {}:{}",
                ws.host, ws.port
            )));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<ServerConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load a specific file and validate
    pub fn load_path_and_validate(path: &Path) -> Result<ServerConfig> {
        let config = Self::load_from_path(path)?;
        Self::validate(&config)?;
        Ok(config)
    }
}
