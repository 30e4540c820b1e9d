//! Configuration management
//!
//! Layering, lowest precedence first:
//! 1. built-in defaults
//! 2. `player-sync.{toml,json,yaml}` in the config directory (optional)
//! 3. `PLAYER_SYNC_*` environment variables (`PLAYER_SYNC_ENDPOINT`, ...)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineConfig;

const CONFIG_FILE_STEM: &str = "player-sync";
const ENV_PREFIX: &str = "PLAYER_SYNC";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Player command endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Period of the local position extrapolation tick
    #[serde(default = "default_position_tick_ms")]
    pub position_tick_ms: u64,

    /// Period of the playlist/volume/shuffle/sinks refresh
    #[serde(default = "default_periodic_refresh_secs")]
    pub periodic_refresh_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_position_tick_ms() -> u64 {
    1000
}

fn default_periodic_refresh_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            position_tick_ms: default_position_tick_ms(),
            periodic_refresh_secs: default_periodic_refresh_secs(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            position_tick: Duration::from_millis(self.position_tick_ms),
            periodic_refresh: Duration::from_secs(self.periodic_refresh_secs),
        }
    }

    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.endpoint)
            .with_context(|| format!("invalid endpoint '{}'", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("endpoint must be http(s), got '{}'", url.scheme());
        }
        if self.position_tick_ms == 0 || self.periodic_refresh_secs == 0 {
            bail!("refresh periods must be non-zero");
        }
        Ok(())
    }
}

/// Get config directory (PLAYER_SYNC_CONFIG_DIR, XDG_CONFIG_HOME or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PLAYER_SYNC_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library/Application Support/player-sync");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("player-sync");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config/player-sync");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("player-sync");
        }
    }

    // Fallback to current directory
    PathBuf::from(".")
}

pub fn load_config() -> Result<Config> {
    let config_file = get_config_dir().join(CONFIG_FILE_STEM);

    let config = ::config::Config::builder()
        .add_source(::config::File::with_name(&config_file.to_string_lossy()).required(false))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
