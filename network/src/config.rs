// SPDX-License-Identifier: MIT OR Apache-2.0

//! Network configuration loaded from a TOML file

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the host binds its listener to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    /// Listener port; 0 lets the OS pick one
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of accept-poll iterations before the host gives up
    #[serde(default = "default_accept_attempts")]
    pub accept_attempts: u32,
    /// Length of one accept-poll iteration in milliseconds
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
    /// Guest-side connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Capacity of the broadcast event channels
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    9340
}

fn default_accept_attempts() -> u32 {
    // 240 polls at 500 ms each: the host waits about two minutes
    240
}

fn default_accept_poll_ms() -> u64 {
    500
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_event_buffer() -> usize {
    32
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            accept_attempts: default_accept_attempts(),
            accept_poll_ms: default_accept_poll_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl NetworkConfig {
    /// One accept-poll iteration as a [`Duration`]
    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    /// Guest connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("io", "p2ptt", "p2ptt").context("Failed to determine config directory")?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}

/// Load the config from the default location, writing a default file on
/// first run.
pub fn load_config() -> Result<NetworkConfig> {
    let config_path = get_config_path().context("Failed to determine config path")?;
    load_from(&config_path)
}

pub fn save_config(config: &NetworkConfig) -> Result<()> {
    let config_path = get_config_path().context("Failed to determine config path")?;
    save_to(&config_path, config)?;
    tracing::info!("Saved config to: {}", config_path.display());
    Ok(())
}

fn load_from(config_path: &Path) -> Result<NetworkConfig> {
    if !config_path.exists() {
        tracing::info!(
            "Config file not found, creating default at: {}",
            config_path.display()
        );
        let default_config = NetworkConfig::default();
        save_to(config_path, &default_config)?;
        return Ok(default_config);
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    toml::from_str::<NetworkConfig>(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
}

fn save_to(config_path: &Path, config: &NetworkConfig) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let toml_content = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(config_path, toml_content)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.port, 9340);
        assert_eq!(config.accept_attempts, 240);
        assert_eq!(config.accept_poll_ms, 500);
        assert_eq!(config.accept_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.event_buffer > 0);
    }

    #[test]
    fn test_config_serialization() {
        let config = NetworkConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();

        let deserialized: NetworkConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.port, config.port);
        assert_eq!(deserialized.bind_addr, config.bind_addr);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: NetworkConfig = toml::from_str("port = 9001").unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.accept_attempts, default_accept_attempts());
        assert_eq!(config.bind_addr, default_bind_addr());
    }

    #[test]
    fn test_load_save_round_trip() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("p2ptt").join("config.toml");

        // First load creates the default file
        let created = load_from(&config_path)?;
        assert!(config_path.exists());
        assert_eq!(created.port, default_port());

        // A modified config survives a save/load cycle
        let mut config = created;
        config.port = 9400;
        save_to(&config_path, &config)?;
        let reloaded = load_from(&config_path)?;
        assert_eq!(reloaded.port, 9400);

        Ok(())
    }
}
