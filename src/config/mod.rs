//! Configuration management for the iLive bridge
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::feedback::Feedback;
use crate::protocol::address::ChannelType;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub console: ConsoleConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    /// Feedbacks watched and logged when they change
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedbacks: Vec<Feedback>,
}

/// Console connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConsoleConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fixed delay before each reconnect attempt
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Channel name polling configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollingConfig {
    /// Seconds between periodic name sweeps, 0 disables them
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Highest input channel included in a sweep
    #[serde(default = "default_max_input_channel")]
    pub max_input_channel: u8,
    /// Gap between two name requests
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    /// Pause between channel type groups
    #[serde(default = "default_group_delay")]
    pub group_delay_ms: u64,
}

impl ConsoleConfig {
    /// `host:port` for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl PollingConfig {
    /// Periodic sweep interval, `None` when disabled
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            max_input_channel: default_max_input_channel(),
            request_delay_ms: default_request_delay(),
            group_delay_ms: default_group_delay(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.console.host.trim().is_empty() {
            anyhow::bail!("console.host cannot be empty");
        }
        if self.console.port == 0 {
            anyhow::bail!("console.port cannot be 0");
        }
        if self.console.connect_timeout_ms == 0 {
            anyhow::bail!("console.connect_timeout_ms must be greater than 0");
        }

        let max_inputs = ChannelType::Input.count();
        if self.polling.max_input_channel == 0 || self.polling.max_input_channel > max_inputs {
            anyhow::bail!(
                "polling.max_input_channel {} is invalid (must be 1-{})",
                self.polling.max_input_channel,
                max_inputs
            );
        }
        if self.polling.interval_secs > 60 {
            anyhow::bail!(
                "polling.interval_secs {} is invalid (must be 0-60)",
                self.polling.interval_secs
            );
        }

        Ok(())
    }
}

// Default value functions
fn default_port() -> u16 { crate::protocol::DEFAULT_PORT }
fn default_reconnect_delay() -> u64 { 5000 }
fn default_connect_timeout() -> u64 { 3000 }
fn default_poll_interval() -> u64 { 1 }
fn default_max_input_channel() -> u8 { 64 }
fn default_request_delay() -> u64 { 10 }
fn default_group_delay() -> u64 { 100 }
