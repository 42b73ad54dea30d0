//! Configuration types for the hapsync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Brand plugins to instantiate
    pub plugins: Vec<PluginConfig>,

    /// Sync loop settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Accessory host settings
    #[serde(default)]
    pub host: HostConfig,

    /// Optional alert notifier
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
}

impl BridgeConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            sync: SyncConfig::default(),
            host: HostConfig::default(),
            notifier: None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.plugins.is_empty() {
            return Err(crate::Error::config("No plugins configured"));
        }

        for plugin in &self.plugins {
            plugin.validate()?;
        }
        self.sync.validate()?;
        self.host.validate()?;
        if let Some(notifier) = &self.notifier {
            notifier.validate()?;
        }

        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Brand plugin configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginConfig {
    /// LG ThinQ cloud API
    Lg {
        /// API base URL, e.g. `https://api-aic.lgthinq.com`
        base_url: String,
        /// Personal access token
        access_token: String,
        /// Message id sent with every request
        message_id: String,
        /// Client id registered with ThinQ
        client_id: String,
        /// Country code
        #[serde(default = "default_country")]
        country: String,
        /// API key
        api_key: String,
    },

    /// Custom plugin
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl PluginConfig {
    /// Validate the plugin configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            PluginConfig::Lg {
                base_url,
                access_token,
                message_id,
                client_id,
                api_key,
                ..
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("LG base URL cannot be empty"));
                }
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "LG base URL must be http(s), got {}",
                        base_url
                    )));
                }
                if access_token.is_empty() {
                    return Err(crate::Error::config("LG access token cannot be empty"));
                }
                if message_id.is_empty() || client_id.is_empty() || api_key.is_empty() {
                    return Err(crate::Error::config(
                        "LG message id, client id and API key are required",
                    ));
                }
                Ok(())
            }
            PluginConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom plugin factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom plugin config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the factory name for this plugin
    pub fn type_name(&self) -> &str {
        match self {
            PluginConfig::Lg { .. } => "lg",
            PluginConfig::Custom { factory, .. } => factory,
        }
    }
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginConfig::Lg {
                base_url,
                message_id,
                client_id,
                country,
                ..
            } => f
                .debug_struct("Lg")
                .field("base_url", base_url)
                .field("access_token", &"<redacted>")
                .field("message_id", message_id)
                .field("client_id", client_id)
                .field("country", country)
                .field("api_key", &"<redacted>")
                .finish(),
            PluginConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<opaque>")
                .finish(),
        }
    }
}

fn default_country() -> String {
    "MX".to_string()
}

/// Sync loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between the start of two sync ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds to wait for the sync task on stop before aborting it
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Capacity of the registry event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SyncConfig {
    /// Validate the sync configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Sync interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_stop_timeout_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Accessory host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Address advertised to controllers (auto-detected when absent)
    #[serde(default)]
    pub address: Option<String>,

    /// Address to bind (all interfaces when absent)
    #[serde(default)]
    pub listen_address: Option<String>,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Setup code in `XXX-XX-XXX` form
    #[serde(default = "default_pincode")]
    pub pincode: String,

    /// File holding pairing data
    #[serde(default = "default_persist_file")]
    pub persist_file: String,

    /// Name of the bridge accessory
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,
}

impl HostConfig {
    /// Validate the host configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.port == 0 {
            return Err(crate::Error::config("Accessory host port must be > 0"));
        }
        if !is_valid_pincode(&self.pincode) {
            return Err(crate::Error::config(format!(
                "Pincode must look like 123-45-678, got {}",
                self.pincode
            )));
        }
        if self.persist_file.is_empty() {
            return Err(crate::Error::config("Persist file cannot be empty"));
        }
        if self.bridge_name.is_empty() {
            return Err(crate::Error::config("Bridge name cannot be empty"));
        }
        Ok(())
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: None,
            listen_address: None,
            port: default_port(),
            pincode: default_pincode(),
            persist_file: default_persist_file(),
            bridge_name: default_bridge_name(),
        }
    }
}

fn is_valid_pincode(pincode: &str) -> bool {
    let groups: Vec<&str> = pincode.split('-').collect();
    groups.len() == 3
        && groups.iter().map(|g| g.len()).eq([3, 2, 3])
        && groups
            .iter()
            .all(|g| g.chars().all(|c| c.is_ascii_digit()))
}

fn default_port() -> u16 {
    51827
}

fn default_pincode() -> String {
    "031-45-154".to_string()
}

fn default_persist_file() -> String {
    "homekit.json".to_string()
}

fn default_bridge_name() -> String {
    "Mi Raspberry Hub".to_string()
}

/// Alert notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Telegram bot `sendMessage` endpoint
    Telegram {
        /// Full `sendMessage` URL including the bot token
        url: String,
        /// Target chat id
        chat_id: String,
    },
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Telegram { url, chat_id } => {
                if url.is_empty() {
                    return Err(crate::Error::config("Telegram URL cannot be empty"));
                }
                if chat_id.is_empty() {
                    return Err(crate::Error::config("Telegram chat id cannot be empty"));
                }
                Ok(())
            }
        }
    }
}
