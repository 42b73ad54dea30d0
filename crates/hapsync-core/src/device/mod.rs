//! Normalized device model
//!
//! Every device known to the bridge is described by a brand-agnostic
//! [`DeviceRecord`]. Brand adapters translate vendor payloads into a flat
//! [`StateMap`]; typed views over that map live in the adapter crates.

mod command;
mod state;

pub use command::NormalizedCommand;
pub use state::{StateMap, StateValue};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default display name when a vendor does not report an alias
pub const DEFAULT_ALIAS: &str = "Device";

/// Default model name when a vendor does not report one
pub const DEFAULT_MODEL: &str = "Unknown";

/// What a plugin reports about a device during discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    /// Vendor-assigned device id, unique across the bridge
    pub device_id: String,

    /// Brand key of the owning plugin (lowercase)
    pub brand: String,

    /// Vendor device type, e.g. `DEVICE_WASHER`
    pub device_type: String,

    /// User-facing name
    #[serde(default = "default_alias")]
    pub alias: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,
}

impl DiscoveryInfo {
    /// Create discovery info with default alias and model
    pub fn new(
        device_id: impl Into<String>,
        brand: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            brand: brand.into().to_lowercase(),
            device_type: device_type.into(),
            alias: default_alias(),
            model: default_model(),
        }
    }

    /// Set the alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn default_alias() -> String {
    DEFAULT_ALIAS.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Point-in-time view of a registered device
///
/// Records handed out by the registry are snapshots; mutating one has no
/// effect on the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique device id
    pub id: String,

    /// Brand key of the owning plugin
    pub brand: String,

    /// Vendor device type
    pub device_type: String,

    /// User-facing name
    pub display_name: String,

    /// Model name
    pub model: String,

    /// Latest normalized state
    pub state: StateMap,

    /// Whether the last fetch reached the device
    pub online: bool,

    /// Time of the last successful state update, `None` until the first sync
    pub last_update: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Build an unsynced record from discovery info
    pub fn from_discovery(info: &DiscoveryInfo) -> Self {
        Self {
            id: info.device_id.clone(),
            brand: info.brand.to_lowercase(),
            device_type: info.device_type.clone(),
            display_name: info.alias.clone(),
            model: info.model.clone(),
            state: StateMap::new(),
            online: false,
            last_update: None,
        }
    }

    /// Whether at least one state update has been applied
    pub fn is_synced(&self) -> bool {
        self.last_update.is_some()
    }

    /// Look up a state value
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.state.get(key)
    }

    /// Look up a textual state value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.state.get(key).and_then(StateValue::as_str)
    }
}
