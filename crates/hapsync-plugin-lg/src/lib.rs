// # LG ThinQ Brand Plugin
//
// This crate provides the LG ThinQ Connect adapter for the hapsync bridge.
//
// ## Behaviour
//
// - One HTTP request per registry call (discover, fetch, command)
// - Powered-off devices (HTTP 416) are reported as unreachable, not as errors
// - Washer snapshots are parsed into a typed `WasherState`; other device
//   types are flattened into dotted keys
// - Commands are validated before anything is sent
// - NO retry logic, NO polling, NO caching (owned by DeviceRegistry)
//
// ## Security Requirements
//
// - Access token and API key NEVER appear in logs or Debug output
// - Credentials are provided via configuration only
//
// ## API Reference
//
// - List devices: GET `/devices`
// - Device state: GET `/devices/:device_id/state`
// - Device profile: GET `/devices/:device_id/profile`
// - Control: POST `/devices/:device_id/control`

pub mod client;
pub mod profile;
pub mod snapshot;
pub mod washer;

pub use client::{ThinqClient, ThinqSettings};
pub use profile::{Access, DeviceProfile};
pub use washer::{WasherCommand, WasherLocation, WasherOperation, WasherState};

use async_trait::async_trait;
use hapsync_core::{
    ApplianceDevice, BrandPlugin, DeviceCategory, DiscoveryInfo, Error, FetchResult,
    NormalizedCommand, PluginConfig, PluginFactory, PluginRegistry, Result,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Brand key of this plugin
pub const BRAND: &str = "lg";

/// Device type of ThinQ washers
pub const DEVICE_WASHER: &str = "DEVICE_WASHER";

/// LG ThinQ adapter
#[derive(Debug)]
pub struct LgPlugin {
    client: ThinqClient,
}

impl LgPlugin {
    pub fn new(client: ThinqClient) -> Self {
        Self { client }
    }

    /// Access the underlying client, e.g. for profile lookups
    pub fn client(&self) -> &ThinqClient {
        &self.client
    }
}

fn is_washer(device_type: &str) -> bool {
    device_type.eq_ignore_ascii_case(DEVICE_WASHER)
}

/// Map one `/devices` entry to discovery info
///
/// Returns `None` when `deviceId` or `deviceInfo.deviceType` is missing.
fn discovery_info(item: &Value) -> Option<DiscoveryInfo> {
    let device_id = item.get("deviceId")?.as_str()?;
    let device_info = item.get("deviceInfo")?;
    let device_type = device_info.get("deviceType")?.as_str()?;

    let mut info = DiscoveryInfo::new(device_id, BRAND, device_type.to_uppercase());
    if let Some(alias) = device_info.get("alias").and_then(Value::as_str) {
        info = info.with_alias(alias);
    }
    if let Some(model) = device_info.get("modelName").and_then(Value::as_str) {
        info = info.with_model(model);
    }
    Some(info)
}

#[async_trait]
impl BrandPlugin for LgPlugin {
    fn brand(&self) -> &str {
        BRAND
    }

    fn supported_device_types(&self) -> Vec<String> {
        ["washer", "refrigerator", "air_conditioner", "tv"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    async fn discover_devices(&self) -> Result<Vec<DiscoveryInfo>> {
        let items = self.client.list_devices().await?;

        let devices: Vec<DiscoveryInfo> = items
            .iter()
            .filter_map(|item| {
                let info = discovery_info(item);
                if info.is_none() {
                    warn!("Skipping ThinQ device entry without deviceId or deviceType");
                }
                info
            })
            .collect();

        info!("ThinQ reported {} usable devices", devices.len());
        Ok(devices)
    }

    async fn fetch_state(&self, device_id: &str, device_type: &str) -> Result<FetchResult> {
        let Some(snapshot) = self.client.device_state(device_id).await? else {
            return Ok(FetchResult::Unreachable);
        };

        let state = if is_washer(device_type) {
            WasherState::from_snapshot(&snapshot)?.to_state_map()
        } else {
            debug!("No typed model for {}, flattening snapshot", device_type);
            snapshot::flatten(&snapshot)
        };

        Ok(FetchResult::Updated(state))
    }

    async fn send_command(&self, device_id: &str, command: &NormalizedCommand) -> Result<bool> {
        let payload = match WasherCommand::from_normalized(command) {
            Ok(command) => command.to_api_format(),
            Err(e) => {
                warn!("Not sending command to {}: {}", device_id, e);
                return Ok(false);
            }
        };

        self.client.control(device_id, &payload).await
    }

    fn create_device(
        &self,
        device_type: &str,
        info: &DiscoveryInfo,
    ) -> Result<Arc<dyn ApplianceDevice>> {
        if is_washer(device_type) {
            Ok(Arc::new(LgWasher::new(info.clone())))
        } else {
            Err(Error::unsupported_device(device_type))
        }
    }
}

/// Typed LG washer device
#[derive(Debug, Clone)]
pub struct LgWasher {
    info: DiscoveryInfo,
}

impl LgWasher {
    pub fn new(info: DiscoveryInfo) -> Self {
        Self { info }
    }
}

impl ApplianceDevice for LgWasher {
    fn info(&self) -> &DiscoveryInfo {
        &self.info
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::Washer
    }
}

/// Factory for creating LG plugins
pub struct LgFactory;

impl PluginFactory for LgFactory {
    fn create(&self, config: &PluginConfig) -> Result<Arc<dyn BrandPlugin>> {
        match config {
            PluginConfig::Lg {
                base_url,
                access_token,
                message_id,
                client_id,
                country,
                api_key,
            } => {
                if access_token.is_empty() {
                    return Err(Error::config("LG access token is required"));
                }

                let client = ThinqClient::new(ThinqSettings {
                    base_url: base_url.clone(),
                    access_token: access_token.clone(),
                    message_id: message_id.clone(),
                    client_id: client_id.clone(),
                    country: country.clone(),
                    api_key: api_key.clone(),
                })?;

                Ok(Arc::new(LgPlugin::new(client)))
            }
            _ => Err(Error::config("Invalid config for LG plugin")),
        }
    }
}

/// Register the LG plugin factory with a registry
///
/// # Example
///
/// ```rust
/// use hapsync_core::PluginRegistry;
///
/// let registry = PluginRegistry::new();
/// hapsync_plugin_lg::register(&registry);
/// assert!(registry.list_factories().contains(&"lg".to_string()));
/// ```
pub fn register(registry: &PluginRegistry) {
    registry.register_factory(BRAND, Box::new(LgFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lg_config(access_token: &str) -> PluginConfig {
        PluginConfig::Lg {
            base_url: "https://api-aic.lgthinq.com".to_string(),
            access_token: access_token.to_string(),
            message_id: "msg".to_string(),
            client_id: "client".to_string(),
            country: "MX".to_string(),
            api_key: "key".to_string(),
        }
    }

    #[test]
    fn factory_creation() {
        let plugin = LgFactory.create(&lg_config("token")).unwrap();
        assert_eq!(plugin.brand(), "lg");
    }

    #[test]
    fn factory_missing_token() {
        assert!(LgFactory.create(&lg_config("")).is_err());
    }

    #[test]
    fn factory_rejects_foreign_config() {
        let config = PluginConfig::Custom {
            factory: "lg".to_string(),
            config: json!({}),
        };
        assert!(LgFactory.create(&config).is_err());
    }

    #[test]
    fn discovery_mapping() {
        let info = discovery_info(&json!({
            "deviceId": "abc",
            "deviceInfo": { "deviceType": "device_washer", "modelName": "F4WV", "alias": "Lavadora" }
        }))
        .unwrap();

        assert_eq!(info.device_id, "abc");
        assert_eq!(info.brand, "lg");
        assert_eq!(info.device_type, "DEVICE_WASHER");
        assert_eq!(info.model, "F4WV");
        assert_eq!(info.alias, "Lavadora");
    }

    #[test]
    fn discovery_defaults_and_skips() {
        let info =
            discovery_info(&json!({ "deviceId": "abc", "deviceInfo": { "deviceType": "DEVICE_TV" } }))
                .unwrap();
        assert_eq!(info.alias, "Device");
        assert_eq!(info.model, "Unknown");

        assert!(discovery_info(&json!({ "deviceInfo": { "deviceType": "DEVICE_TV" } })).is_none());
        assert!(discovery_info(&json!({ "deviceId": "abc", "deviceInfo": {} })).is_none());
    }

    #[test]
    fn create_device_only_models_washers() {
        let plugin = LgFactory.create(&lg_config("token")).unwrap();
        let info = DiscoveryInfo::new("w1", "lg", "device_washer");

        let device = plugin.create_device("device_washer", &info).unwrap();
        assert_eq!(device.category(), DeviceCategory::Washer);
        assert_eq!(device.device_id(), "w1");

        assert!(matches!(
            plugin.create_device("DEVICE_REFRIGERATOR", &info),
            Err(Error::UnsupportedDevice(_))
        ));
    }

    #[test]
    fn register_adds_factory() {
        let registry = PluginRegistry::new();
        register(&registry);

        let plugin = registry.instantiate(&lg_config("token")).unwrap();
        assert_eq!(plugin.brand(), "lg");
        assert!(registry.has_plugin("LG"));
    }
}
