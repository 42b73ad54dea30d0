// # Brand Plugin Trait
//
// Defines the interface every vendor adapter implements.
//
// ## Implementations
//
// - LG ThinQ: `hapsync-plugin-lg` crate
//
// ## Usage
//
// ```rust,ignore
// use hapsync_core::{BrandPlugin, FetchResult};
//
// let plugin: Arc<dyn BrandPlugin> = /* adapter */;
// for info in plugin.discover_devices().await? {
//     match plugin.fetch_state(&info.device_id, &info.device_type).await? {
//         FetchResult::Updated(state) => println!("{:?}", state),
//         FetchResult::Unreachable => println!("offline"),
//     }
// }
// ```

use crate::config::PluginConfig;
use crate::device::{DiscoveryInfo, NormalizedCommand, StateMap};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of reading a device's state from its vendor backend
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Fresh normalized state
    Updated(StateMap),
    /// Device is powered off or out of reach; keep the last known state
    Unreachable,
}

/// Brand-agnostic device family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCategory {
    Washer,
    Refrigerator,
    AirConditioner,
    Tv,
    Other,
}

/// Typed device object produced by a plugin for a discovered device
pub trait ApplianceDevice: Send + Sync {
    /// Discovery data the device was built from
    fn info(&self) -> &DiscoveryInfo;

    /// Device family, used to pick a presentation
    fn category(&self) -> DeviceCategory;

    fn device_id(&self) -> &str {
        &self.info().device_id
    }
}

/// Trait for brand adapter implementations
///
/// An adapter owns the vendor protocol: it enumerates devices, reads and
/// normalizes their state, and encodes commands. It never touches the device
/// registry and never schedules work of its own; polling cadence and error
/// containment belong to [`DeviceRegistry`](crate::DeviceRegistry).
///
/// # Errors
///
/// - `fetch_state` reports powered-off devices as `Ok(FetchResult::Unreachable)`,
///   never as an error.
/// - `send_command` returns `Ok(false)` when the backend refused the command,
///   and `Err` for transport or encoding failures.
#[async_trait]
pub trait BrandPlugin: Send + Sync {
    /// Brand key used for registry lookups (compared lowercase)
    fn brand(&self) -> &str;

    /// Device types this adapter can model
    fn supported_device_types(&self) -> Vec<String>;

    /// Enumerate the devices visible with the configured credentials
    async fn discover_devices(&self) -> Result<Vec<DiscoveryInfo>, crate::Error>;

    /// Read and normalize one device's state
    async fn fetch_state(
        &self,
        device_id: &str,
        device_type: &str,
    ) -> Result<FetchResult, crate::Error>;

    /// Encode and transmit a command
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The backend accepted the command
    /// - `Ok(false)`: The backend refused it or the device is unreachable
    /// - `Err(Error)`: The command could not be encoded or transmitted
    async fn send_command(
        &self,
        device_id: &str,
        command: &NormalizedCommand,
    ) -> Result<bool, crate::Error>;

    /// Build the typed device object for a discovered device
    ///
    /// Returns `Error::UnsupportedDevice` for device types the adapter does
    /// not model.
    fn create_device(
        &self,
        device_type: &str,
        info: &DiscoveryInfo,
    ) -> Result<Arc<dyn ApplianceDevice>, crate::Error>;
}

/// Helper trait for constructing brand plugins from configuration
pub trait PluginFactory: Send + Sync {
    /// Create a BrandPlugin instance from configuration
    fn create(&self, config: &PluginConfig) -> Result<Arc<dyn BrandPlugin>, crate::Error>;
}
