//! Startup discovery
//!
//! Walks every registered plugin once, builds typed device objects and
//! registers the resulting records. A failing plugin or an unsupported
//! device type never aborts discovery of the others.

use crate::device::DeviceRecord;
use crate::engine::DeviceRegistry;
use crate::registry::PluginRegistry;
use crate::traits::ApplianceDevice;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A registered device together with its typed device object
#[derive(Clone)]
pub struct DiscoveredDevice {
    pub record: DeviceRecord,
    pub device: Arc<dyn ApplianceDevice>,
}

impl std::fmt::Debug for DiscoveredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredDevice")
            .field("record", &self.record)
            .field("category", &self.device.category())
            .finish()
    }
}

/// Discover and register the devices of every plugin
///
/// Plugins are visited in brand order and devices in the order each plugin
/// reports them.
pub async fn discover_all(
    plugins: &PluginRegistry,
    devices: &DeviceRegistry,
) -> Vec<DiscoveredDevice> {
    let mut discovered = Vec::new();

    for plugin in plugins.all() {
        let brand = plugin.brand().to_string();
        let infos = match plugin.discover_devices().await {
            Ok(infos) => infos,
            Err(e) => {
                error!("Discovery failed for brand {}: {}", brand, e);
                continue;
            }
        };
        info!("Brand {} reported {} devices", brand, infos.len());

        for info in infos {
            let device = match plugin.create_device(&info.device_type, &info) {
                Ok(device) => device,
                Err(e) => {
                    warn!("Skipping device {}: {}", info.device_id, e);
                    continue;
                }
            };

            let record = devices.add_device(&info);
            discovered.push(DiscoveredDevice { record, device });
        }
    }

    discovered
}
