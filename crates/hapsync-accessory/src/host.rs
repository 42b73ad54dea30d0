//! Accessory host
//!
//! The host owns the accessories exposed to controllers. The pairing wire
//! protocol lives outside this crate; `LocalAccessoryHost` keeps accessories
//! in memory and reports its pairing settings on start.

use crate::accessory::Accessory;
use crate::hap::Characteristic;
use hapsync_core::{Error, HostConfig, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Presentation host for accessories
pub trait AccessoryHost: Send + Sync {
    /// Add an accessory; `false` if one with the same device id exists
    fn add_accessory(&self, accessory: Arc<dyn Accessory>) -> bool;

    /// Remove an accessory
    ///
    /// Bridges cannot drop accessories while paired controllers are
    /// connected, so hosts may refuse and return `false`.
    fn remove_accessory(&self, device_id: &str) -> bool;

    fn start(&self) -> Result<()>;

    fn stop(&self);
}

/// In-process accessory host
pub struct LocalAccessoryHost {
    config: HostConfig,
    accessories: RwLock<BTreeMap<String, Arc<dyn Accessory>>>,
    running: AtomicBool,
}

impl LocalAccessoryHost {
    /// Create a host from a validated configuration
    pub fn new(config: HostConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            accessories: RwLock::new(BTreeMap::new()),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.accessories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.read().is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current characteristics of one accessory
    pub fn characteristics(&self, device_id: &str) -> Option<Vec<Characteristic>> {
        self.accessories
            .read()
            .get(device_id)
            .map(|accessory| accessory.characteristics())
    }
}

impl AccessoryHost for LocalAccessoryHost {
    fn add_accessory(&self, accessory: Arc<dyn Accessory>) -> bool {
        let mut accessories = self.accessories.write();
        let device_id = accessory.device_id().to_string();

        if accessories.contains_key(&device_id) {
            warn!("Accessory already exists: {}", device_id);
            return false;
        }

        info!("Accessory added: {}", accessory.display_name());
        accessories.insert(device_id, accessory);
        true
    }

    fn remove_accessory(&self, device_id: &str) -> bool {
        if !self.accessories.read().contains_key(device_id) {
            warn!("Accessory not found: {}", device_id);
            return false;
        }

        warn!("Removing accessory {} requires restarting the host", device_id);
        false
    }

    fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::config("Accessory host already started"));
        }

        info!("Starting accessory host '{}'", self.config.bridge_name);
        info!(
            "  Address: {}",
            self.config.address.as_deref().unwrap_or("auto")
        );
        if let Some(listen) = &self.config.listen_address {
            info!("  Listening on interface: {}", listen);
        }
        info!("  Port: {}", self.config.port);
        info!("  PIN code: {}", self.config.pincode);
        info!("  Pairing file: {}", self.config.persist_file);
        info!("  Accessories registered: {}", self.len());
        Ok(())
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping accessory host '{}'", self.config.bridge_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::InfoAccessory;
    use hapsync_core::{DeviceRecord, DiscoveryInfo};

    fn info_accessory(id: &str) -> Arc<dyn Accessory> {
        let record = DeviceRecord::from_discovery(&DiscoveryInfo::new(id, "acme", "DEVICE_TV"));
        Arc::new(InfoAccessory::new(&record))
    }

    #[test]
    fn duplicate_accessory_is_refused() {
        let host = LocalAccessoryHost::new(HostConfig::default()).unwrap();

        assert!(host.add_accessory(info_accessory("tv1")));
        assert!(!host.add_accessory(info_accessory("tv1")));
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn remove_is_unsupported() {
        let host = LocalAccessoryHost::new(HostConfig::default()).unwrap();
        host.add_accessory(info_accessory("tv1"));

        assert!(!host.remove_accessory("tv1"));
        assert!(!host.remove_accessory("missing"));
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn start_twice_fails_and_stop_is_idempotent() {
        let host = LocalAccessoryHost::new(HostConfig::default()).unwrap();

        host.start().unwrap();
        assert!(host.is_running());
        assert!(host.start().is_err());

        host.stop();
        host.stop();
        assert!(!host.is_running());
    }

    #[test]
    fn invalid_pincode_is_rejected() {
        let config = HostConfig {
            pincode: "1234".to_string(),
            ..HostConfig::default()
        };
        assert!(LocalAccessoryHost::new(config).is_err());
    }
}
