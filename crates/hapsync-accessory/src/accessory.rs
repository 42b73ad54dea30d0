//! Accessory interface shared by every presented device

use crate::hap::{Characteristic, HapCharacteristic, HapService};
use hapsync_core::{DeviceListener, DeviceRecord, Result};

/// A device as presented to the accessory host
///
/// `update_from_device` defaults to a no-op so accessories without live state
/// can still be subscribed like every other accessory.
pub trait Accessory: Send + Sync {
    fn device_id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Refresh characteristics from a new record snapshot
    fn update_from_device(&self, _record: &DeviceRecord) -> Result<()> {
        Ok(())
    }

    /// Current characteristic values
    fn characteristics(&self) -> Vec<Characteristic>;
}

/// Read-only accessory for device categories without a dedicated mapping
#[derive(Debug, Clone)]
pub struct InfoAccessory {
    device_id: String,
    display_name: String,
    model: String,
}

impl InfoAccessory {
    pub fn new(record: &DeviceRecord) -> Self {
        Self {
            device_id: record.id.clone(),
            display_name: record.display_name.clone(),
            model: record.model.clone(),
        }
    }
}

impl Accessory for InfoAccessory {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn characteristics(&self) -> Vec<Characteristic> {
        vec![
            Characteristic::new(
                &self.display_name,
                HapService::AccessoryInformation,
                HapCharacteristic::Name,
                self.display_name.as_str(),
            ),
            Characteristic::new(
                &self.display_name,
                HapService::AccessoryInformation,
                HapCharacteristic::Model,
                self.model.as_str(),
            ),
        ]
    }
}

impl DeviceListener for InfoAccessory {
    fn on_device_update(&self, record: &DeviceRecord) -> Result<()> {
        self.update_from_device(record)
    }
}
