//! Device → accessory wiring

use crate::accessory::{Accessory, InfoAccessory};
use crate::host::AccessoryHost;
use crate::notifier::Notifier;
use crate::washer::WasherAccessory;
use hapsync_core::{
    ApplianceDevice, DeviceCategory, DeviceListener, DeviceRecord, DeviceRegistry,
    DiscoveredDevice, Result, SubscriptionId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

enum BridgedAccessory {
    Washer(Arc<WasherAccessory>),
    Info(Arc<InfoAccessory>),
}

impl BridgedAccessory {
    fn for_device(
        record: &DeviceRecord,
        category: DeviceCategory,
        devices: &Arc<DeviceRegistry>,
        notifier: &Option<Arc<dyn Notifier>>,
    ) -> Self {
        match category {
            DeviceCategory::Washer => Self::Washer(Arc::new(WasherAccessory::new(
                record,
                Arc::clone(devices),
                notifier.clone(),
            ))),
            DeviceCategory::Refrigerator
            | DeviceCategory::AirConditioner
            | DeviceCategory::Tv
            | DeviceCategory::Other => Self::Info(Arc::new(InfoAccessory::new(record))),
        }
    }

    fn accessory(&self) -> Arc<dyn Accessory> {
        match self {
            Self::Washer(washer) => Arc::clone(washer) as Arc<dyn Accessory>,
            Self::Info(info) => Arc::clone(info) as Arc<dyn Accessory>,
        }
    }

    fn listener(&self) -> Arc<dyn DeviceListener> {
        match self {
            Self::Washer(washer) => Arc::clone(washer) as Arc<dyn DeviceListener>,
            Self::Info(info) => Arc::clone(info) as Arc<dyn DeviceListener>,
        }
    }
}

struct Bridged {
    accessory: BridgedAccessory,
    // The registry only holds a weak reference
    _listener: Arc<dyn DeviceListener>,
    subscription: SubscriptionId,
}

/// Creates accessories for registered devices and keeps them subscribed
pub struct AccessoryBridge {
    devices: Arc<DeviceRegistry>,
    host: Arc<dyn AccessoryHost>,
    notifier: Option<Arc<dyn Notifier>>,
    bridged: Mutex<Vec<Bridged>>,
}

impl AccessoryBridge {
    pub fn new(
        devices: Arc<DeviceRegistry>,
        host: Arc<dyn AccessoryHost>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            devices,
            host,
            notifier,
            bridged: Mutex::new(Vec::new()),
        }
    }

    /// Present a registered device on the host
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The accessory was added and subscribed
    /// - `Ok(false)`: The host already has an accessory for this device
    /// - `Err(DeviceNotFound)`: The device is not in the registry
    pub fn add_device(&self, record: &DeviceRecord, device: &dyn ApplianceDevice) -> Result<bool> {
        // Nothing reaches the host for a device the registry does not know
        self.devices.get_device(&record.id)?;

        let candidate =
            BridgedAccessory::for_device(record, device.category(), &self.devices, &self.notifier);

        let accessory = candidate.accessory();
        if !self.host.add_accessory(Arc::clone(&accessory)) {
            warn!("Skipping duplicate accessory for {}", record.id);
            return Ok(false);
        }

        let listener = candidate.listener();
        let subscription = self.devices.subscribe(&record.id, &listener)?;

        if record.is_synced()
            && let Err(e) = accessory.update_from_device(record)
        {
            warn!("Initial update of {} failed: {}", record.id, e);
        }

        info!(
            "Bridged {} ({:?}) as '{}'",
            record.id,
            device.category(),
            accessory.display_name()
        );
        self.bridged.lock().push(Bridged {
            accessory: candidate,
            _listener: listener,
            subscription,
        });
        Ok(true)
    }

    /// Bridge every discovered device, logging the ones that fail
    pub fn add_discovered(&self, discovered: &[DiscoveredDevice]) -> usize {
        discovered
            .iter()
            .filter(|d| match self.add_device(&d.record, d.device.as_ref()) {
                Ok(added) => added,
                Err(e) => {
                    warn!("Failed to bridge {}: {}", d.record.id, e);
                    false
                }
            })
            .count()
    }

    /// Washer accessory for a device, if one was bridged
    pub fn washer(&self, device_id: &str) -> Option<Arc<WasherAccessory>> {
        self.bridged
            .lock()
            .iter()
            .find_map(|bridged| match &bridged.accessory {
                BridgedAccessory::Washer(washer) if washer.device_id() == device_id => {
                    Some(Arc::clone(washer))
                }
                _ => None,
            })
    }

    pub fn len(&self) -> usize {
        self.bridged.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridged.lock().is_empty()
    }

    /// Unsubscribe every accessory from the registry
    pub fn detach(&self) {
        for bridged in self.bridged.lock().drain(..) {
            let device_id = bridged.accessory.accessory().device_id().to_string();
            self.devices.unsubscribe(&device_id, bridged.subscription);
        }
    }
}
