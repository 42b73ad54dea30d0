//! Washer accessory
//!
//! Presents a washer as a television-style controller (power plus a delay
//! picker), a start/pause switch, a remaining-minutes gauge and an occupancy
//! sensor that lights up while the washer is rinsing.

use crate::accessory::Accessory;
use crate::hap::{Characteristic, HapCharacteristic, HapService};
use crate::notifier::{Notifier, spawn_alert};
use hapsync_core::{DeviceListener, DeviceRecord, DeviceRegistry, Error, NormalizedCommand, Result};
use hapsync_plugin_lg::WasherState;
use hapsync_plugin_lg::washer::MAX_DELAY_HOURS;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Largest selectable start delay, in hours
pub const MAX_DELAY_INDEX: u8 = MAX_DELAY_HOURS;

/// Upper bound of the remaining-minutes gauge
pub const COUNTDOWN_MAX: i64 = 100;

/// Alert sent once each time the washer enters the rinse phase
pub const RINSE_ALERT: &str = "La lavadora termino de lavar y ahora va a enjuagar";

const CONTROLLER_NAME: &str = "Washer Controller";
const SWITCH_NAME: &str = "Start / Pause";
const COUNTDOWN_NAME: &str = "Minutes Remaining";
const STATUS_NAME: &str = "Status: Rinsing";

#[derive(Debug, Clone, Default)]
struct WasherView {
    active: bool,
    rinsing: bool,
    running: bool,
    remaining: i64,
    delay: u8,
    alert_sent: bool,
}

/// Accessory mapping for washers
pub struct WasherAccessory {
    device_id: String,
    display_name: String,
    devices: Arc<DeviceRegistry>,
    notifier: Option<Arc<dyn Notifier>>,
    view: Mutex<WasherView>,
}

impl std::fmt::Debug for WasherAccessory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasherAccessory")
            .field("device_id", &self.device_id)
            .field("display_name", &self.display_name)
            .field("view", &*self.view.lock())
            .finish()
    }
}

impl WasherAccessory {
    pub fn new(
        record: &DeviceRecord,
        devices: Arc<DeviceRegistry>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            device_id: record.id.clone(),
            display_name: record.display_name.clone(),
            devices,
            notifier,
            view: Mutex::new(WasherView::default()),
        }
    }

    /// Whether the washer is powered
    pub fn is_active(&self) -> bool {
        self.view.lock().active
    }

    /// Whether the rinse alert flag is raised
    pub fn is_alerting(&self) -> bool {
        self.view.lock().rinsing
    }

    /// Whether the start/pause switch shows "running"
    pub fn is_running(&self) -> bool {
        self.view.lock().running
    }

    /// Remaining minutes as shown on the gauge
    pub fn countdown(&self) -> i64 {
        self.view.lock().remaining
    }

    /// Selected start delay, in hours
    pub fn delay(&self) -> u8 {
        self.view.lock().delay
    }

    /// Pick the start delay used by the next start
    pub fn select_delay(&self, index: u8) -> Result<()> {
        if index > MAX_DELAY_INDEX {
            return Err(Error::invalid_command(format!(
                "delay must be between 0 and {} hours, got {}",
                MAX_DELAY_INDEX, index
            )));
        }
        self.view.lock().delay = index;
        info!("{}: start delay set to {}h", self.display_name, index);
        Ok(())
    }

    /// Power the washer off
    ///
    /// The registry resyncs the device after an accepted command, which
    /// refreshes every characteristic.
    pub async fn set_power(&self) -> bool {
        let command = NormalizedCommand::new()
            .with("location", "MAIN")
            .with("operation", "POWER_OFF");
        self.devices.send_command(&self.device_id, &command).await
    }

    /// Start a paused washer with the selected delay, or stop a running one
    pub async fn toggle_run(&self) -> bool {
        let (running, delay) = {
            let view = self.view.lock();
            (view.running, view.delay)
        };

        let command = if running {
            info!("{}: stopping cycle", self.display_name);
            NormalizedCommand::new()
                .with("location", "MAIN")
                .with("operation", "STOP")
        } else {
            info!("{}: starting cycle (delay {}h)", self.display_name, delay);
            NormalizedCommand::new()
                .with("location", "MAIN")
                .with("operation", "START")
                .with("delay_hours", delay)
        };

        self.devices.send_command(&self.device_id, &command).await
    }
}

impl Accessory for WasherAccessory {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn update_from_device(&self, record: &DeviceRecord) -> Result<()> {
        let Some(washer) = WasherState::from_state_map(&record.state) else {
            debug!("{}: no washer state yet", self.display_name);
            return Ok(());
        };

        let fire_alert = {
            let mut view = self.view.lock();
            view.active = washer.is_powered();
            view.rinsing = washer.is_rinsing();
            view.running =
                washer.is_powered() && !washer.is_paused() && washer.is_remote_start_enabled();
            view.remaining = washer.remain_time_m.unwrap_or(0).clamp(0, COUNTDOWN_MAX);

            let fire = view.rinsing && !view.alert_sent;
            view.alert_sent = view.rinsing;
            fire
        };

        debug!("{}: state {} applied", self.display_name, washer.state);

        if fire_alert {
            info!("{}: rinse phase started", self.display_name);
            if let Some(notifier) = &self.notifier {
                spawn_alert(Arc::clone(notifier), RINSE_ALERT);
            }
        }
        Ok(())
    }

    fn characteristics(&self) -> Vec<Characteristic> {
        let view = self.view.lock().clone();

        let mut characteristics = vec![
            Characteristic::new(
                CONTROLLER_NAME,
                HapService::Television,
                HapCharacteristic::Active,
                u8::from(view.active),
            ),
            Characteristic::new(
                CONTROLLER_NAME,
                HapService::Television,
                HapCharacteristic::ActiveIdentifier,
                view.delay,
            ),
            Characteristic::new(
                CONTROLLER_NAME,
                HapService::Television,
                HapCharacteristic::ConfiguredName,
                self.display_name.as_str(),
            ),
            Characteristic::new(
                SWITCH_NAME,
                HapService::Switch,
                HapCharacteristic::On,
                view.running,
            ),
            Characteristic::new(
                COUNTDOWN_NAME,
                HapService::HumiditySensor,
                HapCharacteristic::CurrentRelativeHumidity,
                view.remaining,
            ),
            Characteristic::new(
                STATUS_NAME,
                HapService::OccupancySensor,
                HapCharacteristic::OccupancyDetected,
                u8::from(view.rinsing),
            ),
            Characteristic::new(
                STATUS_NAME,
                HapService::OccupancySensor,
                HapCharacteristic::StatusActive,
                true,
            ),
            Characteristic::new(
                STATUS_NAME,
                HapService::OccupancySensor,
                HapCharacteristic::StatusTampered,
                u8::from(view.rinsing),
            ),
        ];

        characteristics.extend((0..=MAX_DELAY_INDEX).map(|hours| {
            Characteristic::new(
                format!("{}h", hours),
                HapService::InputSource,
                HapCharacteristic::Identifier,
                hours,
            )
        }));

        characteristics
    }
}

impl DeviceListener for WasherAccessory {
    fn on_device_update(&self, record: &DeviceRecord) -> Result<()> {
        self.update_from_device(record)
    }
}
