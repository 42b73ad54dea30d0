//! Device registry and sync loop
//!
//! The DeviceRegistry is responsible for:
//! - Holding the normalized record of every discovered device
//! - Polling each device's plugin on a fixed interval
//! - Applying state updates and notifying subscribers
//! - Routing commands to the owning plugin and resyncing afterwards
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────┐
//!  discovery ────────▶ │  DeviceRegistry  │ ◀──────── send_command
//!                      └──────────────────┘
//!                        │      │       │
//!          ┌─────────────┘      │       └──────────────┐
//!          ▼                    ▼                      ▼
//!  ┌──────────────┐     ┌──────────────┐      ┌──────────────┐
//!  │ BrandPlugin  │     │  Listeners   │      │    Events    │
//!  │ (fetch/send) │     │  (snapshot)  │      │  (monitor)   │
//!  └──────────────┘     └──────────────┘      └──────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Snapshot the device ids in insertion order
//! 2. For each device, fetch state from its plugin (no lock held)
//! 3. `Updated` replaces the state and notifies listeners
//! 4. `Unreachable` keeps the state and marks the device offline
//! 5. Any error or plugin panic is logged and the tick moves on to the next
//!    device
//!
//! Devices are processed one after another, so a slow backend delays the rest
//! of the tick.

use crate::config::SyncConfig;
use crate::device::{DeviceRecord, DiscoveryInfo, NormalizedCommand, StateMap};
use crate::error::{Error, Result};
use crate::registry::PluginRegistry;
use crate::traits::{DeviceListener, FetchResult};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle identifying one subscription on one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Per-tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Devices whose state was replaced
    pub updated: usize,
    /// Devices reported unreachable
    pub unreachable: usize,
    /// Devices whose resync failed
    pub failed: usize,
}

/// Result of resyncing a single device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// Fresh state was applied
    Updated,
    /// The device was unreachable; state kept, marked offline
    Unreachable,
}

/// Events emitted by the DeviceRegistry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A device was registered
    DeviceAdded { device_id: String, brand: String },

    /// New state applied to a device
    StateUpdated {
        device_id: String,
        /// Keys whose value was added, removed, or changed
        changed_keys: Vec<String>,
    },

    /// A device went from online to offline
    DeviceOffline { device_id: String },

    /// Resyncing a device failed
    ResyncFailed { device_id: String, error: String },

    /// A plugin accepted a command
    CommandSent { device_id: String },

    /// A command was not delivered
    CommandFailed { device_id: String, reason: String },

    /// A command was delivered but the following resync failed
    CommandResyncFailed { device_id: String, error: String },

    /// The sync loop started
    SyncStarted { interval: Duration },

    /// The sync loop stopped
    SyncStopped,

    /// A sync tick finished
    TickCompleted { report: TickReport },
}

struct Subscriber {
    id: SubscriptionId,
    listener: Weak<dyn DeviceListener>,
}

struct DeviceEntry {
    record: DeviceRecord,
    subscribers: Vec<Subscriber>,
}

impl DeviceEntry {
    /// Drop dead subscribers and upgrade the rest, in registration order
    fn live_listeners(&mut self) -> Vec<(SubscriptionId, Arc<dyn DeviceListener>)> {
        self.subscribers.retain(|s| s.listener.strong_count() > 0);
        self.subscribers
            .iter()
            .filter_map(|s| s.listener.upgrade().map(|l| (s.id, l)))
            .collect()
    }
}

#[derive(Default)]
struct DeviceTable {
    entries: HashMap<String, DeviceEntry>,
    /// Insertion order of device ids
    order: Vec<String>,
}

struct SyncHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Registry of normalized device records
///
/// The registry owns a single background sync task while syncing. The device
/// table lock is never held across an `.await` or while listeners run.
///
/// ## Lifecycle
///
/// 1. Create with [`DeviceRegistry::new()`]
/// 2. Register devices with [`DeviceRegistry::add_device()`]
/// 3. Start polling with [`DeviceRegistry::start_sync()`]
/// 4. Stop with [`DeviceRegistry::stop_sync()`] before dropping
pub struct DeviceRegistry {
    plugins: Arc<PluginRegistry>,
    table: RwLock<DeviceTable>,
    next_subscription: AtomicU64,
    config: SyncConfig,
    sync: Mutex<Option<SyncHandle>>,
    event_tx: mpsc::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create a new device registry
    ///
    /// # Returns
    ///
    /// A tuple of (registry, event_receiver) where event_receiver yields registry events
    pub fn new(
        plugins: Arc<PluginRegistry>,
        config: SyncConfig,
    ) -> (Arc<Self>, mpsc::Receiver<RegistryEvent>) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));

        let registry = Arc::new(Self {
            plugins,
            table: RwLock::new(DeviceTable::default()),
            next_subscription: AtomicU64::new(1),
            config,
            sync: Mutex::new(None),
            event_tx: tx,
        });

        (registry, rx)
    }

    /// Register a discovered device
    ///
    /// Registering an id twice keeps the first record and returns it.
    pub fn add_device(&self, info: &DiscoveryInfo) -> DeviceRecord {
        let record = {
            let mut table = self.table.write();
            if let Some(existing) = table.entries.get(&info.device_id) {
                warn!(
                    "{}, keeping existing record",
                    Error::already_exists(&info.device_id)
                );
                return existing.record.clone();
            }

            let record = DeviceRecord::from_discovery(info);
            table.order.push(record.id.clone());
            table.entries.insert(
                record.id.clone(),
                DeviceEntry {
                    record: record.clone(),
                    subscribers: Vec::new(),
                },
            );
            record
        };

        info!(
            "Registered device {} ({} {}, {})",
            record.id, record.brand, record.device_type, record.display_name
        );
        self.emit_event(RegistryEvent::DeviceAdded {
            device_id: record.id.clone(),
            brand: record.brand.clone(),
        });

        record
    }

    /// Snapshot of one device
    pub fn get_device(&self, device_id: &str) -> Result<DeviceRecord> {
        self.table
            .read()
            .entries
            .get(device_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| Error::device_not_found(device_id))
    }

    /// Snapshot of every device, in registration order
    pub fn get_all_devices(&self) -> Vec<DeviceRecord> {
        let table = self.table.read();
        table
            .order
            .iter()
            .filter_map(|id| table.entries.get(id))
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.table.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to updates of one device
    ///
    /// Only a weak reference is kept: dropping the last `Arc` ends the
    /// subscription.
    pub fn subscribe(
        &self,
        device_id: &str,
        listener: &Arc<dyn DeviceListener>,
    ) -> Result<SubscriptionId> {
        let mut table = self.table.write();
        let entry = table
            .entries
            .get_mut(device_id)
            .ok_or_else(|| Error::device_not_found(device_id))?;

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        entry.subscribers.push(Subscriber {
            id,
            listener: Arc::downgrade(listener),
        });
        debug!("Subscription {} added for device {}", id.0, device_id);

        Ok(id)
    }

    /// Remove a subscription
    ///
    /// # Returns
    ///
    /// `true` if the subscription existed
    pub fn unsubscribe(&self, device_id: &str, subscription: SubscriptionId) -> bool {
        let mut table = self.table.write();
        let Some(entry) = table.entries.get_mut(device_id) else {
            return false;
        };

        let before = entry.subscribers.len();
        entry.subscribers.retain(|s| s.id != subscription);
        entry.subscribers.len() != before
    }

    /// Replace a device's state and notify its subscribers
    ///
    /// Marks the device online and stamps `last_update`. Listeners run after
    /// the lock is released, in registration order, all with the same
    /// snapshot. A failing listener is logged and skipped.
    pub fn update_state(&self, device_id: &str, state: StateMap) -> Result<DeviceRecord> {
        let (snapshot, listeners, changed_keys) = {
            let mut table = self.table.write();
            let entry = table
                .entries
                .get_mut(device_id)
                .ok_or_else(|| Error::device_not_found(device_id))?;

            let changed_keys = changed_keys(&entry.record.state, &state);
            entry.record.state = state;
            entry.record.online = true;
            entry.record.last_update = Some(chrono::Utc::now());

            (entry.record.clone(), entry.live_listeners(), changed_keys)
        };

        debug!(
            "Device {} updated ({} changed keys)",
            device_id,
            changed_keys.len()
        );
        self.emit_event(RegistryEvent::StateUpdated {
            device_id: device_id.to_string(),
            changed_keys,
        });
        notify_listeners(&snapshot, &listeners);

        Ok(snapshot)
    }

    /// Fetch one device's state from its plugin and apply it
    ///
    /// # Returns
    ///
    /// - `Ok(ResyncOutcome::Updated)`: Fresh state applied
    /// - `Ok(ResyncOutcome::Unreachable)`: State kept, device marked offline
    /// - `Err(Error)`: Lookup, transport, or parse failure, or a plugin panic;
    ///   state untouched
    pub async fn resync_one(&self, device_id: &str) -> Result<ResyncOutcome> {
        let record = self.get_device(device_id)?;
        let plugin = self.plugins.lookup(&record.brand)?;

        let fetched = AssertUnwindSafe(plugin.fetch_state(device_id, &record.device_type))
            .catch_unwind()
            .await
            .map_err(|_| {
                Error::plugin(&record.brand, format!("fetch_state panicked for {}", device_id))
            })?;

        match fetched {
            Ok(FetchResult::Updated(state)) => {
                self.update_state(device_id, state)?;
                Ok(ResyncOutcome::Updated)
            }
            Ok(FetchResult::Unreachable) => {
                self.mark_offline(device_id)?;
                Ok(ResyncOutcome::Unreachable)
            }
            Err(e) if e.is_soft() => {
                debug!("Device {} unreachable: {}", device_id, e);
                self.mark_offline(device_id)?;
                Ok(ResyncOutcome::Unreachable)
            }
            Err(e) => Err(e),
        }
    }

    /// Resync every device once, sequentially
    pub async fn resync_all(&self) -> TickReport {
        self.run_tick(None).await
    }

    /// Send a command to a device through its plugin
    ///
    /// On acceptance the device is resynced before returning, so subscribers
    /// observe the new state first. A failure of that resync is reported as
    /// [`RegistryEvent::CommandResyncFailed`] and does not change the result.
    ///
    /// # Returns
    ///
    /// `true` if the plugin accepted the command
    pub async fn send_command(&self, device_id: &str, command: &NormalizedCommand) -> bool {
        let record = match self.get_device(device_id) {
            Ok(record) => record,
            Err(e) => {
                warn!("Cannot send command: {}", e);
                self.command_failed(device_id, &e);
                return false;
            }
        };

        let plugin = match self.plugins.lookup(&record.brand) {
            Ok(plugin) => plugin,
            Err(e) => {
                error!("Cannot send command to {}: {}", device_id, e);
                self.command_failed(device_id, &e);
                return false;
            }
        };

        let sent = match AssertUnwindSafe(plugin.send_command(device_id, command))
            .catch_unwind()
            .await
        {
            Ok(sent) => sent,
            Err(_) => Err(Error::plugin(
                &record.brand,
                format!("send_command panicked for {}", device_id),
            )),
        };

        match sent {
            Ok(true) => {
                info!("Command {} accepted for {}", command.to_json(), device_id);
                self.emit_event(RegistryEvent::CommandSent {
                    device_id: device_id.to_string(),
                });

                if let Err(e) = self.resync_one(device_id).await {
                    warn!("Resync after command failed for {}: {}", device_id, e);
                    self.emit_event(RegistryEvent::CommandResyncFailed {
                        device_id: device_id.to_string(),
                        error: e.to_string(),
                    });
                }
                true
            }
            Ok(false) => {
                warn!("Command {} refused for {}", command.to_json(), device_id);
                self.emit_event(RegistryEvent::CommandFailed {
                    device_id: device_id.to_string(),
                    reason: "refused by plugin".to_string(),
                });
                false
            }
            Err(e) => {
                error!("Command to {} failed: {}", device_id, e);
                self.command_failed(device_id, &e);
                false
            }
        }
    }

    /// Start the background sync loop
    ///
    /// A zero interval falls back to the configured default. Must be called
    /// from within a tokio runtime. A previous loop whose task has already
    /// ended is replaced.
    ///
    /// # Returns
    ///
    /// `false` if a live loop is already running or no runtime is available
    pub fn start_sync(self: &Arc<Self>, interval: Duration) -> bool {
        let mut sync = self.sync.lock();
        if let Some(handle) = sync.as_ref() {
            if !handle.task.is_finished() {
                warn!("Sync loop already running");
                return false;
            }
            warn!("Previous sync loop has ended, replacing it");
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot start sync loop without a tokio runtime: {}", e);
                return false;
            }
        };

        let interval = if interval.is_zero() {
            self.config.interval()
        } else {
            interval
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let task = runtime.spawn(async move { registry.sync_loop(interval, stop_rx).await });

        *sync = Some(SyncHandle { stop_tx, task });
        info!("Sync loop started (interval {:?})", interval);
        self.emit_event(RegistryEvent::SyncStarted { interval });

        true
    }

    /// Stop the background sync loop and wait for it to exit
    ///
    /// The in-flight device finishes; remaining devices of the tick are
    /// skipped. If the loop does not exit within the stop timeout it is
    /// aborted. Calling this while stopped is a no-op.
    pub async fn stop_sync(&self) {
        let Some(SyncHandle { stop_tx, mut task }) = self.sync.lock().take() else {
            debug!("Sync loop not running");
            return;
        };

        let _ = stop_tx.send(true);

        match tokio::time::timeout(self.config.stop_timeout(), &mut task).await {
            Ok(Ok(())) => info!("Sync loop stopped"),
            Ok(Err(e)) => error!("Sync loop ended abnormally: {}", e),
            Err(_) => {
                error!(
                    "Sync loop did not stop within {:?}, aborting",
                    self.config.stop_timeout()
                );
                task.abort();
                let _ = task.await;
            }
        }

        self.emit_event(RegistryEvent::SyncStopped);
    }

    /// Whether the sync loop is running
    pub fn is_syncing(&self) -> bool {
        self.sync
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    async fn sync_loop(&self, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let report = self.run_tick(Some(&stop_rx)).await;
            debug!(
                "Tick completed: {} updated, {} unreachable, {} failed",
                report.updated, report.unreachable, report.failed
            );
            self.emit_event(RegistryEvent::TickCompleted { report });

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Sync loop exiting");
    }

    async fn run_tick(&self, stop_rx: Option<&watch::Receiver<bool>>) -> TickReport {
        let ids: Vec<String> = self.table.read().order.clone();
        let mut report = TickReport::default();

        for device_id in ids {
            if stop_rx.is_some_and(|rx| *rx.borrow()) {
                debug!("Stop requested, ending tick early");
                break;
            }

            match self.resync_one(&device_id).await {
                Ok(ResyncOutcome::Updated) => report.updated += 1,
                Ok(ResyncOutcome::Unreachable) => {
                    debug!("Device {} unreachable", device_id);
                    report.unreachable += 1;
                }
                Err(e) => {
                    error!("Resync failed for {}: {}", device_id, e);
                    report.failed += 1;
                    self.emit_event(RegistryEvent::ResyncFailed {
                        device_id: device_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Mark a device offline, notifying only when it was online
    fn mark_offline(&self, device_id: &str) -> Result<()> {
        let flipped = {
            let mut table = self.table.write();
            let entry = table
                .entries
                .get_mut(device_id)
                .ok_or_else(|| Error::device_not_found(device_id))?;

            if entry.record.online {
                entry.record.online = false;
                Some((entry.record.clone(), entry.live_listeners()))
            } else {
                None
            }
        };

        if let Some((snapshot, listeners)) = flipped {
            info!("Device {} went offline", device_id);
            self.emit_event(RegistryEvent::DeviceOffline {
                device_id: device_id.to_string(),
            });
            notify_listeners(&snapshot, &listeners);
        }

        Ok(())
    }

    fn command_failed(&self, device_id: &str, error: &Error) {
        self.emit_event(RegistryEvent::CommandFailed {
            device_id: device_id.to_string(),
            reason: error.to_string(),
        });
    }

    /// Emit a registry event
    ///
    /// A full channel drops the event with a warning; a closed channel means
    /// nobody is listening and the event is discarded silently.
    fn emit_event(&self, event: RegistryEvent) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.event_tx.try_send(event) {
            warn!(
                "Event channel full, dropping event {:?}. Consider increasing event_channel_capacity.",
                dropped
            );
        }
    }
}

/// Invoke listeners in order, containing errors and panics
fn notify_listeners(snapshot: &DeviceRecord, listeners: &[(SubscriptionId, Arc<dyn DeviceListener>)]) {
    for (id, listener) in listeners {
        match catch_unwind(AssertUnwindSafe(|| listener.on_device_update(snapshot))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                "Listener {} failed for device {}: {}",
                id.0, snapshot.id, e
            ),
            Err(_) => error!("Listener {} panicked for device {}", id.0, snapshot.id),
        }
    }
}

fn changed_keys(old: &StateMap, new: &StateMap) -> Vec<String> {
    let mut keys: Vec<String> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    keys.extend(old.keys().filter(|k| !new.contains_key(*k)).cloned());
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StateValue;

    fn state(pairs: &[(&str, &str)]) -> StateMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), StateValue::from(*v)))
            .collect()
    }

    #[test]
    fn changed_keys_covers_added_removed_and_modified() {
        let old = state(&[("state", "RUNNING"), ("error", "none"), ("same", "x")]);
        let new = state(&[("state", "RINSING"), ("same", "x"), ("extra", "1")]);

        assert_eq!(changed_keys(&old, &new), vec!["error", "extra", "state"]);
    }

    #[tokio::test]
    async fn update_unknown_device_fails() {
        let (registry, _rx) = DeviceRegistry::new(Arc::new(PluginRegistry::new()), SyncConfig::default());

        assert!(matches!(
            registry.update_state("ghost", StateMap::new()),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn full_event_channel_does_not_block_updates() {
        let config = SyncConfig {
            event_channel_capacity: 1,
            ..SyncConfig::default()
        };
        let (registry, _rx) = DeviceRegistry::new(Arc::new(PluginRegistry::new()), config);

        registry.add_device(&DiscoveryInfo::new("w1", "lg", "DEVICE_WASHER"));
        for _ in 0..5 {
            registry
                .update_state("w1", state(&[("state", "RUNNING")]))
                .unwrap();
        }

        assert!(registry.get_device("w1").unwrap().online);
    }

    #[tokio::test]
    async fn ended_loop_is_replaced_on_start() {
        let (registry, _rx) = DeviceRegistry::new(Arc::new(PluginRegistry::new()), SyncConfig::default());

        let (stop_tx, _stop_rx) = watch::channel(false);
        let task = tokio::spawn(async {});
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        *registry.sync.lock() = Some(SyncHandle { stop_tx, task });

        assert!(!registry.is_syncing());
        assert!(registry.start_sync(Duration::from_millis(50)));
        assert!(registry.is_syncing());
        registry.stop_sync().await;
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let (registry, _rx) = DeviceRegistry::new(Arc::new(PluginRegistry::new()), SyncConfig::default());
        registry.add_device(&DiscoveryInfo::new("w1", "lg", "DEVICE_WASHER"));

        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let listener = crate::traits::listener_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let id = registry.subscribe("w1", &listener).unwrap();
        registry.update_state("w1", StateMap::new()).unwrap();
        assert!(registry.unsubscribe("w1", id));
        assert!(!registry.unsubscribe("w1", id));
        registry.update_state("w1", StateMap::new()).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
