//! Test doubles and common utilities for registry contract tests
//!
//! This module provides a scripted plugin and recording listeners that let
//! the contract tests observe call order without any network.

#![allow(dead_code)]

use hapsync_core::error::{Error, Result};
use hapsync_core::{
    ApplianceDevice, BrandPlugin, DeviceCategory, DeviceListener, DeviceRecord, DeviceRegistry,
    DiscoveryInfo, FetchResult, NormalizedCommand, PluginRegistry, RegistryEvent, StateMap,
    StateValue, SyncConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const WASHER: &str = "DEVICE_WASHER";

/// Scripted reply to a state fetch
#[derive(Debug, Clone)]
pub enum FetchReply {
    State(StateMap),
    Unreachable,
    Fail(String),
    Panic,
}

/// Scripted reply to a command
#[derive(Debug, Clone, Copy)]
pub enum CommandReply {
    Accept,
    Refuse,
    Fail,
    Panic,
}

/// A BrandPlugin whose answers are set by the test
pub struct ScriptedPlugin {
    brand: String,
    /// Devices returned by discover_devices()
    devices: Arc<Mutex<Vec<DiscoveryInfo>>>,
    /// Reply per device id; devices without a reply are unreachable
    replies: Arc<Mutex<HashMap<String, FetchReply>>>,
    /// Reply applied after an accepted command
    after_command: Arc<Mutex<HashMap<String, FetchReply>>>,
    command_reply: Arc<Mutex<CommandReply>>,
    fetch_delay: Arc<Mutex<Duration>>,
    fail_discovery: bool,
    /// Call counter for fetch_state()
    fetch_call_count: Arc<AtomicUsize>,
    /// Call counter for send_command()
    command_call_count: Arc<AtomicUsize>,
    /// Shared ordered log of plugin calls and listener notifications
    call_log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPlugin {
    pub fn new(brand: &str) -> Self {
        Self {
            brand: brand.to_string(),
            devices: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(HashMap::new())),
            after_command: Arc::new(Mutex::new(HashMap::new())),
            command_reply: Arc::new(Mutex::new(CommandReply::Accept)),
            fetch_delay: Arc::new(Mutex::new(Duration::ZERO)),
            fail_discovery: false,
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
            command_call_count: Arc::new(AtomicUsize::new(0)),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A plugin whose discovery always fails
    pub fn failing_discovery(brand: &str) -> Self {
        Self {
            fail_discovery: true,
            ..Self::new(brand)
        }
    }

    /// Create a new ScriptedPlugin that shares script and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            brand: other.brand.clone(),
            devices: Arc::clone(&other.devices),
            replies: Arc::clone(&other.replies),
            after_command: Arc::clone(&other.after_command),
            command_reply: Arc::clone(&other.command_reply),
            fetch_delay: Arc::clone(&other.fetch_delay),
            fail_discovery: other.fail_discovery,
            fetch_call_count: Arc::clone(&other.fetch_call_count),
            command_call_count: Arc::clone(&other.command_call_count),
            call_log: Arc::clone(&other.call_log),
        }
    }

    pub fn with_device(self, info: DiscoveryInfo) -> Self {
        self.devices.lock().unwrap().push(info);
        self
    }

    pub fn set_reply(&self, device_id: &str, reply: FetchReply) {
        self.replies
            .lock()
            .unwrap()
            .insert(device_id.to_string(), reply);
    }

    /// Make the next fetches of a device return `reply` once a command is accepted
    pub fn set_reply_after_command(&self, device_id: &str, reply: FetchReply) {
        self.after_command
            .lock()
            .unwrap()
            .insert(device_id.to_string(), reply);
    }

    pub fn set_command_reply(&self, reply: CommandReply) {
        *self.command_reply.lock().unwrap() = reply;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// Get the number of times fetch_state() was called
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times send_command() was called
    pub fn command_call_count(&self) -> usize {
        self.command_call_count.load(Ordering::SeqCst)
    }

    /// Shared call log handle, for listeners that record into the same log
    pub fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_log)
    }

    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }
}

struct TestDevice {
    info: DiscoveryInfo,
}

impl ApplianceDevice for TestDevice {
    fn info(&self) -> &DiscoveryInfo {
        &self.info
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::Washer
    }
}

#[async_trait::async_trait]
impl BrandPlugin for ScriptedPlugin {
    fn brand(&self) -> &str {
        &self.brand
    }

    fn supported_device_types(&self) -> Vec<String> {
        vec![WASHER.to_string()]
    }

    async fn discover_devices(&self) -> Result<Vec<DiscoveryInfo>> {
        if self.fail_discovery {
            return Err(Error::transport("discovery unavailable"));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn fetch_state(&self, device_id: &str, _device_type: &str) -> Result<FetchResult> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        self.call_log
            .lock()
            .unwrap()
            .push(format!("fetch:{}", device_id));

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().unwrap().get(device_id).cloned();
        match reply {
            Some(FetchReply::State(state)) => Ok(FetchResult::Updated(state)),
            Some(FetchReply::Unreachable) | None => Ok(FetchResult::Unreachable),
            Some(FetchReply::Fail(message)) => Err(Error::transport(message)),
            Some(FetchReply::Panic) => panic!("fetch_state blew up for {}", device_id),
        }
    }

    async fn send_command(&self, device_id: &str, _command: &NormalizedCommand) -> Result<bool> {
        self.command_call_count.fetch_add(1, Ordering::SeqCst);
        self.call_log
            .lock()
            .unwrap()
            .push(format!("command:{}", device_id));

        let reply = *self.command_reply.lock().unwrap();
        match reply {
            CommandReply::Accept => {
                if let Some(next) = self.after_command.lock().unwrap().remove(device_id) {
                    self.set_reply(device_id, next);
                }
                Ok(true)
            }
            CommandReply::Refuse => Ok(false),
            CommandReply::Fail => Err(Error::transport("connection reset")),
            CommandReply::Panic => panic!("send_command blew up for {}", device_id),
        }
    }

    fn create_device(
        &self,
        device_type: &str,
        info: &DiscoveryInfo,
    ) -> Result<Arc<dyn ApplianceDevice>> {
        if device_type.eq_ignore_ascii_case(WASHER) {
            Ok(Arc::new(TestDevice { info: info.clone() }))
        } else {
            Err(Error::unsupported_device(device_type))
        }
    }
}

/// What a RecordingListener does when notified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerMode {
    Ok,
    Fail,
    Panic,
}

/// A listener that logs every notification into a shared log
pub struct RecordingListener {
    label: String,
    mode: ListenerMode,
    log: Arc<Mutex<Vec<String>>>,
    seen: Mutex<Vec<DeviceRecord>>,
}

impl RecordingListener {
    pub fn new(label: &str, mode: ListenerMode, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            mode,
            log,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<DeviceRecord> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl DeviceListener for RecordingListener {
    fn on_device_update(&self, record: &DeviceRecord) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("notify:{}:{}", self.label, record.id));
        self.seen.lock().unwrap().push(record.clone());

        match self.mode {
            ListenerMode::Ok => Ok(()),
            ListenerMode::Fail => Err(Error::listener(format!("{} rejected update", self.label))),
            ListenerMode::Panic => panic!("{} blew up", self.label),
        }
    }
}

/// Upcast a concrete listener for DeviceRegistry::subscribe
pub fn as_listener<L: DeviceListener + 'static>(listener: &Arc<L>) -> Arc<dyn DeviceListener> {
    Arc::clone(listener) as Arc<dyn DeviceListener>
}

pub fn washer_info(device_id: &str, brand: &str) -> DiscoveryInfo {
    DiscoveryInfo::new(device_id, brand, WASHER)
        .with_alias(format!("Washer {}", device_id))
        .with_model("F4WV")
}

/// Build a state map from string pairs
pub fn state_of(pairs: &[(&str, &str)]) -> StateMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), StateValue::from(*v)))
        .collect()
}

/// Sync settings suited for tests: short stop timeout, small channel
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        interval_secs: 1,
        stop_timeout_secs: 1,
        event_channel_capacity: 100,
    }
}

/// Wire a plugin into fresh registries
pub fn registry_with(
    plugin: ScriptedPlugin,
) -> (Arc<PluginRegistry>, Arc<DeviceRegistry>, mpsc::Receiver<RegistryEvent>) {
    let plugins = Arc::new(PluginRegistry::new());
    plugins.register(Arc::new(plugin));
    let (devices, events) = DeviceRegistry::new(Arc::clone(&plugins), test_sync_config());
    (plugins, devices, events)
}

/// Collect the events currently buffered in the channel
pub fn drain_events(rx: &mut mpsc::Receiver<RegistryEvent>) -> Vec<RegistryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
