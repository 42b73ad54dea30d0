//! Contract Test: Device Registration & Discovery
//!
//! Constraints verified:
//! - Registering the same id twice keeps the first record
//! - Lookups of unknown ids fail with DeviceNotFound
//! - Snapshots are detached from the registry
//! - Discovery skips failing plugins and unsupported device types

mod common;

use common::*;
use hapsync_core::{
    DeviceRegistry, DiscoveryInfo, Error, PluginRegistry, RegistryEvent, discover_all,
};
use std::sync::Arc;

#[tokio::test]
async fn duplicate_registration_keeps_original_record() {
    let (_plugins, devices, mut events) = registry_with(ScriptedPlugin::new("lg"));

    let first = devices.add_device(&washer_info("w1", "lg"));
    let again = devices.add_device(&washer_info("w1", "lg").with_alias("Renamed"));

    assert_eq!(first, again, "duplicate add returns the existing record");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices.get_device("w1").unwrap().display_name, "Washer w1");

    let added = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, RegistryEvent::DeviceAdded { .. }))
        .count();
    assert_eq!(added, 1, "DeviceAdded is emitted once");
}

#[tokio::test]
async fn new_device_starts_unsynced() {
    let (_plugins, devices, _events) = registry_with(ScriptedPlugin::new("lg"));

    let record = devices.add_device(&washer_info("w1", "LG"));

    assert_eq!(record.brand, "lg", "brand is stored lowercase");
    assert!(record.last_update.is_none());
    assert!(record.state.is_empty());
}

#[tokio::test]
async fn unknown_device_lookups_fail() {
    let (_plugins, devices, _events) = registry_with(ScriptedPlugin::new("lg"));
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let listener = RecordingListener::new("a", ListenerMode::Ok, log);

    assert!(matches!(
        devices.get_device("ghost"),
        Err(Error::DeviceNotFound(_))
    ));
    assert!(matches!(
        devices.subscribe("ghost", &as_listener(&listener)),
        Err(Error::DeviceNotFound(_))
    ));
}

#[tokio::test]
async fn all_devices_keep_insertion_order() {
    let (_plugins, devices, _events) = registry_with(ScriptedPlugin::new("lg"));

    for id in ["zeta", "alpha", "mid"] {
        devices.add_device(&washer_info(id, "lg"));
    }

    let ids: Vec<String> = devices.get_all_devices().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
}

#[tokio::test]
async fn snapshots_are_detached() {
    let (_plugins, devices, _events) = registry_with(ScriptedPlugin::new("lg"));
    devices.add_device(&washer_info("w1", "lg"));

    let mut snapshot = devices.get_device("w1").unwrap();
    snapshot.state = state_of(&[("state", "RUNNING")]);
    snapshot.online = true;

    let stored = devices.get_device("w1").unwrap();
    assert!(stored.state.is_empty());
    assert!(!stored.online);
}

#[tokio::test]
async fn discovery_skips_failing_plugins_and_unsupported_types() {
    let plugins = Arc::new(PluginRegistry::new());
    plugins.register(Arc::new(ScriptedPlugin::failing_discovery("acme")));
    plugins.register(Arc::new(
        ScriptedPlugin::new("lg")
            .with_device(washer_info("w1", "lg"))
            .with_device(DiscoveryInfo::new("fridge", "lg", "DEVICE_REFRIGERATOR"))
            .with_device(washer_info("w2", "lg")),
    ));
    let (devices, _events) = DeviceRegistry::new(Arc::clone(&plugins), test_sync_config());

    let discovered = discover_all(&plugins, &devices).await;

    let ids: Vec<&str> = discovered.iter().map(|d| d.record.id.as_str()).collect();
    assert_eq!(ids, vec!["w1", "w2"]);
    assert_eq!(devices.len(), 2, "unsupported devices are not registered");
    assert!(matches!(
        devices.get_device("fridge"),
        Err(Error::DeviceNotFound(_))
    ));
    assert_eq!(discovered[0].device.device_id(), "w1");
}
