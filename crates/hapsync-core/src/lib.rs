//! # hapsync-core
//!
//! Core library for the appliance state bridge.
//!
//! ## Architecture Overview
//!
//! This library keeps a normalized, in-memory view of vendor-cloud appliances:
//! - **BrandPlugin**: Trait for talking to one vendor's backend
//! - **PluginRegistry**: Brand → adapter lookup, fed by adapter factories
//! - **DeviceRegistry**: Device records, subscriptions, sync loop, commands
//! - **DeviceListener**: Trait for receiving record snapshots
//! - **discover_all**: Startup discovery across every plugin
//!
//! ## Design Principles
//!
//! 1. **Core-first**: The core never depends on an adapter crate
//! 2. **Static registration**: Adapters contribute factories at startup
//! 3. **Error isolation**: One device or listener failing never stops the rest
//! 4. **Snapshots out**: Callers only ever see cloned records

pub mod config;
pub mod device;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{BridgeConfig, HostConfig, NotifierConfig, PluginConfig, SyncConfig};
pub use device::{DeviceRecord, DiscoveryInfo, NormalizedCommand, StateMap, StateValue};
pub use discovery::{DiscoveredDevice, discover_all};
pub use engine::{DeviceRegistry, RegistryEvent, ResyncOutcome, SubscriptionId, TickReport};
pub use error::{Error, Result};
pub use registry::PluginRegistry;
pub use traits::{
    ApplianceDevice, BrandPlugin, DeviceCategory, DeviceListener, FetchResult, PluginFactory,
    listener_fn,
};
