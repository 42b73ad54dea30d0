//! Core traits for the hapsync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`BrandPlugin`]: Talk to one vendor's backend
//! - [`ApplianceDevice`]: Typed device object built by a plugin
//! - [`DeviceListener`]: Receive device record updates

pub mod listener;
pub mod plugin;

pub use listener::{DeviceListener, listener_fn};
pub use plugin::{ApplianceDevice, BrandPlugin, DeviceCategory, FetchResult, PluginFactory};
