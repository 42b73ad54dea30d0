//! # hapsync-accessory
//!
//! Presentation layer between the device registry and an accessory host.
//!
//! - **Accessory**: Trait every presented device implements
//! - **WasherAccessory**: Power, start/pause, delay picker, countdown and
//!   rinse alert for washers
//! - **AccessoryBridge**: Picks the accessory for a device and subscribes it
//! - **AccessoryHost**: Where accessories are published
//! - **Notifier**: Out-of-band alerts (Telegram)

pub mod accessory;
pub mod bridge;
pub mod hap;
pub mod host;
pub mod notifier;
pub mod washer;

pub use accessory::{Accessory, InfoAccessory};
pub use bridge::AccessoryBridge;
pub use hap::{Characteristic, HapCharacteristic, HapService};
pub use host::{AccessoryHost, LocalAccessoryHost};
pub use notifier::{Notifier, TelegramNotifier};
pub use washer::WasherAccessory;
