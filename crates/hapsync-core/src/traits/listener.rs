//! Device update subscribers

use crate::device::DeviceRecord;
use std::sync::Arc;

/// Receives a snapshot every time a subscribed device's record changes
///
/// Listeners run synchronously on the task that applied the update, after the
/// registry lock has been released. An `Err` is logged by the registry and
/// does not affect other listeners or the stored state.
pub trait DeviceListener: Send + Sync {
    fn on_device_update(&self, record: &DeviceRecord) -> Result<(), crate::Error>;
}

impl<F> DeviceListener for F
where
    F: Fn(&DeviceRecord) -> Result<(), crate::Error> + Send + Sync,
{
    fn on_device_update(&self, record: &DeviceRecord) -> Result<(), crate::Error> {
        self(record)
    }
}

/// Wrap a closure as a shareable listener
///
/// The registry only keeps a weak reference, so the caller must hold on to
/// the returned `Arc` for as long as updates should be delivered.
pub fn listener_fn<F>(f: F) -> Arc<dyn DeviceListener>
where
    F: Fn(&DeviceRecord) -> Result<(), crate::Error> + Send + Sync + 'static,
{
    Arc::new(f)
}
