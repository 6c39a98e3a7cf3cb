//! Attached-device registry.
//!
//! The registry owns every [`Device`] record, drains the transport's
//! marshaled notification queue from a single task, and resolves device
//! lookups either synchronously or through [`PendingLookup`] entries.
//!
//! # Lookup Semantics
//!
//! - Device present (or any device for the empty filter): resolves
//!   immediately.
//! - Zero timeout, no match: resolves immediately with not-found.
//! - Otherwise: a pending lookup is parked; whichever comes first of a
//!   matching connect notification and the timer expiry removes and
//!   resolves it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::DeviceId;
use crate::transport::{NotificationReceiver, SharedTransport, TransportNotification};

use super::device::Device;
use super::lookup::{DeviceFilter, PendingLookup};

// ============================================================================
// RegistryInner
// ============================================================================

/// Shared registry state.
struct RegistryInner {
    /// Transport adapter supplying notifications.
    transport: SharedTransport,
    /// Registered devices by id.
    devices: Mutex<FxHashMap<DeviceId, Device>>,
    /// Parked lookups by token.
    lookups: Mutex<FxHashMap<u64, PendingLookup>>,
    /// Token source for pending lookups.
    next_token: AtomicU64,
    /// Drain task handle, present while subscribed.
    drain_task: Mutex<Option<JoinHandle<()>>>,
}

impl RegistryInner {
    /// Registers a device from a connect notification.
    ///
    /// Duplicates and wifi-interface devices are rejected before
    /// registration. On success, every pending lookup whose filter matches
    /// is removed from the index and completed.
    fn register_device(&self, device: Device) {
        {
            let mut devices = self.devices.lock();

            if devices.contains_key(&device.id) {
                warn!(device = %device.id, "Duplicate connect notification ignored");
                return;
            }

            if device.interface.is_wifi() {
                info!(device = %device.id, "Skipping wifi-interface device");
                return;
            }

            devices.insert(device.id.clone(), device.clone());
        }

        info!(device = %device, paired = device.paired, "Device registered");

        // Remove matching lookups from the index before completing any of
        // them; completion must never observe its own entry.
        let matched: Vec<PendingLookup> = {
            let mut lookups = self.lookups.lock();
            let tokens: Vec<u64> = lookups
                .iter()
                .filter(|(_, lookup)| lookup.filter.matches(&device.id))
                .map(|(token, _)| *token)
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| lookups.remove(&token))
                .collect()
        };

        let count = matched.len();
        for lookup in matched {
            lookup.complete(device.clone());
        }

        if count > 0 {
            debug!(device = %device.id, count, "Satisfied pending lookups");
        }
    }

    /// Removes a device on a disconnect notification.
    fn unregister_device(&self, id: &DeviceId) {
        let removed = self.devices.lock().remove(id);

        if removed.is_some() {
            info!(device = %id, "Device unregistered");
        } else {
            debug!(device = %id, "Disconnect for unknown device ignored");
        }
    }

    /// Returns a registered device satisfying the filter, if any.
    fn find_match(&self, filter: &DeviceFilter) -> Option<Device> {
        let devices = self.devices.lock();
        match filter {
            DeviceFilter::Any => devices.values().next().cloned(),
            DeviceFilter::Id(id) => devices.get(id).cloned(),
        }
    }
}

// ============================================================================
// DeviceRegistry
// ============================================================================

/// Tracks attached devices and resolves device lookups.
///
/// Cloneable handle; all clones share one device table and one pending
/// lookup index.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    /// Creates a registry over a transport adapter.
    ///
    /// The registry is inert until [`subscribe`](Self::subscribe) arms the
    /// notification channel.
    #[must_use]
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transport,
                devices: Mutex::new(FxHashMap::default()),
                lookups: Mutex::new(FxHashMap::default()),
                next_token: AtomicU64::new(1),
                drain_task: Mutex::new(None),
            }),
        }
    }

    /// Arms the vendor notification channel and starts the drain task.
    ///
    /// Calling twice is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the transport's subscribe failure.
    pub fn subscribe(&self) -> Result<()> {
        let mut guard = self.inner.drain_task.lock();
        if guard.is_some() {
            return Ok(());
        }

        let rx = self.inner.transport.subscribe()?;
        let inner = Arc::clone(&self.inner);
        *guard = Some(tokio::spawn(Self::drain_notifications(inner, rx)));

        debug!("Device notifications armed");
        Ok(())
    }

    /// Disarms notifications and stops the drain task.
    pub fn unsubscribe(&self) {
        if let Some(handle) = self.inner.drain_task.lock().take() {
            handle.abort();
            self.inner.transport.unsubscribe();
            debug!("Device notifications disarmed");
        }
    }

    /// Returns the number of registered devices.
    #[inline]
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.inner.devices.lock().len()
    }

    /// Returns a snapshot of all registered devices.
    #[must_use]
    pub fn connected_devices(&self) -> Vec<Device> {
        self.inner.devices.lock().values().cloned().collect()
    }

    /// Resolves a device lookup.
    ///
    /// Resolves immediately when a registered device satisfies the filter.
    /// With a zero timeout and no match, fails immediately with not-found.
    /// Otherwise parks a pending lookup until a matching device registers
    /// or the timeout expires; the two completions are mutually
    /// exclusive.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceNotFound`] when no matching device appears in time.
    pub async fn lookup_device(
        &self,
        filter: DeviceFilter,
        wait: Duration,
    ) -> Result<Device> {
        if let Some(device) = self.inner.find_match(&filter) {
            return Ok(device);
        }

        if wait.is_zero() {
            return Err(Error::device_not_found(filter.to_string(), 0));
        }

        let (tx, mut rx) = oneshot::channel();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lookups
            .lock()
            .insert(token, PendingLookup::new(filter.clone(), tx));

        // A device may have registered between the miss and the insert.
        if let Some(device) = self.inner.find_match(&filter) {
            self.inner.lookups.lock().remove(&token);
            return Ok(device);
        }

        debug!(%filter, token, wait_ms = wait.as_millis() as u64, "Lookup parked");

        match timeout(wait, &mut rx).await {
            Ok(Ok(device)) => Ok(device),
            Ok(Err(_)) => {
                // Sender dropped without completing (registry shutdown).
                self.inner.lookups.lock().remove(&token);
                Err(Error::device_not_found(
                    filter.to_string(),
                    wait.as_millis() as u64,
                ))
            }
            Err(_) => {
                // Expiry removes the entry itself; if a registration won
                // the race the device is already in the channel.
                let was_pending = self.inner.lookups.lock().remove(&token).is_some();
                if !was_pending && let Ok(device) = rx.try_recv() {
                    return Ok(device);
                }

                debug!(%filter, token, "Lookup expired");
                Err(Error::device_not_found(
                    filter.to_string(),
                    wait.as_millis() as u64,
                ))
            }
        }
    }

    /// Drains the marshaled notification queue.
    async fn drain_notifications(inner: Arc<RegistryInner>, mut rx: NotificationReceiver) {
        while let Some(notification) = rx.recv().await {
            match notification {
                TransportNotification::Connected(device) => inner.register_device(device),
                TransportNotification::Disconnected(id) => inner.unregister_device(&id),
                TransportNotification::Unknown(code) => {
                    error!(code, "Unknown notification message code");
                }
            }
        }

        debug!("Notification channel closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
