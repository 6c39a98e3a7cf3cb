//! The [`DeviceTransport`] trait and notification types.
//!
//! This is the single seam between the platform-agnostic engine and the
//! vendor device SDK. Adapters are expected to be thin: marshal arguments,
//! call the vendor API, translate status codes into [`Error`] variants.
//!
//! Vendor notification callbacks may arrive on arbitrary threads; adapters
//! deliver them through the channel returned by
//! [`DeviceTransport::subscribe`], and the registry drains that channel
//! from a single task. Nothing else in the crate touches vendor threads.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::DeviceId;
use crate::options::InstallOptions;
use crate::registry::Device;

use super::ServiceConnection;

// ============================================================================
// Types
// ============================================================================

/// Shared handle to a transport adapter.
pub type SharedTransport = Arc<dyn DeviceTransport>;

/// Receiving end of the marshaled notification queue.
pub type NotificationReceiver = mpsc::UnboundedReceiver<TransportNotification>;

/// Progress callback for transfer and install operations.
///
/// Called with a 0-100 percentage and a phase label supplied by the
/// transport.
pub type ProgressSink = Arc<dyn Fn(u32, &str) + Send + Sync>;

// ============================================================================
// TransportNotification
// ============================================================================

/// A device lifecycle notification from the vendor SDK.
///
/// Unknown message codes are preserved so the registry can log them as
/// non-fatal errors instead of silently dropping them.
#[derive(Debug, Clone)]
pub enum TransportNotification {
    /// A device was attached.
    Connected(Device),
    /// A device was detached.
    Disconnected(DeviceId),
    /// A message code this engine does not interpret.
    Unknown(u32),
}

// ============================================================================
// CapabilityQuery
// ============================================================================

/// A device capability/version probe.
///
/// Newer platform versions front the debug service with a secure proxy;
/// the session layer probes for that before choosing a service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityQuery {
    /// Device value key to compare against (a version-carrying key).
    pub key: String,
    /// Minimum major version at which the capability is present.
    pub minimum_version: u32,
}

impl CapabilityQuery {
    /// Creates a capability query.
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, minimum_version: u32) -> Self {
        Self {
            key: key.into(),
            minimum_version,
        }
    }

    /// Probe for the secure debug-service proxy (platform version 14+).
    #[inline]
    #[must_use]
    pub fn secure_proxy_service() -> Self {
        Self::new("ProductVersion", 14)
    }
}

// ============================================================================
// DeviceTransport
// ============================================================================

/// Narrow interface over the vendor device SDK.
///
/// One adapter implements this per target platform. All methods that talk
/// to a specific device take the registry's [`Device`] record, which
/// carries the adapter's opaque handle.
///
/// # Errors
///
/// Unless noted otherwise, methods translate vendor failures into the
/// matching operation-fatal [`Error`](crate::Error) variant.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    // ========================================================================
    // Notifications
    // ========================================================================

    /// Arms the vendor notification channel.
    ///
    /// Notifications arriving on vendor threads are marshaled onto the
    /// returned channel; the registry drains it from one task.
    fn subscribe(&self) -> Result<NotificationReceiver>;

    /// Disarms the vendor notification channel.
    fn unsubscribe(&self);

    // ========================================================================
    // Device Session
    // ========================================================================

    /// Opens the transport-level connection to the device.
    async fn connect(&self, device: &Device) -> Result<()>;

    /// Pairs with the device.
    async fn pair(&self, device: &Device) -> Result<()>;

    /// Validates an existing pairing record.
    async fn validate_pairing(&self, device: &Device) -> Result<()>;

    /// Starts a device session on an established connection.
    async fn start_session(&self, device: &Device) -> Result<()>;

    /// Stops the device session.
    async fn stop_session(&self, device: &Device) -> Result<()>;

    /// Closes the transport-level connection.
    async fn disconnect(&self, device: &Device) -> Result<()>;

    // ========================================================================
    // Device Values & Capabilities
    // ========================================================================

    /// Copies a named value from the device.
    ///
    /// Returns `None` when the device does not expose the key.
    async fn copy_value(&self, device: &Device, key: &str) -> Result<Option<String>>;

    /// Returns whether the device satisfies a capability/version probe.
    async fn capability_version_check(
        &self,
        device: &Device,
        query: &CapabilityQuery,
    ) -> Result<bool>;

    // ========================================================================
    // Operations
    // ========================================================================

    /// Mounts a developer disk image on the device.
    ///
    /// Adapters report an already-mounted image as success.
    async fn mount_disk_image(
        &self,
        device: &Device,
        image: &Path,
        signature: &Path,
    ) -> Result<()>;

    /// Starts an on-device service and returns its channel.
    async fn start_secure_service(
        &self,
        device: &Device,
        name: &str,
    ) -> Result<ServiceConnection>;

    /// Transfers an application bundle onto the device.
    ///
    /// `progress` is called with 0-100 percentages as the transfer
    /// advances.
    async fn transfer_app(
        &self,
        device: &Device,
        bundle: &Path,
        options: &InstallOptions,
        progress: ProgressSink,
    ) -> Result<()>;

    /// Installs a previously transferred application bundle.
    ///
    /// `progress` is called with 0-100 percentages as the install
    /// advances.
    async fn install_app(
        &self,
        device: &Device,
        bundle: &Path,
        options: &InstallOptions,
        progress: ProgressSink,
    ) -> Result<()>;

    // ========================================================================
    // Channel I/O
    // ========================================================================

    /// Writes bytes to a service channel; returns the count written.
    ///
    /// A zero return means the channel accepted nothing (would-block);
    /// callers own the retry policy.
    async fn send(&self, conn: &ServiceConnection, bytes: &[u8]) -> Result<usize>;

    /// Reads bytes from a service channel; returns the count read.
    ///
    /// A zero return with a non-empty buffer means end-of-stream.
    async fn receive(&self, conn: &ServiceConnection, buf: &mut [u8]) -> Result<usize>;

    /// Returns the raw socket descriptor backing a service channel.
    fn socket_descriptor(&self, conn: &ServiceConnection) -> Result<i32>;

    /// Closes a service channel. Idempotent.
    fn invalidate(&self, conn: &ServiceConnection);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_query_secure_proxy() {
        let query = CapabilityQuery::secure_proxy_service();
        assert_eq!(query.key, "ProductVersion");
        assert_eq!(query.minimum_version, 14);
    }

    #[test]
    fn test_trait_is_object_safe() {
        fn assert_object_safe(_: Option<&dyn DeviceTransport>) {}
        assert_object_safe(None);
    }
}
