//! Device records.
//!
//! A [`Device`] is created by the registry from a connect notification and
//! destroyed on the matching disconnect notification. The registry is the
//! owner; sessions receive value snapshots and must not assume the device
//! is still attached when they come to use one.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::identifiers::{DeviceHandle, DeviceId};

// ============================================================================
// DeviceInterface
// ============================================================================

/// Physical interface a device is attached over.
///
/// Only wired devices are registered; wifi-interface devices are skipped
/// at registration because the debug transport is unreliable over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInterface {
    /// Cable attachment.
    Wired,
    /// Network attachment.
    Wifi,
}

impl DeviceInterface {
    /// Returns `true` for network-attached devices.
    #[inline]
    #[must_use]
    pub const fn is_wifi(self) -> bool {
        matches!(self, Self::Wifi)
    }
}

impl fmt::Display for DeviceInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wired => f.write_str("wired"),
            Self::Wifi => f.write_str("wifi"),
        }
    }
}

// ============================================================================
// Device
// ============================================================================

/// One attached device, as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Vendor device identifier; unique among registered devices.
    pub id: DeviceId,
    /// Attachment interface.
    pub interface: DeviceInterface,
    /// Whether a pairing record already exists for this host.
    pub paired: bool,
    /// Opaque per-device handle owned by the transport adapter.
    pub handle: DeviceHandle,
}

impl Device {
    /// Creates a device record.
    #[inline]
    #[must_use]
    pub fn new(
        id: impl Into<DeviceId>,
        interface: DeviceInterface,
        paired: bool,
        handle: DeviceHandle,
    ) -> Self {
        Self {
            id: id.into(),
            interface,
            paired,
            handle,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.interface)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_is_wifi() {
        assert!(DeviceInterface::Wifi.is_wifi());
        assert!(!DeviceInterface::Wired.is_wifi());
    }

    #[test]
    fn test_device_display() {
        let device = Device::new(
            "d1",
            DeviceInterface::Wired,
            true,
            DeviceHandle::from_raw(1),
        );
        assert_eq!(device.to_string(), "d1 (wired)");
    }
}
