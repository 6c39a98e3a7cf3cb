//! Pending device lookups.
//!
//! When a lookup misses, the registry parks a [`PendingLookup`] in an
//! index keyed by a lookup token. The entry is destroyed on exactly one of
//! two paths: a matching connect notification, or the caller's timer
//! expiring. Removal from the index always happens before the completion
//! channel fires, so a lookup can never be completed twice.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::oneshot;

use crate::identifiers::DeviceId;

use super::Device;

// ============================================================================
// DeviceFilter
// ============================================================================

/// Which device a lookup is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFilter {
    /// Any registered device matches.
    Any,
    /// Only the device with this identifier matches.
    Id(DeviceId),
}

impl DeviceFilter {
    /// Returns `true` if the given device satisfies this filter.
    #[inline]
    #[must_use]
    pub fn matches(&self, id: &DeviceId) -> bool {
        match self {
            Self::Any => true,
            Self::Id(wanted) => wanted == id,
        }
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

impl From<DeviceId> for DeviceFilter {
    fn from(id: DeviceId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for DeviceFilter {
    fn from(id: &str) -> Self {
        if id.is_empty() {
            Self::Any
        } else {
            Self::Id(DeviceId::new(id))
        }
    }
}

// ============================================================================
// PendingLookup
// ============================================================================

/// A deferred device-discovery request awaiting a matching connect
/// notification or its caller's timeout.
#[derive(Debug)]
pub(crate) struct PendingLookup {
    /// Filter a newly registered device is matched against.
    pub filter: DeviceFilter,
    /// Completion channel back to the waiting caller.
    pub tx: oneshot::Sender<Device>,
}

impl PendingLookup {
    /// Creates a pending lookup.
    #[inline]
    pub(crate) fn new(filter: DeviceFilter, tx: oneshot::Sender<Device>) -> Self {
        Self { filter, tx }
    }

    /// Completes the lookup with a matched device.
    ///
    /// The entry must already have been removed from the index.
    pub(crate) fn complete(self, device: Device) {
        // Receiver may have timed out between removal and completion.
        let _ = self.tx.send(device);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::DeviceHandle;
    use crate::registry::DeviceInterface;

    #[test]
    fn test_filter_any_matches_everything() {
        let filter = DeviceFilter::Any;
        assert!(filter.matches(&DeviceId::new("a")));
        assert!(filter.matches(&DeviceId::new("b")));
    }

    #[test]
    fn test_filter_id_matches_exactly() {
        let filter = DeviceFilter::Id(DeviceId::new("a"));
        assert!(filter.matches(&DeviceId::new("a")));
        assert!(!filter.matches(&DeviceId::new("b")));
    }

    #[test]
    fn test_filter_from_empty_str_is_any() {
        assert_eq!(DeviceFilter::from(""), DeviceFilter::Any);
        assert_eq!(
            DeviceFilter::from("d1"),
            DeviceFilter::Id(DeviceId::new("d1"))
        );
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(DeviceFilter::Any.to_string(), "any");
        assert_eq!(DeviceFilter::Id(DeviceId::new("d1")).to_string(), "d1");
    }

    #[tokio::test]
    async fn test_complete_delivers_device() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let lookup = PendingLookup::new(DeviceFilter::Any, tx);
        let device = Device::new(
            "d1",
            DeviceInterface::Wired,
            true,
            DeviceHandle::from_raw(1),
        );

        lookup.complete(device.clone());
        assert_eq!(rx.await.expect("delivered"), device);
    }

    #[test]
    fn test_complete_after_receiver_dropped_is_silent() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(rx);
        let lookup = PendingLookup::new(DeviceFilter::Any, tx);
        let device = Device::new(
            "d1",
            DeviceInterface::Wired,
            true,
            DeviceHandle::from_raw(1),
        );
        // Must not panic.
        lookup.complete(device);
    }
}
