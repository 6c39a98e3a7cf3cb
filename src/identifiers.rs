//! Type-safe identifiers for devices, sessions, and service channels.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Backing | Source |
//! |------|---------|--------|
//! | [`DeviceId`] | `String` | Vendor transport (unique per attached device) |
//! | [`SessionId`] | `u64` | Process-local sequential counter |
//! | [`ConnectionId`] | `u64` | Transport adapter (opaque channel handle) |
//! | [`DeviceHandle`] | `u64` | Transport adapter (opaque device handle) |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// DeviceId
// ============================================================================

/// Unique identifier of an attached device, as reported by the transport.
///
/// Device IDs are opaque vendor strings (typically a 24-40 character
/// hardware identifier). Uniqueness among currently-registered devices is
/// enforced by the registry, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device ID from a vendor identifier string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Process-local identifier for a single request session.
///
/// Generated sequentially; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the next sequential session ID.
    #[must_use]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Identifier of a transport-level service channel.
///
/// Assigned by the transport adapter when a service is started. The raw
/// value is meaningful only to the adapter that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw adapter-assigned value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw adapter-assigned value.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

// ============================================================================
// DeviceHandle
// ============================================================================

/// Opaque per-device handle owned by the transport adapter.
///
/// The registry stores it on the [`Device`](crate::registry::Device) record
/// and threads it back into transport calls; it carries no meaning outside
/// the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    /// Wraps a raw adapter-assigned value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw adapter-assigned value.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new("00008101-000A1B2C3D4E5F60");
        assert_eq!(id.to_string(), "00008101-000A1B2C3D4E5F60");
        assert_eq!(id.as_str(), "00008101-000A1B2C3D4E5F60");
    }

    #[test]
    fn test_device_id_from_str() {
        let a: DeviceId = "abc".into();
        let b = DeviceId::new(String::from("abc"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_session_id_sequential() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::next();
        assert!(id.to_string().starts_with('s'));
    }

    #[test]
    fn test_connection_id_roundtrip() {
        let id = ConnectionId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
        assert_eq!(id.to_string(), "c42");
    }

    #[test]
    fn test_device_handle_roundtrip() {
        let handle = DeviceHandle::from_raw(7);
        assert_eq!(handle.as_raw(), 7);
    }
}
