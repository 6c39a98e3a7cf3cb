//! Service channel handle.
//!
//! A [`ServiceConnection`] represents one transport-level channel to an
//! on-device service. The handle is deliberately not `Clone`: exactly one
//! owner holds it at a time. It starts out owned by the session that
//! started the service and moves to whichever consumer takes over after a
//! successful launch handoff (the run loop or a relay pairing).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::identifiers::ConnectionId;

// ============================================================================
// ServiceConnection
// ============================================================================

/// Opaque handle to one transport-level service channel.
///
/// All I/O on the channel goes through
/// [`DeviceTransport::send`](super::DeviceTransport::send) and
/// [`DeviceTransport::receive`](super::DeviceTransport::receive) with this
/// handle. Closing the channel is explicit via
/// [`DeviceTransport::invalidate`](super::DeviceTransport::invalidate);
/// dropping the handle does not close it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ServiceConnection {
    /// Adapter-assigned channel identifier.
    id: ConnectionId,
}

impl ServiceConnection {
    /// Wraps an adapter-assigned channel identifier.
    ///
    /// Called by transport adapters when a service start succeeds.
    #[inline]
    #[must_use]
    pub const fn new(id: ConnectionId) -> Self {
        Self { id }
    }

    /// Returns the channel identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

impl fmt::Display for ServiceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn({})", self.id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_accessor() {
        let conn = ServiceConnection::new(ConnectionId::from_raw(3));
        assert_eq!(conn.id(), ConnectionId::from_raw(3));
    }

    #[test]
    fn test_display() {
        let conn = ServiceConnection::new(ConnectionId::from_raw(9));
        assert_eq!(conn.to_string(), "conn(c9)");
    }
}
