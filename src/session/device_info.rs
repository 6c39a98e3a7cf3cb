//! Device attribute queries.
//!
//! [`DeviceInfoSession`] binds a device, copies a fixed set of attribute
//! values, and reports them as one `DeviceAttributes` event. Keys the
//! device does not expose are simply absent from the map.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::events::EventSink;
use crate::transport::SharedTransport;

use super::command::CommandSession;

// ============================================================================
// Constants
// ============================================================================

/// Attribute keys collected by an info query.
pub const DEVICE_INFO_KEYS: &[&str] = &[
    "DeviceName",
    "DeviceClass",
    "ProductType",
    "ProductVersion",
    "BuildVersion",
    "UniqueDeviceID",
];

// ============================================================================
// DeviceInfoSession
// ============================================================================

/// Session collecting device attributes.
pub struct DeviceInfoSession {
    base: CommandSession,
}

impl DeviceInfoSession {
    /// Creates an unbound info session.
    #[must_use]
    pub fn new(transport: SharedTransport, events: EventSink) -> Self {
        Self {
            base: CommandSession::new(transport, events),
        }
    }

    /// Returns the shared session core.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &CommandSession {
        &self.base
    }

    /// Collects the attribute map and emits it as an event.
    ///
    /// # Errors
    ///
    /// Connect-discipline errors, or transport failures while copying
    /// values.
    pub async fn query(&self) -> Result<BTreeMap<String, String>> {
        self.base.begin_operation();

        let connected = self.base.connect_device().await;
        let result = match connected {
            Ok(()) => self.query_inner().await,
            Err(e) => Err(e),
        };
        // Scoped release on every exit path.
        self.base.disconnect_device().await;

        if let Ok(attributes) = &result {
            self.base.events().device_attributes(attributes.clone());
        }

        self.base.finish_with(result)
    }

    async fn query_inner(&self) -> Result<BTreeMap<String, String>> {
        let device = self.base.device()?;
        let mut attributes = BTreeMap::new();

        for key in DEVICE_INFO_KEYS {
            match self.base.transport().copy_value(&device, key).await? {
                Some(value) => {
                    attributes.insert((*key).to_owned(), value);
                }
                None => debug!(key, "Device does not expose attribute"),
            }
        }

        debug!(count = attributes.len(), "Device attributes collected");
        Ok(attributes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::events::Event;
    use crate::identifiers::DeviceHandle;
    use crate::registry::{Device, DeviceInterface};
    use crate::session::SessionState;
    use crate::transport::mock::MockTransport;

    #[tokio::test]
    async fn test_query_collects_exposed_attributes() {
        let mock = MockTransport::shared();
        mock.set_value("DeviceName", "Lab Device");
        mock.set_value("ProductVersion", "15.1");

        let (events, mut rx) = EventSink::channel();
        let session = DeviceInfoSession::new(mock.clone(), events);
        session.session().bind_device(Device::new(
            "d1",
            DeviceInterface::Wired,
            true,
            DeviceHandle::from_raw(1),
        ));

        let attributes = session.query().await.expect("query");
        assert_eq!(
            attributes.get("DeviceName").map(String::as_str),
            Some("Lab Device")
        );
        assert_eq!(
            attributes.get("ProductVersion").map(String::as_str),
            Some("15.1")
        );
        // Unexposed keys are absent, not empty.
        assert!(!attributes.contains_key("BuildVersion"));

        match rx.try_recv().expect("event") {
            Event::DeviceAttributes { attributes: emitted } => {
                assert_eq!(emitted, attributes);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(session.session().state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_query_releases_device_on_failure() {
        let mock = MockTransport::shared();
        mock.fail_connect("unreachable");

        let (events, _rx) = EventSink::channel();
        let session = DeviceInfoSession::new(mock.clone(), events);
        session.session().bind_device(Device::new(
            "d1",
            DeviceInterface::Wired,
            true,
            DeviceHandle::from_raw(1),
        ));

        session.query().await.expect_err("connect fails");
        // Scoped release still ran.
        assert!(mock.calls().contains(&"disconnect".to_owned()));
        assert_eq!(session.session().state(), SessionState::Failed);
    }
}
