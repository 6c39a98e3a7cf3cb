//! Builder pattern for bridge configuration.
//!
//! Provides a fluent API for configuring and creating [`Bridge`]
//! instances.
//!
//! # Example
//!
//! ```ignore
//! use device_bridge::Bridge;
//!
//! let (bridge, events) = Bridge::builder()
//!     .transport(adapter)
//!     .lookup_timeout(Duration::from_millis(1000))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::events::EventStream;
use crate::transport::SharedTransport;

use super::core::Bridge;

// ============================================================================
// Constants
// ============================================================================

/// Default device lookup window.
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(1000);

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for configuring a [`Bridge`] instance.
///
/// Use [`Bridge::builder()`] to create a new builder.
#[derive(Default)]
pub struct BridgeBuilder {
    /// Transport adapter.
    transport: Option<SharedTransport>,
    /// Device lookup window.
    lookup_timeout: Option<Duration>,
    /// Mirror relayed chunks to the diagnostic log.
    mirror_relays: bool,
}

// ============================================================================
// BridgeBuilder Implementation
// ============================================================================

impl BridgeBuilder {
    /// Creates a builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport adapter.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets how long device lookups wait for a matching attach.
    #[inline]
    #[must_use]
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    /// Mirrors every relayed chunk to the diagnostic log.
    #[inline]
    #[must_use]
    pub fn mirror_relays(mut self) -> Self {
        self.mirror_relays = true;
        self
    }

    /// Builds the bridge and its event stream.
    ///
    /// Arms device notifications as part of construction.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport was set
    /// - the transport's subscribe failure
    pub fn build(self) -> Result<(Bridge, EventStream)> {
        let transport = self
            .transport
            .ok_or_else(|| Error::config("bridge requires a transport adapter"))?;
        let lookup_timeout = self.lookup_timeout.unwrap_or(DEFAULT_LOOKUP_TIMEOUT);

        Bridge::new(transport, lookup_timeout, self.mirror_relays)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::mock::MockTransport;

    #[tokio::test]
    async fn test_build_requires_transport() {
        let err = BridgeBuilder::new().build().expect_err("no transport");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_with_transport() {
        let mock = MockTransport::shared();
        let (bridge, _events) = BridgeBuilder::new()
            .transport(mock)
            .lookup_timeout(Duration::from_millis(250))
            .mirror_relays()
            .build()
            .expect("built");
        assert_eq!(bridge.registry().device_count(), 0);
    }
}
