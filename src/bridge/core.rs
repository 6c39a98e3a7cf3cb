//! Bridge coordinator.
//!
//! The [`Bridge`] wires the registry, sessions, run loop, and relay
//! servers together behind the operations an orchestrator dispatches:
//! install, run, install-and-run, and device-info. Results and progress
//! flow through the event stream returned at build time.
//!
//! # Example
//!
//! ```ignore
//! use device_bridge::{Bridge, DeviceFilter, RunOptions};
//!
//! let (bridge, mut events) = Bridge::builder().transport(adapter).build()?;
//! let run = bridge
//!     .install_and_run(
//!         DeviceFilter::Any,
//!         Path::new("/builds/Demo.app"),
//!         &InstallOptions::new(),
//!         &RunOptions::new("/apps/Demo.app/Demo"),
//!     )
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::events::{EventSink, EventStream};
use crate::options::{InstallOptions, RunOptions};
use crate::registry::{Device, DeviceFilter, DeviceRegistry};
use crate::relay::{
    RelaySupervisor, ServiceDialer, start_debug_relays, start_lazy_relays,
};
use crate::runner::{GdbRunner, RunHandle, StopHandle};
use crate::session::{AppOpSession, DeviceInfoSession};
use crate::transport::{ServiceConnection, SharedTransport};

use super::builder::BridgeBuilder;

// ============================================================================
// AppRun
// ============================================================================

/// A running application, in one of the two post-launch modes.
pub enum AppRun {
    /// The autonomous run loop owns the launched channel; relay servers
    /// stand by for late-attaching clients.
    Autonomous {
        /// Handle to the run loop.
        run: RunHandle,
        /// Standby relay servers.
        relays: RelaySupervisor,
    },

    /// A full debugger owns the launched channel through the exclusive
    /// relay.
    Debugged {
        /// The relay servers carrying the session.
        relays: RelaySupervisor,
    },
}

impl AppRun {
    /// Returns the (debugger, auxiliary) relay ports.
    #[inline]
    #[must_use]
    pub fn relay_ports(&self) -> (u16, u16) {
        match self {
            Self::Autonomous { relays, .. } | Self::Debugged { relays } => relays.ports(),
        }
    }

    /// Returns a stop requester, available in autonomous mode.
    #[must_use]
    pub fn stop_handle(&self) -> Option<StopHandle> {
        match self {
            Self::Autonomous { run, .. } => Some(run.stop_handle()),
            Self::Debugged { .. } => None,
        }
    }
}

// ============================================================================
// DebugServiceDialer
// ============================================================================

/// Dials a fresh debug-service channel for one relay client.
struct DebugServiceDialer {
    transport: SharedTransport,
    device: Device,
    service: &'static str,
}

#[async_trait]
impl ServiceDialer for DebugServiceDialer {
    async fn dial(&self) -> Result<ServiceConnection> {
        self.transport
            .start_secure_service(&self.device, self.service)
            .await
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Coordinator for device operations.
///
/// Cloneable handle; all clones share one registry and one event sink.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    transport: SharedTransport,
    registry: DeviceRegistry,
    events: EventSink,
    lookup_timeout: Duration,
    mirror_relays: bool,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("lookup_timeout", &self.inner.lookup_timeout)
            .field("mirror_relays", &self.inner.mirror_relays)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Bridge - Construction
// ============================================================================

impl Bridge {
    /// Creates a configuration builder for the bridge.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Creates a bridge over a transport adapter and arms device
    /// notifications.
    pub(crate) fn new(
        transport: SharedTransport,
        lookup_timeout: Duration,
        mirror_relays: bool,
    ) -> Result<(Self, EventStream)> {
        let (events, stream) = EventSink::channel();
        let registry = DeviceRegistry::new(Arc::clone(&transport));
        registry.subscribe()?;

        info!(lookup_timeout_ms = lookup_timeout.as_millis() as u64, "Bridge initialized");

        let bridge = Self {
            inner: Arc::new(BridgeInner {
                transport,
                registry,
                events,
                lookup_timeout,
                mirror_relays,
            }),
        };
        Ok((bridge, stream))
    }

    /// Returns the device registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    /// Shuts down device notifications.
    pub fn shutdown(&self) {
        self.inner.registry.unsubscribe();
        debug!("Bridge shut down");
    }
}

// ============================================================================
// Bridge - Operations
// ============================================================================

impl Bridge {
    /// Installs an application bundle on a matching device.
    ///
    /// # Errors
    ///
    /// Device lookup, connect-discipline, transfer, or install failures.
    pub async fn install(
        &self,
        filter: DeviceFilter,
        bundle: &Path,
        options: &InstallOptions,
    ) -> Result<()> {
        let session = self.app_session();
        session
            .session()
            .await_device(&self.inner.registry, filter, self.inner.lookup_timeout)
            .await?;
        session.install(bundle, options).await
    }

    /// Launches an application on a matching device.
    ///
    /// In autonomous mode the run loop owns the launched channel and
    /// standby relays serve late attachers; with
    /// [`RunOptions::attach_debugger`] the launched channel goes to the
    /// exclusive debugger relay. Either way the relay port pair is
    /// published on the event stream.
    ///
    /// # Errors
    ///
    /// Device lookup, connect-discipline, mount, service-start, or
    /// handshake failures.
    pub async fn run(&self, filter: DeviceFilter, options: &RunOptions) -> Result<AppRun> {
        let session = self.app_session();
        session
            .session()
            .await_device(&self.inner.registry, filter, self.inner.lookup_timeout)
            .await?;
        self.launch(&session, options).await
    }

    /// Installs, then launches, on one bound device.
    ///
    /// # Errors
    ///
    /// Any install or launch failure; install failures stop the request
    /// before launch.
    pub async fn install_and_run(
        &self,
        filter: DeviceFilter,
        bundle: &Path,
        install_options: &InstallOptions,
        run_options: &RunOptions,
    ) -> Result<AppRun> {
        let session = self.app_session();
        session
            .session()
            .await_device(&self.inner.registry, filter, self.inner.lookup_timeout)
            .await?;

        session.install(bundle, install_options).await?;
        self.launch(&session, run_options).await
    }

    /// Collects device attributes for a matching device.
    ///
    /// # Errors
    ///
    /// Device lookup or connect-discipline failures.
    pub async fn device_info(&self, filter: DeviceFilter) -> Result<BTreeMap<String, String>> {
        let session = DeviceInfoSession::new(
            Arc::clone(&self.inner.transport),
            self.inner.events.clone(),
        );
        session
            .session()
            .await_device(&self.inner.registry, filter, self.inner.lookup_timeout)
            .await?;
        session.query().await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn app_session(&self) -> AppOpSession {
        AppOpSession::new(
            Arc::clone(&self.inner.transport),
            self.inner.events.clone(),
        )
    }

    /// Launches on an already-bound session and hands off the channel.
    async fn launch(&self, session: &AppOpSession, options: &RunOptions) -> Result<AppRun> {
        let launched = session.run(options).await?;
        let device = session.session().device()?;

        let dialer = |service: &'static str| -> Arc<dyn ServiceDialer> {
            Arc::new(DebugServiceDialer {
                transport: Arc::clone(&self.inner.transport),
                device: device.clone(),
                service,
            })
        };

        let app_run = if options.attach_debugger {
            let conn = launched.client.into_connection();
            let relays = start_debug_relays(
                Arc::clone(&self.inner.transport),
                conn,
                dialer(launched.service),
                self.inner.mirror_relays,
            )
            .await?;
            AppRun::Debugged { relays }
        } else {
            let relays = start_lazy_relays(
                Arc::clone(&self.inner.transport),
                dialer(launched.service),
                dialer(launched.service),
                self.inner.mirror_relays,
            )
            .await?;

            let runner = GdbRunner::new(Arc::new(launched.client), self.inner.events.clone());

            // Publish ports before the run loop can emit anything.
            let (gdb_port, aux_port) = relays.ports();
            self.inner.events.relay_ports(gdb_port, aux_port);

            let run = runner.spawn();
            return Ok(AppRun::Autonomous { run, relays });
        };

        let (gdb_port, aux_port) = app_run.relay_ports();
        self.inner.events.relay_ports(gdb_port, aux_port);
        Ok(app_run)
    }
}

// ============================================================================
// Tests
// ============================================================================
