//! Device bind and connect discipline.
//!
//! [`CommandSession`] carries the state every operation shares: the bound
//! device snapshot, the lifecycle state, and the connect/pair/validate/
//! start-session sequence with its scoped release.
//!
//! Each connect step fails distinctly and is non-retryable for the
//! request; [`disconnect_device`](CommandSession::disconnect_device) runs
//! on every exit path, including failed connects.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::identifiers::SessionId;
use crate::registry::{Device, DeviceFilter, DeviceRegistry};
use crate::transport::SharedTransport;

use super::SessionState;

// ============================================================================
// CommandSession
// ============================================================================

/// Shared per-request session core.
pub struct CommandSession {
    transport: SharedTransport,
    events: EventSink,
    id: SessionId,
    state: Mutex<SessionState>,
    device: Mutex<Option<Device>>,
}

impl CommandSession {
    /// Creates an unbound session.
    #[must_use]
    pub fn new(transport: SharedTransport, events: EventSink) -> Self {
        let id = SessionId::next();
        debug!(session = %id, "Session created");
        Self {
            transport,
            events,
            id,
            state: Mutex::new(SessionState::Created),
            device: Mutex::new(None),
        }
    }

    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Returns the event sink.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Returns the transport handle.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Returns the bound device snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when no device has been bound.
    pub fn device(&self) -> Result<Device> {
        self.device
            .lock()
            .clone()
            .ok_or_else(|| Error::config("session has no bound device"))
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        debug!(session = %self.id, from = %state, to = %next, "Session state");
        *state = next;
    }

    // ========================================================================
    // Device Binding
    // ========================================================================

    /// Binds a device through the registry.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceNotFound`] when no matching device appears in time;
    /// the session moves to `Failed`.
    pub async fn await_device(
        &self,
        registry: &DeviceRegistry,
        filter: DeviceFilter,
        wait: Duration,
    ) -> Result<()> {
        self.set_state(SessionState::AwaitingDevice);

        match registry.lookup_device(filter, wait).await {
            Ok(device) => {
                info!(session = %self.id, device = %device, "Device bound");
                *self.device.lock() = Some(device);
                self.set_state(SessionState::DeviceBound);
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Binds an already-resolved device snapshot.
    pub fn bind_device(&self, device: Device) {
        info!(session = %self.id, device = %device, "Device bound");
        *self.device.lock() = Some(device);
        self.set_state(SessionState::DeviceBound);
    }

    // ========================================================================
    // Connect Discipline
    // ========================================================================

    /// Runs the connect sequence: connect, pair when unpaired, validate
    /// pairing, start session.
    ///
    /// # Errors
    ///
    /// Each step fails with its own variant ([`Error::Connect`],
    /// [`Error::Pairing`], [`Error::PairingValidation`],
    /// [`Error::SessionStart`]); none is retried.
    pub async fn connect_device(&self) -> Result<()> {
        let device = self.device()?;

        self.transport.connect(&device).await?;
        self.set_state(SessionState::Connected);

        if !device.paired {
            self.set_state(SessionState::Pairing);
            self.transport.pair(&device).await?;
        }

        self.transport.validate_pairing(&device).await?;
        self.transport.start_session(&device).await?;
        self.set_state(SessionState::SessionActive);

        debug!(session = %self.id, device = %device.id, "Device session active");
        Ok(())
    }

    /// Releases the device: stop session, then disconnect. Best-effort,
    /// called on every exit path.
    pub async fn disconnect_device(&self) {
        let Ok(device) = self.device() else {
            return;
        };

        if let Err(e) = self.transport.stop_session(&device).await {
            debug!(session = %self.id, error = %e, "Session stop failed during release");
        }
        if let Err(e) = self.transport.disconnect(&device).await {
            warn!(session = %self.id, error = %e, "Disconnect failed during release");
        }

        debug!(session = %self.id, device = %device.id, "Device released");
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Marks the operation as started.
    pub(crate) fn begin_operation(&self) {
        self.set_state(SessionState::OperationRunning);
    }

    /// Records the terminal state matching the result and passes it
    /// through.
    pub(crate) fn finish_with<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.set_state(SessionState::Completed),
            Err(e) => {
                warn!(session = %self.id, error = %e, "Session failed");
                self.set_state(SessionState::Failed);
            }
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
