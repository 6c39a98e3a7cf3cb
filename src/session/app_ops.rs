//! Install and run operations.
//!
//! [`AppOpSession`] executes the two application operations:
//!
//! - [`install`](AppOpSession::install): transfer the bundle, then
//!   install it, forwarding the transport's 0-100 progress stream.
//! - [`run`](AppOpSession::run): mount the developer disk image when one
//!   is configured, pick the protocol-version-appropriate debug service,
//!   start it, and perform the launch handshake. Success hands the
//!   service channel to the caller as a [`LaunchedApp`].
//!
//! Launch progress is reported on the 100-200 band with the "launch"
//! label, continuing the install band.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::options::{InstallOptions, RunOptions};
use crate::protocol::{GdbProtocolClient, encode_launch_args};
use crate::transport::{CapabilityQuery, ProgressSink, SharedTransport};

use super::command::CommandSession;

// ============================================================================
// Constants
// ============================================================================

/// Debug service behind the secure proxy (newer platform versions).
pub(crate) const DEBUG_SERVICE_SECURE: &str = "com.apple.debugserver.DVTSecureSocketProxy";

/// Legacy debug service.
pub(crate) const DEBUG_SERVICE_LEGACY: &str = "com.apple.debugserver";

// ============================================================================
// LaunchedApp
// ============================================================================

/// A successfully launched application, ready for handoff.
///
/// Owns the service channel through its protocol client; the caller moves
/// it into either the autonomous run loop or the debugger relay.
pub struct LaunchedApp {
    /// Protocol client over the launched debug channel.
    pub client: GdbProtocolClient,
    /// Raw socket descriptor of the channel.
    pub socket_descriptor: i32,
    /// Debug service name the launch used.
    pub service: &'static str,
}

impl std::fmt::Debug for LaunchedApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedApp")
            .field("socket_descriptor", &self.socket_descriptor)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AppOpSession
// ============================================================================

/// Session executing install and run operations.
pub struct AppOpSession {
    base: CommandSession,
}

impl AppOpSession {
    /// Creates an unbound app-operation session.
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

    // ========================================================================
    // Install
    // ========================================================================

    /// Transfers and installs an application bundle.
    ///
    /// Progress is forwarded as 0-100 `Progress` events labeled
    /// "install"; the outcome is reported as a `TransferResult` event.
    ///
    /// # Errors
    ///
    /// [`Error::Transfer`] or [`Error::Install`]; either stops the
    /// operation.
    pub async fn install(&self, bundle: &Path, options: &InstallOptions) -> Result<()> {
        self.base.begin_operation();

        let connected = self.base.connect_device().await;
        let result = match connected {
            Ok(()) => self.install_inner(bundle, options).await,
            Err(e) => Err(e),
        };
        // Scoped release on every exit path.
        self.base.disconnect_device().await;

        match &result {
            Ok(()) => {
                info!(session = %self.base.id(), bundle = %bundle.display(), "Install finished");
                self.base.events().transfer_success();
            }
            Err(e) => self.base.events().transfer_failure(e.to_string()),
        }

        self.base.finish_with(result)
    }

    async fn install_inner(&self, bundle: &Path, options: &InstallOptions) -> Result<()> {
        let device = self.base.device()?;
        let progress = self.progress_sink("install", 0);

        self.base
            .transport()
            .transfer_app(&device, bundle, options, Arc::clone(&progress))
            .await?;
        self.base
            .transport()
            .install_app(&device, bundle, options, progress)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// Launches the application for debugging.
    ///
    /// Mounts the configured disk image when present, picks the debug
    /// service by capability check, starts it, and performs the
    /// handshake: disable ASLR, send hex-encoded argv as an `A` command,
    /// await OK, send `qLaunchSuccess`, await OK. The outcome is reported
    /// as a `StartResult` event.
    ///
    /// # Errors
    ///
    /// [`Error::Mount`], [`Error::ServiceStart`], or [`Error::Handshake`];
    /// a handshake failure discards the partially-opened channel.
    pub async fn run(&self, options: &RunOptions) -> Result<LaunchedApp> {
        self.base.begin_operation();

        let connected = self.base.connect_device().await;
        let result = match connected {
            Ok(()) => self.run_inner(options).await,
            Err(e) => Err(e),
        };
        // Scoped release on every exit path.
        self.base.disconnect_device().await;

        match &result {
            Ok(app) => {
                info!(
                    session = %self.base.id(),
                    service = app.service,
                    fd = app.socket_descriptor,
                    "Launch finished"
                );
                self.base.events().start_success(app.socket_descriptor);
            }
            Err(e) => self.base.events().start_failure(e.to_string()),
        }

        self.base.finish_with(result)
    }

    async fn run_inner(&self, options: &RunOptions) -> Result<LaunchedApp> {
        let device = self.base.device()?;
        let events = self.base.events();

        events.progress(100, "launch");

        if let Some(image) = &options.disk_image {
            self.base
                .transport()
                .mount_disk_image(&device, &image.image, &image.signature)
                .await?;
            debug!(image = %image.image.display(), "Disk image mounted");
            events.progress(125, "launch");
        }

        let secure = self
            .base
            .transport()
            .capability_version_check(&device, &CapabilityQuery::secure_proxy_service())
            .await?;
        let service = if secure {
            DEBUG_SERVICE_SECURE
        } else {
            DEBUG_SERVICE_LEGACY
        };
        debug!(service, secure, "Debug service selected");

        let conn = self
            .base
            .transport()
            .start_secure_service(&device, service)
            .await?;
        events.progress(150, "launch");

        let client = GdbProtocolClient::new(Arc::clone(self.base.transport()), conn);

        let launched = match self.launch_handshake(&client, options).await {
            Ok(()) => {
                events.progress(175, "launch");
                client.socket_descriptor()
            }
            Err(e) => Err(e),
        };

        match launched {
            Ok(socket_descriptor) => {
                events.progress(200, "launch");
                Ok(LaunchedApp {
                    client,
                    socket_descriptor,
                    service,
                })
            }
            Err(e) => {
                // Discard the partially-opened channel.
                client.invalidate();
                Err(e)
            }
        }
    }

    /// The launch handshake over a freshly started debug channel.
    async fn launch_handshake(
        &self,
        client: &GdbProtocolClient,
        options: &RunOptions,
    ) -> Result<()> {
        if options.disable_aslr {
            client
                .query_ok(b"QSetDisableASLR:1")
                .await
                .map_err(|e| Error::handshake("aslr", e.to_string()))?;
        }

        let argv = options.argv();
        client
            .query_ok(&encode_launch_args(&argv))
            .await
            .map_err(|e| Error::handshake("launch-args", e.to_string()))?;

        client
            .query_ok(b"qLaunchSuccess")
            .await
            .map_err(|e| Error::handshake("launch-success", e.to_string()))?;

        debug!(executable = %options.executable, "Launch handshake complete");
        Ok(())
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Builds a progress sink forwarding transport percentages onto the
    /// event stream with a band offset. The transport's phase text goes
    /// to the debug log.
    fn progress_sink(&self, label: &'static str, offset: u32) -> ProgressSink {
        let events = self.base.events().clone();
        Arc::new(move |percent, phase| {
            debug!(percent, phase, "Transport progress");
            events.progress(offset + percent, label);
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
