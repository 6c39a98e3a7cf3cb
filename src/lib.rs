//! Device Bridge - device session and debug-protocol relay engine.
//!
//! This library installs, launches, and debugs an application on a
//! physically attached device over a proprietary transport.
//!
//! # Architecture
//!
//! The engine sits between two collaborators:
//!
//! - **Transport adapter**: one [`DeviceTransport`] implementation per
//!   target platform wraps the vendor device SDK
//! - **Orchestrator**: dispatches operations on the [`Bridge`] and
//!   consumes the ordered [`Event`] stream
//!
//! Key design principles:
//!
//! - Platform logic lives only in adapters; session, protocol, and relay
//!   code is platform-agnostic
//! - Vendor notifications funnel through one queue drained by one task
//! - Every retry loop has a small explicit budget and fails closed (the
//!   one mandated exception: the lazy relay dial loop)
//! - Failures are tiered by scope of impact: recoverable, operation-fatal,
//!   process-fatal (see [`ErrorTier`])
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use device_bridge::{Bridge, DeviceFilter, InstallOptions, Result, RunOptions};
//!
//! # async fn example(adapter: device_bridge::transport::SharedTransport) -> Result<()> {
//! let (bridge, mut events) = Bridge::builder().transport(adapter).build()?;
//!
//! let _run = bridge
//!     .install_and_run(
//!         DeviceFilter::Any,
//!         Path::new("/builds/Demo.app"),
//!         &InstallOptions::new(),
//!         &RunOptions::new("/private/var/containers/Demo.app/Demo"),
//!     )
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Coordinator: [`Bridge`], [`AppRun`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Orchestrator-facing event stream |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`options`] | Typed operation options |
//! | [`protocol`] | Checksum-framed protocol client (internal) |
//! | [`registry`] | Attached-device tracking and lookup |
//! | [`relay`] | TCP↔device tunneling |
//! | [`runner`] | Autonomous run loop |
//! | [`session`] | Per-request session state machines |
//! | [`transport`] | The [`DeviceTransport`] seam |

// ============================================================================
// Modules
// ============================================================================

/// Orchestrator-facing coordinator.
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Orchestrator-facing event stream.
pub mod events;

/// Type-safe identifiers for devices, sessions, and channels.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Typed operation options.
pub mod options;

/// Remote-control protocol layer.
///
/// Internal module implementing framing, the client, and signal
/// interpretation.
pub mod protocol;

/// Attached-device tracking and lookup.
pub mod registry;

/// TCP↔device-socket tunneling.
pub mod relay;

/// Autonomous run loop.
pub mod runner;

/// Per-request sessions.
pub mod session;

/// Device transport layer.
///
/// The narrow seam between this engine and the vendor device SDK.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Coordinator types
pub use bridge::{AppRun, Bridge, BridgeBuilder};

// Error types
pub use error::{Error, ErrorTier, Result};

// Event types
pub use events::{Event, EventSink, EventStream};

// Identifier types
pub use identifiers::{ConnectionId, DeviceHandle, DeviceId, SessionId};

// Option types
pub use options::{DiskImage, InstallOptions, RunOptions};

// Registry types
pub use registry::{Device, DeviceFilter, DeviceInterface, DeviceRegistry};

// Relay types
pub use relay::{RelayOutcome, RelaySupervisor, RelayTermination, ServiceDialer};

// Runner types
pub use runner::{GdbRunner, RunHandle, RunOutcome, StopHandle};

// Session types
pub use session::{AppOpSession, CommandSession, DeviceInfoSession, LaunchedApp, SessionState};

// Transport types
pub use transport::{
    CapabilityQuery, DeviceTransport, ProgressSink, ServiceConnection, SharedTransport,
    TransportNotification,
};
