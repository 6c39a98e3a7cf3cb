//! Device transport layer.
//!
//! The vendor SDK is reached exclusively through the narrow
//! [`DeviceTransport`] trait; one adapter implements it per target
//! platform. Session, protocol, and relay logic stay platform-agnostic.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │ Sessions / Relay │                          │  Vendor SDK      │
//! │                  │      DeviceTransport     │  (per platform)  │
//! │  GdbProtocol-    │◄────────────────────────►│                  │
//! │  Client          │   trait object (Arc)     │  notifications,  │
//! │                  │                          │  services, I/O   │
//! └──────────────────┘                          └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `interface` | The [`DeviceTransport`] trait and notification types |
//! | `connection` | [`ServiceConnection`] channel handle |
//! | `mock` | Scriptable transport double (test builds only) |

// ============================================================================
// Submodules
// ============================================================================

/// Service channel handle.
pub mod connection;

/// The transport trait and notification types.
pub mod interface;

/// Scriptable transport double for tests.
#[cfg(test)]
pub mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::ServiceConnection;
pub use interface::{
    CapabilityQuery, DeviceTransport, NotificationReceiver, ProgressSink, SharedTransport,
    TransportNotification,
};
