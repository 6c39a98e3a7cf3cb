//! Per-request sessions.
//!
//! A session is a state machine bound to one device for one operation:
//! install, run, or an attribute query. Sessions are created on request
//! and finished exactly once, reporting through the event stream.
//!
//! # Lifecycle
//!
//! ```text
//! Created → AwaitingDevice → DeviceBound → Connected → (Pairing)
//!         → SessionActive → OperationRunning → Completed | Failed
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | [`CommandSession`]: device bind + connect discipline |
//! | `app_ops` | [`AppOpSession`]: install and run operations |
//! | `device_info` | [`DeviceInfoSession`]: attribute queries |

// ============================================================================
// Submodules
// ============================================================================

/// Connect/pair/session discipline shared by all operations.
pub mod command;

/// Install and run operations.
pub mod app_ops;

/// Device attribute queries.
pub mod device_info;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no device requested yet.
    Created,
    /// Waiting for a matching device.
    AwaitingDevice,
    /// Bound to a device snapshot.
    DeviceBound,
    /// Transport-level connection established.
    Connected,
    /// Pairing in progress (unpaired devices only).
    Pairing,
    /// Device session active; operations may start.
    SessionActive,
    /// The requested operation is executing.
    OperationRunning,
    /// The operation finished successfully.
    Completed,
    /// The operation failed; no retry.
    Failed,
}

impl SessionState {
    /// Returns `true` for the two terminal states.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::AwaitingDevice => "awaiting-device",
            Self::DeviceBound => "device-bound",
            Self::Connected => "connected",
            Self::Pairing => "pairing",
            Self::SessionActive => "session-active",
            Self::OperationRunning => "operation-running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Re-exports
// ============================================================================

pub use app_ops::{AppOpSession, LaunchedApp};
pub use command::CommandSession;
pub use device_info::{DEVICE_INFO_KEYS, DeviceInfoSession};

// ============================================================================
// Tests
// ============================================================================
