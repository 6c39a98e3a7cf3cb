//! Error types for the device bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use device_bridge::{Result, Error};
//!
//! async fn example(session: &AppOpSession) -> Result<()> {
//!     session.install(bundle, &options).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Tiers
//!
//! Failure handling is organized in three tiers, determined by the scope of
//! impact rather than by error type:
//!
//! | Tier | Meaning | Variants |
//! |------|---------|----------|
//! | Recoverable | Logged/counted, never escalates | (handled in place, rarely surfaced) |
//! | Operation-fatal | Fails one request, process survives | [`Error::Connect`], [`Error::Pairing`], [`Error::Mount`], [`Error::Handshake`], ... |
//! | Process-fatal | Tears down all relay servers | [`Error::RelayFatal`] |
//!
//! Every failure path is attributable to exactly one tier; see
//! [`Error::tier`].

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::DeviceId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// ErrorTier
// ============================================================================

/// Scope of impact of a failure.
///
/// Tier is determined by what a failure takes down, not by where it
/// originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    /// Logged or counted in place; never escalates past the current read
    /// or write attempt.
    Recoverable,
    /// Fails the one request that hit it; other sessions and pending
    /// lookups keep running.
    OperationFatal,
    /// Tears down every relay server and ends the run with a non-zero
    /// terminal outcome.
    ProcessFatal,
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bridge or option configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Device Lookup Errors
    // ========================================================================
    /// No matching device attached within the lookup window.
    #[error("Device not found: {filter} (waited {timeout_ms}ms)")]
    DeviceNotFound {
        /// The filter that failed to match ("any" for empty filters).
        filter: String,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // Device Session Errors (one variant per connect step)
    // ========================================================================
    /// Transport-level connect to the device failed.
    #[error("Connect failed for {device}: {message}")]
    Connect {
        /// Target device.
        device: DeviceId,
        /// Description from the transport.
        message: String,
    },

    /// Pairing with the device failed.
    #[error("Pairing failed for {device}: {message}")]
    Pairing {
        /// Target device.
        device: DeviceId,
        /// Description from the transport.
        message: String,
    },

    /// Pairing validation failed after a (possibly pre-existing) pair.
    #[error("Pairing validation failed for {device}: {message}")]
    PairingValidation {
        /// Target device.
        device: DeviceId,
        /// Description from the transport.
        message: String,
    },

    /// Starting the device session failed.
    #[error("Session start failed for {device}: {message}")]
    SessionStart {
        /// Target device.
        device: DeviceId,
        /// Description from the transport.
        message: String,
    },

    // ========================================================================
    // Operation Errors
    // ========================================================================
    /// Mounting the on-device disk image failed.
    #[error("Disk image mount failed: {message}")]
    Mount {
        /// Description from the transport.
        message: String,
    },

    /// Starting an on-device service failed.
    #[error("Service start failed: {service}: {message}")]
    ServiceStart {
        /// Name of the service that failed to start.
        service: String,
        /// Description from the transport.
        message: String,
    },

    /// Transferring the application bundle to the device failed.
    #[error("Transfer failed: {message}")]
    Transfer {
        /// Description from the transport.
        message: String,
    },

    /// Installing the application on the device failed.
    #[error("Install failed: {message}")]
    Install {
        /// Description from the transport.
        message: String,
    },

    /// A launch handshake step failed.
    ///
    /// The partially-opened service connection is discarded by the caller.
    #[error("Launch handshake failed at {step}: {message}")]
    Handshake {
        /// Handshake step that failed ("aslr", "launch-args", "launch-success").
        step: &'static str,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation, framing failure, or exhausted command retry
    /// budget on the control channel.
    ///
    /// Aborts the current command only; the process keeps serving other
    /// sessions.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The remote stub answered a handshake command with something other
    /// than `OK`.
    #[error("Unexpected reply: {reply:?}")]
    UnexpectedReply {
        /// Printable rendering of the offending reply.
        reply: String,
    },

    // ========================================================================
    // Relay Errors
    // ========================================================================
    /// Loss of a client or device socket during an active relay, or a
    /// relay send/receive path exhausting its retry budget.
    ///
    /// Process-fatal: all relay servers are torn down.
    #[error("Relay failure: {message}")]
    RelayFatal {
        /// Description of the relay failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// Channel receive error (a task finished without reporting).
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a device-not-found error.
    #[inline]
    pub fn device_not_found(filter: impl Into<String>, timeout_ms: u64) -> Self {
        Self::DeviceNotFound {
            filter: filter.into(),
            timeout_ms,
        }
    }

    /// Creates a connect error.
    #[inline]
    pub fn connect(device: DeviceId, message: impl Into<String>) -> Self {
        Self::Connect {
            device,
            message: message.into(),
        }
    }

    /// Creates a pairing error.
    #[inline]
    pub fn pairing(device: DeviceId, message: impl Into<String>) -> Self {
        Self::Pairing {
            device,
            message: message.into(),
        }
    }

    /// Creates a pairing validation error.
    #[inline]
    pub fn pairing_validation(device: DeviceId, message: impl Into<String>) -> Self {
        Self::PairingValidation {
            device,
            message: message.into(),
        }
    }

    /// Creates a session start error.
    #[inline]
    pub fn session_start(device: DeviceId, message: impl Into<String>) -> Self {
        Self::SessionStart {
            device,
            message: message.into(),
        }
    }

    /// Creates a mount error.
    #[inline]
    pub fn mount(message: impl Into<String>) -> Self {
        Self::Mount {
            message: message.into(),
        }
    }

    /// Creates a service start error.
    #[inline]
    pub fn service_start(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceStart {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a transfer error.
    #[inline]
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
        }
    }

    /// Creates an install error.
    #[inline]
    pub fn install(message: impl Into<String>) -> Self {
        Self::Install {
            message: message.into(),
        }
    }

    /// Creates a handshake error for a named step.
    #[inline]
    pub fn handshake(step: &'static str, message: impl Into<String>) -> Self {
        Self::Handshake {
            step,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an unexpected-reply error from raw reply bytes.
    #[inline]
    pub fn unexpected_reply(reply: &[u8]) -> Self {
        Self::UnexpectedReply {
            reply: String::from_utf8_lossy(reply).into_owned(),
        }
    }

    /// Creates a process-fatal relay error.
    #[inline]
    pub fn relay_fatal(message: impl Into<String>) -> Self {
        Self::RelayFatal {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the failure tier of this error.
    #[must_use]
    pub fn tier(&self) -> ErrorTier {
        match self {
            Self::RelayFatal { .. } => ErrorTier::ProcessFatal,
            _ => ErrorTier::OperationFatal,
        }
    }

    /// Returns `true` if this failure must tear down all relay servers.
    #[inline]
    #[must_use]
    pub fn is_process_fatal(&self) -> bool {
        self.tier() == ErrorTier::ProcessFatal
    }

    /// Returns `true` if this is a device session error (connect, pair,
    /// validate, or session start).
    #[inline]
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Pairing { .. }
                | Self::PairingValidation { .. }
                | Self::SessionStart { .. }
        )
    }

    /// Returns `true` if this is a launch handshake error.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(self, Self::Handshake { .. } | Self::UnexpectedReply { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connect(DeviceId::new("d1"), "no route to device");
        assert_eq!(err.to_string(), "Connect failed for d1: no route to device");
    }

    #[test]
    fn test_device_not_found_display() {
        let err = Error::device_not_found("any", 1000);
        assert_eq!(err.to_string(), "Device not found: any (waited 1000ms)");
    }

    #[test]
    fn test_handshake_display() {
        let err = Error::handshake("launch-args", "stub rejected arguments");
        assert_eq!(
            err.to_string(),
            "Launch handshake failed at launch-args: stub rejected arguments"
        );
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(
            Error::relay_fatal("device socket lost").tier(),
            ErrorTier::ProcessFatal
        );
        assert_eq!(
            Error::mount("image rejected").tier(),
            ErrorTier::OperationFatal
        );
        assert_eq!(
            Error::protocol("retry budget exhausted").tier(),
            ErrorTier::OperationFatal
        );
    }

    #[test]
    fn test_is_process_fatal() {
        assert!(Error::relay_fatal("gone").is_process_fatal());
        assert!(!Error::transfer("disk full").is_process_fatal());
    }

    #[test]
    fn test_is_session_error() {
        let d = DeviceId::new("d1");
        assert!(Error::connect(d.clone(), "x").is_session_error());
        assert!(Error::pairing(d.clone(), "x").is_session_error());
        assert!(Error::pairing_validation(d.clone(), "x").is_session_error());
        assert!(Error::session_start(d, "x").is_session_error());
        assert!(!Error::mount("x").is_session_error());
    }

    #[test]
    fn test_is_handshake_error() {
        assert!(Error::handshake("aslr", "x").is_handshake_error());
        assert!(Error::unexpected_reply(b"E08").is_handshake_error());
        assert!(!Error::protocol("x").is_handshake_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "pipe");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
