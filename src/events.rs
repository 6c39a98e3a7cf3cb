//! Orchestrator-facing event stream.
//!
//! Every operation reports progress and results as an ordered stream of
//! typed [`Event`] values on an unbounded channel. The orchestrator owns
//! the console/wire framing of this stream; this crate only guarantees the
//! ordering:
//!
//! 1. `Progress { 0..=100, "install" }` during transfer and install
//! 2. `TransferResult`
//! 3. `Progress { 100..=200, "launch" }` during launch
//! 4. `StartResult`
//! 5. `RelayPorts` (debugger attach) or `CapturedOutput` stream (free run)
//! 6. `InferiorExit` terminating a free run

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::runner::RunOutcome;

// ============================================================================
// Event
// ============================================================================

/// A single entry in the ordered status stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// Operation progress. Install operations report 0-100, launch
    /// operations 100-200.
    #[serde(rename_all = "camelCase")]
    Progress {
        /// Accumulated percentage across operation phases.
        percent: u32,
        /// Phase label ("install", "launch").
        label: String,
    },

    /// Outcome of the transfer+install phase.
    #[serde(rename_all = "camelCase")]
    TransferResult {
        /// Whether transfer and install both succeeded.
        success: bool,
        /// Failure description, when `success` is false.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Outcome of the launch phase.
    #[serde(rename_all = "camelCase")]
    StartResult {
        /// Whether the launch handshake completed.
        success: bool,
        /// Raw socket descriptor of the debug channel, when available.
        #[serde(skip_serializing_if = "Option::is_none")]
        socket_descriptor: Option<i32>,
        /// Failure description, when `success` is false.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Attribute map collected by a device-info query.
    #[serde(rename_all = "camelCase")]
    DeviceAttributes {
        /// Key/value pairs in stable order.
        attributes: BTreeMap<String, String>,
    },

    /// Output captured from the running application.
    #[serde(rename_all = "camelCase")]
    CapturedOutput {
        /// Decoded output text.
        text: String,
    },

    /// Loopback ports of the debugger relay servers.
    #[serde(rename_all = "camelCase")]
    RelayPorts {
        /// Port serving the debugger protocol relay.
        gdb_port: u16,
        /// Port serving the auxiliary channel relay.
        aux_port: u16,
    },

    /// Terminal outcome of an autonomous run.
    #[serde(rename_all = "camelCase")]
    InferiorExit {
        /// How the run loop ended.
        outcome: RunOutcome,
    },
}

// ============================================================================
// EventStream
// ============================================================================

/// Receiving end of the status stream, handed to the orchestrator.
pub type EventStream = mpsc::UnboundedReceiver<Event>;

// ============================================================================
// EventSink
// ============================================================================

/// Sending end of the status stream.
///
/// Cloneable; every session and runner holds one. A closed receiver is not
/// an error: late events from a finishing task are dropped with a debug
/// log entry.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    /// Creates a sink/stream pair.
    #[must_use]
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emits an event, dropping it if the orchestrator is gone.
    pub fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("Event dropped: stream receiver closed");
        }
    }

    /// Emits a progress event.
    #[inline]
    pub fn progress(&self, percent: u32, label: impl Into<String>) {
        self.emit(Event::Progress {
            percent,
            label: label.into(),
        });
    }

    /// Emits a successful transfer result.
    #[inline]
    pub fn transfer_success(&self) {
        self.emit(Event::TransferResult {
            success: true,
            message: None,
        });
    }

    /// Emits a failed transfer result.
    #[inline]
    pub fn transfer_failure(&self, message: impl Into<String>) {
        self.emit(Event::TransferResult {
            success: false,
            message: Some(message.into()),
        });
    }

    /// Emits a successful start result carrying the debug socket descriptor.
    #[inline]
    pub fn start_success(&self, socket_descriptor: i32) {
        self.emit(Event::StartResult {
            success: true,
            socket_descriptor: Some(socket_descriptor),
            message: None,
        });
    }

    /// Emits a failed start result.
    #[inline]
    pub fn start_failure(&self, message: impl Into<String>) {
        self.emit(Event::StartResult {
            success: false,
            socket_descriptor: None,
            message: Some(message.into()),
        });
    }

    /// Emits a device attribute map.
    #[inline]
    pub fn device_attributes(&self, attributes: BTreeMap<String, String>) {
        self.emit(Event::DeviceAttributes { attributes });
    }

    /// Emits captured application output.
    #[inline]
    pub fn captured_output(&self, text: impl Into<String>) {
        self.emit(Event::CapturedOutput { text: text.into() });
    }

    /// Emits the relay server port pair.
    #[inline]
    pub fn relay_ports(&self, gdb_port: u16, aux_port: u16) {
        self.emit(Event::RelayPorts { gdb_port, aux_port });
    }

    /// Emits the terminal outcome of an autonomous run.
    #[inline]
    pub fn inferior_exit(&self, outcome: RunOutcome) {
        self.emit(Event::InferiorExit { outcome });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_roundtrip() {
        let (sink, mut rx) = EventSink::channel();
        sink.progress(42, "install");

        match rx.try_recv().expect("event queued") {
            Event::Progress { percent, label } => {
                assert_eq!(percent, 42);
                assert_eq!(label, "install");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        // Must not panic or error.
        sink.captured_output("late output");
    }

    #[test]
    fn test_event_order_preserved() {
        let (sink, mut rx) = EventSink::channel();
        sink.progress(0, "install");
        sink.transfer_success();
        sink.progress(100, "launch");
        sink.start_success(7);

        assert!(matches!(rx.try_recv().unwrap(), Event::Progress { .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::TransferResult { success: true, .. }
        ));
        assert!(matches!(rx.try_recv().unwrap(), Event::Progress { .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::StartResult { success: true, .. }
        ));
    }

    #[test]
    fn test_serialize_tagged() {
        let event = Event::RelayPorts {
            gdb_port: 1234,
            aux_port: 5678,
        };
        let json = serde_json::to_string(&event).expect("serializable");
        assert!(json.contains("\"event\":\"relayPorts\""));
        assert!(json.contains("\"gdbPort\":1234"));
        assert!(json.contains("\"auxPort\":5678"));
    }

    #[test]
    fn test_start_result_omits_empty_fields() {
        let event = Event::StartResult {
            success: true,
            socket_descriptor: Some(3),
            message: None,
        };
        let json = serde_json::to_string(&event).expect("serializable");
        assert!(!json.contains("message"));
    }
}
