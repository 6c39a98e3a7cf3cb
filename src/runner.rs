//! Autonomous run loop.
//!
//! After a successful launch with no debugger attached, [`GdbRunner`]
//! resumes the inferior and interprets stop replies until the run ends.
//! One runner task exists per active debug session; it owns the protocol
//! client (shared only with the out-of-band stop path) and communicates
//! completion solely through its finished signal.
//!
//! # Reply Classification
//!
//! | First byte | Meaning | Action |
//! |------------|---------|--------|
//! | `O` | Inferior output | Hex-decode, emit, keep reading |
//! | `S`/`T` | Stop with signal | See signal handling below |
//! | `W` | Inferior exited | Record status, terminate |
//! | `X` | Inferior terminated by signal | Record signal, terminate |
//! | other | Protocol violation | Terminate as unhandled |
//!
//! Allow-listed housekeeping signals resume execution and reset the
//! unexpected-signal budget; any other signal burns budget. Signal 9 ends
//! the run unconditionally; signal 17 marks a deliberate external stop.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::EventSink;
use crate::protocol::GdbProtocolClient;
use crate::protocol::frame::hex_digit;
use crate::protocol::signals::{self, SIGKILL, SIGSTOP};

// ============================================================================
// Constants
// ============================================================================

/// Resume-all-threads command.
const RESUME: &[u8] = b"vCont;c";

/// Unexpected-signal budget, reset by every benign reply.
const SIGNAL_BUDGET: u32 = 5;

/// Empty/garbage reply budget, reset by every classified reply.
const READ_RETRY_BUDGET: u32 = 10;

// ============================================================================
// RunOutcome
// ============================================================================

/// Terminal state of an autonomous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunOutcome {
    /// The inferior exited with a status code (`W` reply).
    #[serde(rename_all = "camelCase")]
    Exited {
        /// Exit status reported by the stub.
        status: u8,
    },

    /// The inferior was terminated by a signal (`X` reply).
    #[serde(rename_all = "camelCase")]
    Terminated {
        /// Terminating signal number.
        signal: u8,
    },

    /// Signal 9 was reported; the run ended unconditionally.
    Killed,

    /// Signal 17 was reported; a deliberate external stop.
    ExternallyStopped,

    /// An unexpected signal recurred until the budget ran out.
    #[serde(rename_all = "camelCase")]
    SignalBudgetExhausted {
        /// The signal that exhausted the budget.
        signal: u8,
    },

    /// A reply the loop does not handle, or reads stopped progressing.
    #[serde(rename_all = "camelCase")]
    ProtocolUnhandled {
        /// What was observed.
        detail: String,
    },
}

impl RunOutcome {
    /// Returns `true` when the run ended by normal inferior exit or a
    /// deliberate stop.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Exited { .. } | Self::ExternallyStopped)
    }
}

// ============================================================================
// StopHandle
// ============================================================================

/// Out-of-band stop requester for a running session.
///
/// Cloneable; shares the protocol client (and therefore its send lock)
/// with the run loop.
#[derive(Clone)]
pub struct StopHandle {
    client: Arc<GdbProtocolClient>,
}

impl StopHandle {
    /// Issues the two-phase stop request, best-effort.
    pub async fn request_stop(&self) {
        info!("Stop requested");
        self.client.request_stop().await;
    }
}

// ============================================================================
// RunHandle
// ============================================================================

/// Handle to a spawned run loop.
pub struct RunHandle {
    finished: oneshot::Receiver<RunOutcome>,
    stop: StopHandle,
}

impl RunHandle {
    /// Returns a stop requester for this run.
    #[inline]
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Waits for the run loop to finish.
    ///
    /// # Errors
    ///
    /// [`Error::ChannelClosed`](crate::Error::ChannelClosed) if the runner
    /// task died without reporting.
    pub async fn wait(self) -> Result<RunOutcome> {
        Ok(self.finished.await?)
    }
}

// ============================================================================
// GdbRunner
// ============================================================================

/// Autonomous loop that resumes execution and classifies replies.
pub struct GdbRunner {
    client: Arc<GdbProtocolClient>,
    events: EventSink,
}

impl GdbRunner {
    /// Creates a runner over a launched protocol client.
    #[must_use]
    pub fn new(client: Arc<GdbProtocolClient>, events: EventSink) -> Self {
        Self { client, events }
    }

    /// Spawns the run loop as its own task.
    ///
    /// Completion is communicated solely through the returned handle's
    /// finished signal (and the terminal [`Event::InferiorExit`]
    /// emitted on the event stream).
    ///
    /// [`Event::InferiorExit`]: crate::events::Event::InferiorExit
    #[must_use]
    pub fn spawn(self) -> RunHandle {
        let (tx, rx) = oneshot::channel();
        let stop = StopHandle {
            client: Arc::clone(&self.client),
        };

        tokio::spawn(async move {
            let outcome = self.run().await;
            let _ = tx.send(outcome);
        });

        RunHandle { finished: rx, stop }
    }

    /// Runs the loop to completion.
    pub async fn run(self) -> RunOutcome {
        let outcome = self.run_inner().await;

        match &outcome {
            RunOutcome::Exited { status } => info!(status, "Inferior exited"),
            RunOutcome::Terminated { signal } => info!(signal, "Inferior terminated by signal"),
            RunOutcome::Killed => info!("Inferior killed"),
            RunOutcome::ExternallyStopped => info!("Run stopped externally"),
            RunOutcome::SignalBudgetExhausted { signal } => {
                warn!(signal, "Unexpected-signal budget exhausted");
            }
            RunOutcome::ProtocolUnhandled { detail } => {
                warn!(detail = %detail, "Run ended on unhandled protocol state");
            }
        }

        self.events.inferior_exit(outcome.clone());
        outcome
    }

    async fn run_inner(&self) -> RunOutcome {
        if let Err(e) = self.client.send_packet(RESUME).await {
            return RunOutcome::ProtocolUnhandled {
                detail: e.to_string(),
            };
        }

        let mut signal_budget = SIGNAL_BUDGET;
        let mut read_retries = READ_RETRY_BUDGET;

        loop {
            let reply = match self.client.read_packet().await {
                Ok(reply) => reply,
                Err(e) => {
                    return RunOutcome::ProtocolUnhandled {
                        detail: e.to_string(),
                    };
                }
            };

            if reply.is_empty() {
                read_retries -= 1;
                if read_retries == 0 {
                    return RunOutcome::ProtocolUnhandled {
                        detail: "empty replies exhausted the retry budget".into(),
                    };
                }
                continue;
            }

            match reply[0] {
                b'O' => {
                    self.emit_output(&reply[1..]);
                    read_retries = READ_RETRY_BUDGET;
                }

                b'S' | b'T' => {
                    let Some(signal) = decode_hex_pair(&reply[1..]) else {
                        return RunOutcome::ProtocolUnhandled {
                            detail: format!(
                                "undecodable signal in reply {:?}",
                                String::from_utf8_lossy(&reply)
                            ),
                        };
                    };

                    if signal == SIGKILL {
                        return RunOutcome::Killed;
                    }
                    if signal == SIGSTOP {
                        return RunOutcome::ExternallyStopped;
                    }

                    if signals::is_benign(signal) {
                        debug!(
                            signal,
                            name = signals::name(signal).unwrap_or("?"),
                            "Benign signal, resuming"
                        );
                        signal_budget = SIGNAL_BUDGET;
                        read_retries = READ_RETRY_BUDGET;
                    } else {
                        signal_budget -= 1;
                        warn!(
                            signal,
                            remaining = signal_budget,
                            "Unexpected signal"
                        );
                        if signal_budget == 0 {
                            return RunOutcome::SignalBudgetExhausted { signal };
                        }
                    }

                    if let Err(e) = self.client.send_packet(RESUME).await {
                        return RunOutcome::ProtocolUnhandled {
                            detail: e.to_string(),
                        };
                    }
                }

                b'W' => {
                    let status = decode_hex_pair(&reply[1..]).unwrap_or(0);
                    return RunOutcome::Exited { status };
                }

                b'X' => {
                    let signal = decode_hex_pair(&reply[1..]).unwrap_or(0);
                    return RunOutcome::Terminated { signal };
                }

                other => {
                    return RunOutcome::ProtocolUnhandled {
                        detail: format!("unhandled reply type {:?}", other as char),
                    };
                }
            }
        }
    }

    /// Hex-decodes and emits an `O` output payload.
    fn emit_output(&self, payload: &[u8]) {
        match hex::decode(payload) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.events.captured_output(text);
            }
            Err(e) => warn!(error = %e, "Undecodable output payload dropped"),
        }
    }
}

/// Decodes the leading two hex digits of a reply remainder.
fn decode_hex_pair(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 2 {
        return None;
    }
    let hi = hex_digit(bytes[0])?;
    let lo = hex_digit(bytes[1])?;
    Some((hi << 4) | lo)
}

// ============================================================================
// Tests
// ============================================================================
