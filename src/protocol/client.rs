//! Remote-control protocol client.
//!
//! [`GdbProtocolClient`] speaks the checksum-framed protocol over one
//! [`ServiceConnection`]. It owns the channel after a successful launch
//! handoff and is shared (`Arc`) between the run loop and the out-of-band
//! stop path.
//!
//! # Locking
//!
//! All outbound writes (framed packets, acknowledgements, and the raw
//! interrupt byte) are serialized by one per-connection async lock,
//! because the run loop and a stop request may write concurrently. Only
//! one reader is ever active per connection, so reads take no such lock;
//! the reader state has its own mutex purely for interior mutability.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{ServiceConnection, SharedTransport};

use super::frame::{self, FrameParser, FrameProgress};

// ============================================================================
// Constants
// ============================================================================

/// Read chunk size for the receive buffer.
const READ_CHUNK: usize = 4096;

/// Consecutive zero-progress reads before a command aborts.
const READ_STALL_BUDGET: u32 = 10;

/// Consecutive zero-progress writes before a send aborts.
const WRITE_STALL_BUDGET: u32 = 10;

/// Raw interrupt byte sent in stop phase 0.
const INTERRUPT_BYTE: u8 = 0x03;

/// Delay between the interrupt byte and the encoded kill command.
const STOP_PHASE_DELAY: Duration = Duration::from_millis(100);

/// Acknowledgement byte written after every well-formed frame.
const ACK_BYTE: u8 = b'+';

// ============================================================================
// Types
// ============================================================================

/// Reader-side state: bytes received but not yet consumed by a parser.
struct ReadBuffer {
    pending: VecDeque<u8>,
}

// ============================================================================
// GdbProtocolClient
// ============================================================================

/// Encodes and decodes checksum-framed packets over a service channel.
pub struct GdbProtocolClient {
    transport: SharedTransport,
    conn: ServiceConnection,
    /// Serializes all outbound writes on this connection.
    send_lock: Mutex<()>,
    /// Carry-over bytes between read operations.
    reader: Mutex<ReadBuffer>,
    /// Always true: no-ack mode is never negotiated.
    ack_mode: bool,
}

impl GdbProtocolClient {
    /// Creates a client owning a service channel.
    #[must_use]
    pub fn new(transport: SharedTransport, conn: ServiceConnection) -> Self {
        Self {
            transport,
            conn,
            send_lock: Mutex::new(()),
            reader: Mutex::new(ReadBuffer {
                pending: VecDeque::new(),
            }),
            ack_mode: true,
        }
    }

    /// Returns the underlying service channel.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &ServiceConnection {
        &self.conn
    }

    /// Releases the client, returning channel ownership to the caller.
    #[inline]
    #[must_use]
    pub fn into_connection(self) -> ServiceConnection {
        self.conn
    }

    /// Returns the raw socket descriptor backing the channel.
    pub fn socket_descriptor(&self) -> Result<i32> {
        self.transport.socket_descriptor(&self.conn)
    }

    /// Closes the channel. Idempotent.
    pub fn invalidate(&self) {
        self.transport.invalidate(&self.conn);
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Encodes and sends one packet.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when the channel accepts nothing for 10
    /// consecutive attempts.
    pub async fn send_packet(&self, payload: &[u8]) -> Result<()> {
        let encoded = frame::encode(payload);
        let _guard = self.send_lock.lock().await;
        trace!(payload = %String::from_utf8_lossy(payload), "Sending packet");
        self.write_all(&encoded).await
    }

    /// Sends unframed bytes (the interrupt byte).
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        self.write_all(bytes).await
    }

    /// Writes a full buffer, counting zero-progress attempts.
    async fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0;
        let mut stalls = 0u32;

        while offset < bytes.len() {
            let n = self.transport.send(&self.conn, &bytes[offset..]).await?;
            if n == 0 {
                stalls += 1;
                if stalls >= WRITE_STALL_BUDGET {
                    return Err(Error::protocol(format!(
                        "send made no progress after {WRITE_STALL_BUDGET} attempts"
                    )));
                }
            } else {
                stalls = 0;
                offset += n;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// Reads one framed packet and returns its payload.
    ///
    /// Malformed frames are dropped and scanning continues; in ack mode a
    /// `+` is written as soon as a frame parses, strictly a parse-success
    /// side effect and never an application-level accept signal.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when 10 consecutive reads make no progress.
    /// The process survives; only this command aborts.
    pub async fn read_packet(&self) -> Result<Vec<u8>> {
        let payload = {
            let mut reader = self.reader.lock().await;
            let mut parser = FrameParser::new();
            let mut stalls = 0u32;

            'scan: loop {
                while let Some(byte) = reader.pending.pop_front() {
                    match parser.feed(byte) {
                        FrameProgress::Complete(payload) => break 'scan payload,
                        FrameProgress::Malformed => parser.reset(),
                        FrameProgress::Pending => {}
                    }
                }

                let mut buf = [0u8; READ_CHUNK];
                let n = self.transport.receive(&self.conn, &mut buf).await?;
                if n == 0 {
                    stalls += 1;
                    if stalls >= READ_STALL_BUDGET {
                        return Err(Error::protocol(format!(
                            "read made no progress after {READ_STALL_BUDGET} attempts"
                        )));
                    }
                } else {
                    stalls = 0;
                    reader.pending.extend(&buf[..n]);
                }
            }
        };

        if self.ack_mode {
            self.acknowledge().await;
        }

        trace!(payload = %String::from_utf8_lossy(&payload), "Packet received");
        Ok(payload)
    }

    /// Sends one packet and reads the reply.
    pub async fn query(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.send_packet(payload).await?;
        self.read_packet().await
    }

    /// Sends one packet and requires an `OK` reply.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedReply`] for any other reply.
    pub async fn query_ok(&self, payload: &[u8]) -> Result<()> {
        let reply = self.query(payload).await?;
        if reply == b"OK" {
            Ok(())
        } else {
            Err(Error::unexpected_reply(&reply))
        }
    }

    /// Writes the acknowledgement byte, best-effort.
    async fn acknowledge(&self) {
        if let Err(e) = self.send_raw(&[ACK_BYTE]).await {
            warn!(error = %e, "Failed to write acknowledgement");
        }
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Two-phase stop request, both phases best-effort.
    ///
    /// Phase 0 sends the raw interrupt byte; phase 1, after a fixed short
    /// delay, sends the encoded kill command.
    pub async fn request_stop(&self) {
        if let Err(e) = self.send_raw(&[INTERRUPT_BYTE]).await {
            debug!(error = %e, "Interrupt byte not delivered");
        }

        tokio::time::sleep(STOP_PHASE_DELAY).await;

        if let Err(e) = self.send_packet(b"k").await {
            debug!(error = %e, "Kill command not delivered");
        }
    }
}

// ============================================================================
// Launch Arguments
// ============================================================================

/// Encodes argv as an `A` launch command.
///
/// Format: `A` followed by comma-separated `length,index,hex-arg`
/// triples, where `length` is the hex-encoded argument's length.
#[must_use]
pub fn encode_launch_args<S: AsRef<str>>(argv: &[S]) -> Vec<u8> {
    let mut command = String::from("A");
    for (index, arg) in argv.iter().enumerate() {
        if index > 0 {
            command.push(',');
        }
        let encoded = hex::encode(arg.as_ref().as_bytes());
        command.push_str(&format!("{},{},{}", encoded.len(), index, encoded));
    }
    command.into_bytes()
}

// ============================================================================
// Tests
// ============================================================================
