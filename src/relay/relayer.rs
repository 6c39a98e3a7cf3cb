//! Bidirectional byte pump.
//!
//! A [`Relayer`] pairs one TCP client with one device service channel and
//! pumps bytes both ways with no buffering beyond the in-flight chunk.
//!
//! Direction semantics differ:
//!
//! - **device→client**: interrupted reads retry immediately, would-block
//!   re-arms, end-of-stream is a clean end, any other error is
//!   relay-fatal.
//! - **client→device**: writes spin with backoff: after 10 consecutive
//!   zero-progress sends the pump sleeps ~1s and keeps going rather than
//!   aborting.
//!
//! Each relayed chunk can be mirrored to the diagnostic log in hex and
//! printable-ASCII form.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::time::Duration;

use futures_util::future::{Either, select};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::transport::{ServiceConnection, SharedTransport};

// ============================================================================
// Constants
// ============================================================================

/// Relay chunk size.
const CHUNK: usize = 4096;

/// Consecutive zero-progress device writes before backing off.
const WRITE_SPIN_LIMIT: u32 = 10;

/// Backoff applied when the spin limit is hit.
const WRITE_BACKOFF: Duration = Duration::from_secs(1);

// ============================================================================
// RelayOutcome
// ============================================================================

/// Why a relay pairing ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The device side reached end-of-stream. Clean end.
    DeviceEof,
    /// The device side failed. Relay-fatal.
    DeviceError(String),
    /// The client closed its socket.
    ClientClosed,
    /// The client socket failed.
    ClientError(String),
}

impl RelayOutcome {
    /// Exit code this outcome maps to for the terminal report.
    #[inline]
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::DeviceEof => 0,
            _ => 1,
        }
    }
}

// ============================================================================
// Relayer
// ============================================================================

/// Pumps bytes between one client socket and one service channel.
pub struct Relayer {
    transport: SharedTransport,
    conn: ServiceConnection,
    stream: TcpStream,
    mirror: bool,
    label: &'static str,
}

impl Relayer {
    /// Creates a relayer over an accepted client and an open channel.
    #[must_use]
    pub fn new(
        transport: SharedTransport,
        conn: ServiceConnection,
        stream: TcpStream,
        label: &'static str,
    ) -> Self {
        Self {
            transport,
            conn,
            stream,
            mirror: false,
            label,
        }
    }

    /// Mirrors every relayed chunk to the diagnostic log.
    #[inline]
    #[must_use]
    pub fn with_mirror(mut self) -> Self {
        self.mirror = true;
        self
    }

    /// Pumps until either direction ends, then invalidates the channel.
    pub async fn run(self) -> RelayOutcome {
        let Self {
            transport,
            conn,
            stream,
            mirror,
            label,
        } = self;

        let (read_half, write_half) = stream.into_split();

        let downstream = Box::pin(device_to_client(
            &transport, &conn, write_half, mirror, label,
        ));
        let upstream = Box::pin(client_to_device(
            &transport, &conn, read_half, mirror, label,
        ));

        let outcome = match select(downstream, upstream).await {
            Either::Left((outcome, _)) | Either::Right((outcome, _)) => outcome,
        };

        debug!(label, ?outcome, "Relay pairing ended");
        transport.invalidate(&conn);
        outcome
    }
}

// ============================================================================
// Pump Directions
// ============================================================================

/// Pumps device reads into the client socket.
async fn device_to_client(
    transport: &SharedTransport,
    conn: &ServiceConnection,
    mut writer: OwnedWriteHalf,
    mirror: bool,
    label: &'static str,
) -> RelayOutcome {
    let mut buf = [0u8; CHUNK];

    loop {
        match transport.receive(conn, &mut buf).await {
            Ok(0) => return RelayOutcome::DeviceEof,
            Ok(n) => {
                if mirror {
                    mirror_chunk(label, "device->client", &buf[..n]);
                }
                if let Err(e) = writer.write_all(&buf[..n]).await {
                    return RelayOutcome::ClientError(e.to_string());
                }
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::Interrupted => {
                // Retry immediately.
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                // Readiness notification will re-arm the read.
                tokio::task::yield_now().await;
            }
            Err(e) => return RelayOutcome::DeviceError(e.to_string()),
        }
    }
}

/// Pumps client reads into the device channel.
async fn client_to_device(
    transport: &SharedTransport,
    conn: &ServiceConnection,
    mut reader: OwnedReadHalf,
    mirror: bool,
    label: &'static str,
) -> RelayOutcome {
    let mut buf = [0u8; CHUNK];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return RelayOutcome::ClientClosed,
            Ok(n) => n,
            Err(e) => return RelayOutcome::ClientError(e.to_string()),
        };

        if mirror {
            mirror_chunk(label, "client->device", &buf[..n]);
        }

        let mut offset = 0;
        let mut spins = 0u32;
        while offset < n {
            match transport.send(conn, &buf[offset..n]).await {
                Ok(0) => {
                    spins += 1;
                    if spins >= WRITE_SPIN_LIMIT {
                        warn!(label, "Device writes not progressing, backing off");
                        tokio::time::sleep(WRITE_BACKOFF).await;
                        spins = 0;
                    }
                }
                Ok(written) => {
                    spins = 0;
                    offset += written;
                }
                Err(Error::Io(e)) if e.kind() == ErrorKind::Interrupted => {
                    // Retry immediately.
                }
                Err(e) => return RelayOutcome::DeviceError(e.to_string()),
            }
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Logs one relayed chunk in hex and printable-ASCII form.
fn mirror_chunk(label: &'static str, direction: &'static str, chunk: &[u8]) {
    trace!(
        label,
        direction,
        len = chunk.len(),
        hex = %hex::encode(chunk),
        ascii = %printable_ascii(chunk),
        "Relayed chunk"
    );
}

/// Renders bytes with non-printables replaced by `_`.
#[must_use]
pub(crate) fn printable_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| {
            if (0x20..=0x7e).contains(b) {
                *b as char
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
