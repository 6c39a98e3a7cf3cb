//! Relay servers and their supervisor.
//!
//! A [`RelayListener`] binds an ephemeral loopback port on IPv4 first,
//! then requests the same numeric port on IPv6, and listens on both. Two
//! server variants accept clients on such a listener:
//!
//! - [`ExclusiveRelayServer`]: pairs with one pre-established service
//!   channel (the attached debugger's channel) and drops any additional
//!   concurrent client while one is active.
//! - [`LazyRelayServer`]: dials a fresh device-side channel per client
//!   through a [`ServiceDialer`], retrying with a fixed backoff and no
//!   attempt cap, and serves concurrent clients independently.
//!
//! The [`RelaySupervisor`] owns both server tasks; the first terminal
//! relay outcome tears every server down and yields a
//! [`RelayTermination`]. The process exit itself belongs to the
//! orchestrator.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transport::{ServiceConnection, SharedTransport};

use super::relayer::{RelayOutcome, Relayer};

// ============================================================================
// Constants
// ============================================================================

/// Attempts to find an IPv4/IPv6 port pair before giving up.
const BIND_ATTEMPTS: u32 = 10;

/// Fixed backoff between lazy dial attempts.
const DIAL_BACKOFF: Duration = Duration::from_millis(500);

// ============================================================================
// RelayListener
// ============================================================================

/// Dual-stack loopback listener sharing one numeric port.
pub struct RelayListener {
    v4: TcpListener,
    v6: TcpListener,
    port: u16,
}

impl RelayListener {
    /// Binds an ephemeral IPv4 loopback port, then the same numeric port
    /// on IPv6.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) when no matching port pair
    /// is found within the attempt budget.
    pub async fn bind() -> Result<Self> {
        for attempt in 1..=BIND_ATTEMPTS {
            let v4 = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
            let port = v4.local_addr()?.port();

            match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
                Ok(v6) => {
                    debug!(port, "Relay listener bound on both stacks");
                    return Ok(Self { v4, v6, port });
                }
                Err(e) => {
                    debug!(port, attempt, error = %e, "IPv6 missed the IPv4 port, rebinding");
                }
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("no matching IPv4/IPv6 port pair after {BIND_ATTEMPTS} attempts"),
        )
        .into())
    }

    /// Returns the shared numeric port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Accepts the next client from either stack.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        tokio::select! {
            accepted = self.v4.accept() => accepted,
            accepted = self.v6.accept() => accepted,
        }
    }
}

// ============================================================================
// ServiceDialer
// ============================================================================

/// Acquires a fresh device-side channel for one relay client.
#[async_trait]
pub trait ServiceDialer: Send + Sync {
    /// Opens a new service channel.
    async fn dial(&self) -> Result<ServiceConnection>;
}

// ============================================================================
// ExclusiveRelayServer
// ============================================================================

/// Single-service relay server for a full debugger attach.
pub struct ExclusiveRelayServer;

impl ExclusiveRelayServer {
    /// Spawns the accept loop, pairing the first client with the
    /// pre-established channel.
    pub fn spawn(
        listener: RelayListener,
        transport: SharedTransport,
        conn: ServiceConnection,
        outcome_tx: mpsc::UnboundedSender<RelayOutcome>,
        mirror: bool,
    ) -> JoinHandle<()> {
        tokio::spawn(Self::serve(listener, transport, conn, outcome_tx, mirror))
    }

    async fn serve(
        listener: RelayListener,
        transport: SharedTransport,
        conn: ServiceConnection,
        outcome_tx: mpsc::UnboundedSender<RelayOutcome>,
        mirror: bool,
    ) {
        let mut conn_slot = Some(conn);

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Debugger relay accept failed");
                    let _ = outcome_tx.send(RelayOutcome::ClientError(e.to_string()));
                    return;
                }
            };

            let Some(conn) = conn_slot.take() else {
                // One pairing per pre-established channel; concurrent or
                // late clients are dropped.
                warn!(?addr, "Additional debugger client rejected");
                drop(stream);
                continue;
            };

            info!(?addr, port = listener.port(), "Debugger client paired");

            let mut relayer = Relayer::new(Arc::clone(&transport), conn, stream, "gdb");
            if mirror {
                relayer = relayer.with_mirror();
            }

            let tx = outcome_tx.clone();
            tokio::spawn(async move {
                let outcome = relayer.run().await;
                let _ = tx.send(outcome);
            });
        }
    }
}

// ============================================================================
// LazyRelayServer
// ============================================================================

/// Lazy-reconnect relay server for the auxiliary channel.
pub struct LazyRelayServer;

impl LazyRelayServer {
    /// Spawns the accept loop; every client gets its own dial loop and
    /// relay pairing.
    pub fn spawn(
        listener: RelayListener,
        transport: SharedTransport,
        dialer: Arc<dyn ServiceDialer>,
        outcome_tx: mpsc::UnboundedSender<RelayOutcome>,
        mirror: bool,
    ) -> JoinHandle<()> {
        tokio::spawn(Self::serve(listener, transport, dialer, outcome_tx, mirror))
    }

    async fn serve(
        listener: RelayListener,
        transport: SharedTransport,
        dialer: Arc<dyn ServiceDialer>,
        outcome_tx: mpsc::UnboundedSender<RelayOutcome>,
        mirror: bool,
    ) {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Auxiliary relay accept failed");
                    let _ = outcome_tx.send(RelayOutcome::ClientError(e.to_string()));
                    return;
                }
            };

            debug!(?addr, port = listener.port(), "Auxiliary client accepted");

            let transport = Arc::clone(&transport);
            let dialer = Arc::clone(&dialer);
            let tx = outcome_tx.clone();

            tokio::spawn(async move {
                let conn = Self::dial_with_retry(dialer.as_ref()).await;

                let mut relayer = Relayer::new(transport, conn, stream, "aux");
                if mirror {
                    relayer = relayer.with_mirror();
                }

                match relayer.run().await {
                    // Client departures end only this pairing; the server
                    // keeps accepting.
                    RelayOutcome::ClientClosed => {
                        debug!(?addr, "Auxiliary client closed");
                    }
                    RelayOutcome::ClientError(e) => {
                        debug!(?addr, error = %e, "Auxiliary client failed");
                    }
                    outcome => {
                        let _ = tx.send(outcome);
                    }
                }
            });
        }
    }

    /// Dials until a channel opens; fixed backoff, no attempt cap.
    async fn dial_with_retry(dialer: &dyn ServiceDialer) -> ServiceConnection {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match dialer.dial().await {
                Ok(conn) => {
                    debug!(attempt, "Auxiliary channel dialed");
                    return conn;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Auxiliary dial failed, backing off");
                    tokio::time::sleep(DIAL_BACKOFF).await;
                }
            }
        }
    }
}

// ============================================================================
// RelayTermination
// ============================================================================

/// Terminal report of a relay set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTermination {
    /// The outcome that ended the relay set.
    pub outcome: RelayOutcome,
    /// Exit code the orchestrator should use (0 for clean device EOF).
    pub exit_code: i32,
}

// ============================================================================
// RelaySupervisor
// ============================================================================

/// Owns both relay server tasks for one debug session.
pub struct RelaySupervisor {
    tasks: Vec<JoinHandle<()>>,
    outcome_rx: mpsc::UnboundedReceiver<RelayOutcome>,
    gdb_port: u16,
    aux_port: u16,
}

impl RelaySupervisor {
    /// Returns the (debugger, auxiliary) port pair.
    #[inline]
    #[must_use]
    pub const fn ports(&self) -> (u16, u16) {
        (self.gdb_port, self.aux_port)
    }

    /// Waits for the first terminal relay outcome, then tears down every
    /// relay server.
    pub async fn run(mut self) -> RelayTermination {
        let outcome = self
            .outcome_rx
            .recv()
            .await
            .unwrap_or_else(|| RelayOutcome::ClientError("relay servers vanished".into()));

        self.teardown();

        let termination = RelayTermination {
            exit_code: outcome.exit_code(),
            outcome,
        };
        info!(exit_code = termination.exit_code, "Relay set terminated");
        termination
    }

    /// Aborts every relay server task.
    fn teardown(&self) {
        for task in &self.tasks {
            task.abort();
        }
        debug!(count = self.tasks.len(), "Relay servers torn down");
    }
}

impl Drop for RelaySupervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Binds both relay listeners and spawns the server pair for a debugger
/// attach: the exclusive server over the launched channel, the lazy
/// server over the dialer.
///
/// # Errors
///
/// Propagates listener bind failures; nothing is left running on error.
pub async fn start_debug_relays(
    transport: SharedTransport,
    conn: ServiceConnection,
    dialer: Arc<dyn ServiceDialer>,
    mirror: bool,
) -> Result<RelaySupervisor> {
    let gdb_listener = RelayListener::bind().await?;
    let aux_listener = RelayListener::bind().await?;

    let gdb_port = gdb_listener.port();
    let aux_port = aux_listener.port();

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

    let tasks = vec![
        ExclusiveRelayServer::spawn(
            gdb_listener,
            Arc::clone(&transport),
            conn,
            outcome_tx.clone(),
            mirror,
        ),
        LazyRelayServer::spawn(aux_listener, transport, dialer, outcome_tx, mirror),
    ];

    info!(gdb_port, aux_port, "Relay servers listening");

    Ok(RelaySupervisor {
        tasks,
        outcome_rx,
        gdb_port,
        aux_port,
    })
}

/// Binds both relay listeners and spawns two lazy servers, for runs where
/// the launched channel stays with the run loop: late-attaching clients
/// get their own dialed channels.
///
/// # Errors
///
/// Propagates listener bind failures; nothing is left running on error.
pub async fn start_lazy_relays(
    transport: SharedTransport,
    gdb_dialer: Arc<dyn ServiceDialer>,
    aux_dialer: Arc<dyn ServiceDialer>,
    mirror: bool,
) -> Result<RelaySupervisor> {
    let gdb_listener = RelayListener::bind().await?;
    let aux_listener = RelayListener::bind().await?;

    let gdb_port = gdb_listener.port();
    let aux_port = aux_listener.port();

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

    let tasks = vec![
        LazyRelayServer::spawn(
            gdb_listener,
            Arc::clone(&transport),
            gdb_dialer,
            outcome_tx.clone(),
            mirror,
        ),
        LazyRelayServer::spawn(aux_listener, transport, aux_dialer, outcome_tx, mirror),
    ];

    info!(gdb_port, aux_port, "Relay servers listening (lazy pair)");

    Ok(RelaySupervisor {
        tasks,
        outcome_rx,
        gdb_port,
        aux_port,
    })
}

// ============================================================================
// Tests
// ============================================================================
