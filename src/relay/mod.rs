//! TCP↔device-socket tunneling.
//!
//! When a full debugger attaches, this layer stands up two loopback relay
//! servers (one paired with the launched debug channel, one lazily
//! dialing an auxiliary channel per client) and pumps raw bytes in both
//! directions. Protocol interpretation is out of the path entirely.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   TCP (v4+v6, one port)   ┌──────────────┐   transport    ┌────────┐
//! │ debugger │◄─────────────────────────►│ Exclusive    │◄──────────────►│ device │
//! └──────────┘                           │ RelayServer  │                │ service│
//! ┌──────────┐   TCP (v4+v6, one port)   ├──────────────┤                │ channel│
//! │ aux tool │◄─────────────────────────►│ Lazy         │◄──dial per────►│        │
//! └──────────┘                           │ RelayServer  │    client      └────────┘
//!                                        └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `relayer` | The bidirectional byte pump |
//! | `server` | Listeners, server variants, supervisor |

// ============================================================================
// Submodules
// ============================================================================

/// The byte pump.
pub mod relayer;

/// Listeners, servers, and the supervisor.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use relayer::{RelayOutcome, Relayer};
pub use server::{
    ExclusiveRelayServer, LazyRelayServer, RelayListener, RelaySupervisor, RelayTermination,
    ServiceDialer, start_debug_relays, start_lazy_relays,
};
