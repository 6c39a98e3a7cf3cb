//! Remote-control protocol layer.
//!
//! Implements the control subset of the checksum-framed remote-debugging
//! protocol used to launch and supervise an application: packet framing,
//! the client with its ack/retry semantics, and the signal numbering the
//! run loop interprets.
//!
//! This crate is not a debugger. Once a full debugger attaches, raw bytes
//! are relayed verbatim by the [`relay`](crate::relay) layer and this
//! module is out of the path.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | `$...#xx` codec and parser state machine |
//! | `client` | [`GdbProtocolClient`] over a service channel |
//! | `signals` | Device-platform signal numbers and allow-list |

// ============================================================================
// Submodules
// ============================================================================

/// Packet framing codec.
pub mod frame;

/// Protocol client.
pub mod client;

/// Signal numbers and classification.
pub mod signals;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{GdbProtocolClient, encode_launch_args};
pub use frame::{FrameParser, FrameProgress, ParseState};
