//! Attached-device tracking and lookup.
//!
//! The registry owns device records end to end: created on connect
//! notifications, destroyed on disconnect notifications, never migrating
//! ownership. Lookups that miss are parked as pending entries satisfied by
//! a later registration or a timer.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `device` | [`Device`] record and [`DeviceInterface`] |
//! | `lookup` | [`DeviceFilter`] and pending lookup entries |
//! | `registry` | [`DeviceRegistry`] itself |

// ============================================================================
// Submodules
// ============================================================================

/// Device records.
pub mod device;

/// Device filters and pending lookups.
pub mod lookup;

/// The registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use device::{Device, DeviceInterface};
pub use lookup::DeviceFilter;
pub use registry::DeviceRegistry;
