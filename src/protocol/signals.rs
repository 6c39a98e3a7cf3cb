//! Signal numbers reported by the remote stub.
//!
//! The debug stub runs on the device, so the numbers follow the device
//! platform's (BSD-derived) numbering, not the host's.
//!
//! A small allow-list of housekeeping signals is treated as benign by the
//! run loop: the inferior is resumed and the unexpected-signal budget is
//! reset. Everything else burns budget, except the two hard cases:
//! [`SIGKILL`] ends the run immediately and [`SIGSTOP`] marks a
//! deliberate external stop.

// ============================================================================
// Signal Numbers (device platform numbering)
// ============================================================================

/// Kill. Terminates the run loop unconditionally.
pub const SIGKILL: u8 = 9;
/// Broken pipe.
pub const SIGPIPE: u8 = 13;
/// Alarm clock.
pub const SIGALRM: u8 = 14;
/// Urgent socket condition.
pub const SIGURG: u8 = 16;
/// Stop. Treated as a deliberate external stop of the run loop.
pub const SIGSTOP: u8 = 17;
/// Continue.
pub const SIGCONT: u8 = 19;
/// Child status change.
pub const SIGCHLD: u8 = 20;
/// Profiling timer.
pub const SIGPROF: u8 = 27;
/// Window size change.
pub const SIGWINCH: u8 = 28;
/// Information request.
pub const SIGINFO: u8 = 29;
/// User signal 1.
pub const SIGUSR1: u8 = 30;
/// User signal 2.
pub const SIGUSR2: u8 = 31;

// ============================================================================
// Classification
// ============================================================================

/// Returns `true` for signals the run loop resumes straight through.
#[must_use]
pub const fn is_benign(signal: u8) -> bool {
    matches!(
        signal,
        SIGCHLD
            | SIGCONT
            | SIGALRM
            | SIGURG
            | SIGUSR1
            | SIGUSR2
            | SIGPIPE
            | SIGPROF
            | SIGWINCH
            | SIGINFO
    )
}

/// Returns the conventional name of a signal number, when known.
#[must_use]
pub const fn name(signal: u8) -> Option<&'static str> {
    match signal {
        SIGKILL => Some("SIGKILL"),
        SIGPIPE => Some("SIGPIPE"),
        SIGALRM => Some("SIGALRM"),
        SIGURG => Some("SIGURG"),
        SIGSTOP => Some("SIGSTOP"),
        SIGCONT => Some("SIGCONT"),
        SIGCHLD => Some("SIGCHLD"),
        SIGPROF => Some("SIGPROF"),
        SIGWINCH => Some("SIGWINCH"),
        SIGINFO => Some("SIGINFO"),
        SIGUSR1 => Some("SIGUSR1"),
        SIGUSR2 => Some("SIGUSR2"),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
