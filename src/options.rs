//! Typed operation options.
//!
//! The vendor SDK takes opaque option/property bags; this crate exposes
//! them as typed structs with fluent builders instead.
//!
//! # Example
//!
//! ```ignore
//! use device_bridge::{InstallOptions, RunOptions};
//!
//! let install = InstallOptions::new().with_property("PackageType", "Developer");
//! let run = RunOptions::new("/private/var/containers/Demo.app/Demo")
//!     .with_arg("--verbose")
//!     .with_debugger();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

// ============================================================================
// InstallOptions
// ============================================================================

/// Options for transfer and install operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Extra key/value properties forwarded to the transport adapter.
    pub properties: BTreeMap<String, String>,
}

impl InstallOptions {
    /// Creates empty install options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property forwarded to the transport adapter.
    #[inline]
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// DiskImage
// ============================================================================

/// A developer disk image and its detached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskImage {
    /// Path to the disk image.
    pub image: PathBuf,
    /// Path to the image signature.
    pub signature: PathBuf,
}

impl DiskImage {
    /// Creates a disk image reference.
    #[inline]
    #[must_use]
    pub fn new(image: impl Into<PathBuf>, signature: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            signature: signature.into(),
        }
    }
}

// ============================================================================
// RunOptions
// ============================================================================

/// Options for launching an application on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// On-device path of the executable to launch.
    pub executable: String,

    /// Arguments passed to the executable.
    pub args: Vec<String>,

    /// Disable address-space-layout randomization before launch.
    pub disable_aslr: bool,

    /// Developer disk image to mount before starting the debug service.
    pub disk_image: Option<DiskImage>,

    /// Attach a full debugger via relay servers instead of running the
    /// autonomous loop.
    pub attach_debugger: bool,
}

impl RunOptions {
    /// Creates run options for an on-device executable path.
    #[must_use]
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            disable_aslr: true,
            disk_image: None,
            attach_debugger: false,
        }
    }

    /// Appends one launch argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several launch arguments.
    #[inline]
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Leaves address-space-layout randomization enabled.
    #[inline]
    #[must_use]
    pub fn with_aslr(mut self) -> Self {
        self.disable_aslr = false;
        self
    }

    /// Sets the developer disk image to mount before launch.
    #[inline]
    #[must_use]
    pub fn with_disk_image(mut self, image: DiskImage) -> Self {
        self.disk_image = Some(image);
        self
    }

    /// Requests a full debugger attach through relay servers.
    #[inline]
    #[must_use]
    pub fn with_debugger(mut self) -> Self {
        self.attach_debugger = true;
        self
    }

    /// Returns the full argv: executable followed by its arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        let mut argv = Vec::with_capacity(1 + self.args.len());
        argv.push(self.executable.as_str());
        argv.extend(self.args.iter().map(String::as_str));
        argv
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_options_properties() {
        let opts = InstallOptions::new()
            .with_property("PackageType", "Developer")
            .with_property("CFBundleIdentifier", "com.example.demo");
        assert_eq!(
            opts.properties.get("PackageType").map(String::as_str),
            Some("Developer")
        );
        assert_eq!(opts.properties.len(), 2);
    }

    #[test]
    fn test_run_options_defaults() {
        let opts = RunOptions::new("/apps/Demo.app/Demo");
        assert!(opts.disable_aslr);
        assert!(!opts.attach_debugger);
        assert!(opts.disk_image.is_none());
        assert!(opts.args.is_empty());
    }

    #[test]
    fn test_run_options_argv() {
        let opts = RunOptions::new("/apps/Demo.app/Demo")
            .with_arg("--flag")
            .with_args(["a", "b"]);
        assert_eq!(opts.argv(), vec!["/apps/Demo.app/Demo", "--flag", "a", "b"]);
    }

    #[test]
    fn test_run_options_builders() {
        let image = DiskImage::new("/images/dev.dmg", "/images/dev.dmg.signature");
        let opts = RunOptions::new("/apps/Demo.app/Demo")
            .with_aslr()
            .with_disk_image(image.clone())
            .with_debugger();
        assert!(!opts.disable_aslr);
        assert!(opts.attach_debugger);
        assert_eq!(opts.disk_image, Some(image));
    }
}
