//! FUSE mount options and platform probing.

use std::fmt;
use std::path::Path;

/// Name the filesystem is registered under.
pub const FS_NAME: &str = "kdfs";

/// Mount options for the projected filesystem.
///
/// The mount is always read-only, `noexec`, `nosuid` and `nodev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Allow other users to access the mount.
    pub allow_other: bool,
    /// Unmount automatically when the process exits.
    pub auto_unmount: bool,
    /// Let the kernel enforce the projected permission bits.
    pub default_permissions: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            allow_other: false,
            auto_unmount: true,
            default_permissions: true,
        }
    }
}

#[cfg(feature = "fuse")]
impl MountOptions {
    pub(crate) fn to_fuser(&self) -> Vec<fuser::MountOption> {
        use fuser::MountOption;

        let mut options = vec![
            MountOption::FSName(FS_NAME.to_string()),
            MountOption::Subtype(FS_NAME.to_string()),
            MountOption::RO,
            MountOption::NoExec,
            MountOption::NoSuid,
            MountOption::NoDev,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.default_permissions {
            options.push(MountOption::DefaultPermissions);
        }
        options
    }
}

/// Paths whose presence means a FUSE driver is installed.
#[cfg(target_os = "linux")]
const DRIVER_PATHS: &[&str] = &["/dev/fuse"];
#[cfg(target_os = "macos")]
const DRIVER_PATHS: &[&str] = &[
    "/Library/Filesystems/macfuse.fs",
    "/Library/Filesystems/osxfuse.fs",
];
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const DRIVER_PATHS: &[&str] = &[];

/// Whether this build can mount on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseSupport {
    Available,
    /// Built without the `fuse` feature.
    NotCompiled,
    /// No driver found at any of the expected paths.
    DriverMissing,
    Unsupported,
}

impl FuseSupport {
    /// Inspect the build and the local machine.
    pub fn detect() -> Self {
        Self::from_parts(
            cfg!(feature = "fuse"),
            DRIVER_PATHS,
            DRIVER_PATHS.iter().any(|p| Path::new(p).exists()),
        )
    }

    fn from_parts(compiled: bool, driver_paths: &[&str], driver_found: bool) -> Self {
        if !compiled {
            FuseSupport::NotCompiled
        } else if driver_paths.is_empty() {
            FuseSupport::Unsupported
        } else if driver_found {
            FuseSupport::Available
        } else {
            FuseSupport::DriverMissing
        }
    }

    pub fn is_available(self) -> bool {
        self == FuseSupport::Available
    }
}

impl fmt::Display for FuseSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuseSupport::Available => {
                write!(f, "FUSE driver found at {}", DRIVER_PATHS.join(" or "))
            }
            FuseSupport::NotCompiled => {
                f.write_str("FUSE support not compiled in. Rebuild with --features fuse")
            }
            FuseSupport::DriverMissing if cfg!(target_os = "macos") => {
                f.write_str("macFUSE not installed. Visit https://osxfuse.github.io/")
            }
            FuseSupport::DriverMissing => {
                f.write_str("FUSE not available. Install the fuse3 package.")
            }
            FuseSupport::Unsupported => f.write_str("FUSE not supported on this platform"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mount_options() {
        let opts = MountOptions::default();
        assert!(!opts.allow_other);
        assert!(opts.auto_unmount);
        assert!(opts.default_permissions);
    }

    #[test]
    fn test_support_classification() {
        let linux = &["/dev/fuse"][..];
        assert_eq!(FuseSupport::from_parts(false, linux, true), FuseSupport::NotCompiled);
        assert_eq!(FuseSupport::from_parts(true, &[], false), FuseSupport::Unsupported);
        assert_eq!(FuseSupport::from_parts(true, linux, false), FuseSupport::DriverMissing);
        assert!(FuseSupport::from_parts(true, linux, true).is_available());
    }

    #[test]
    fn test_detection_explains_itself() {
        let support = FuseSupport::detect();
        assert!(!support.to_string().is_empty());
        if !cfg!(feature = "fuse") {
            assert_eq!(support, FuseSupport::NotCompiled);
        }
    }

    #[cfg(feature = "fuse")]
    #[test]
    fn test_fuser_options_always_read_only() {
        use fuser::MountOption;

        let opts = MountOptions {
            allow_other: true,
            auto_unmount: false,
            default_permissions: false,
        }
        .to_fuser();

        assert!(opts.contains(&MountOption::RO));
        assert!(opts.contains(&MountOption::NoExec));
        assert!(opts.contains(&MountOption::AllowOther));
        assert!(!opts.contains(&MountOption::AutoUnmount));
        assert!(opts.contains(&MountOption::FSName("kdfs".to_string())));
    }
}
