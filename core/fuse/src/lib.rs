//! Mount support for kdfs.
//!
//! This module provides the mount session that owns a mounted projection
//! and the FUSE adapter that serves it on Linux and macOS.
//!
//! # Architecture
//! [`MountSession`] only knows the [`MountAdapter`] seam; the fuser-backed
//! [`FuseAdapter`] is one implementation of it.
//!
//! # Feature Flags
//! - `fuse`: Enable FUSE support (requires `/dev/fuse` on Linux or macFUSE on macOS)

pub mod adapter;
pub mod mount;
pub mod session;

#[cfg(feature = "fuse")]
pub mod backend;

#[cfg(feature = "fuse")]
pub mod filesystem;

#[cfg(feature = "fuse")]
pub use filesystem::ProjectionFs;

/// Stub adapter for when FUSE is not available.
#[cfg(not(feature = "fuse"))]
pub mod backend {
    use std::path::Path;
    use std::sync::Arc;
    use tracing::Span;

    use crate::adapter::{Attached, MountAdapter};
    use crate::mount::MountOptions;
    use kdfs_common::{Error, Result};
    use kdfs_projection::Projection;

    /// Adapter placeholder; every attach fails.
    pub struct FuseAdapter;

    impl FuseAdapter {
        pub fn new(_options: MountOptions, _span: Span) -> Self {
            Self
        }
    }

    impl MountAdapter for FuseAdapter {
        fn attach(&self, _projection: Arc<Projection>, _mount_point: &Path) -> Result<Attached> {
            Err(Error::Mount(
                "FUSE support not compiled. Rebuild with --features fuse".to_string(),
            ))
        }
    }
}

pub use adapter::{Attached, MountAdapter, Unmount};
pub use backend::FuseAdapter;
pub use mount::{FuseSupport, MountOptions, FS_NAME};
pub use session::MountSession;
