//! Seam between a mount session and the kernel-facing filesystem protocol.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use kdfs_common::Result;
use kdfs_projection::Projection;

/// Capability to detach a mounted filesystem from the OS.
pub trait Unmount: Send {
    fn unmount(&mut self) -> io::Result<()>;
}

/// A projection attached at a mount point.
pub struct Attached {
    pub unmounter: Box<dyn Unmount>,
    /// Thread serving filesystem requests; exits once the mount is gone.
    pub worker: JoinHandle<io::Result<()>>,
}

/// Attaches a projection to the OS at a mount point.
pub trait MountAdapter {
    /// # Errors
    /// - [`kdfs_common::Error::Mount`] if the OS refuses the mount
    fn attach(&self, projection: Arc<Projection>, mount_point: &Path) -> Result<Attached>;
}
