//! fuser-backed mount adapter.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, Span};

use crate::adapter::{Attached, MountAdapter, Unmount};
use crate::filesystem::ProjectionFs;
use crate::mount::MountOptions;
use kdfs_common::{Error, Result};
use kdfs_projection::Projection;

impl Unmount for fuser::SessionUnmounter {
    fn unmount(&mut self) -> io::Result<()> {
        fuser::SessionUnmounter::unmount(self)
    }
}

/// Mounts projections through the kernel FUSE driver.
pub struct FuseAdapter {
    options: MountOptions,
    span: Span,
}

impl FuseAdapter {
    pub fn new(options: MountOptions, span: Span) -> Self {
        Self { options, span }
    }
}

impl MountAdapter for FuseAdapter {
    fn attach(&self, projection: Arc<Projection>, mount_point: &Path) -> Result<Attached> {
        let fs = ProjectionFs::new(projection, self.span.clone());
        let mut session = fuser::Session::new(fs, mount_point, &self.options.to_fuser())
            .map_err(|e| {
                error!(parent: &self.span, "Failed to create FUSE session: {}", e);
                Error::Mount(format!("Failed to mount {}: {}", mount_point.display(), e))
            })?;
        let unmounter = session.unmount_callable();

        let span = self.span.clone();
        let worker = thread::Builder::new()
            .name("kdfs-fuse".to_string())
            .spawn(move || {
                let result = session.run();
                debug!(parent: &span, "FUSE session loop exited");
                result
            })?;

        Ok(Attached {
            unmounter: Box::new(unmounter),
            worker,
        })
    }
}
