//! Lifetime of one mounted projection.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn, Span};

use crate::adapter::{MountAdapter, Unmount};
use kdfs_common::{Error, Result};
use kdfs_projection::Projection;

/// A projection mounted at a path until unmounted.
///
/// All methods take `&self`; share the session through an `Arc` to unmount
/// from a signal handler while another thread waits.
pub struct MountSession {
    mount_point: PathBuf,
    unmounter: Mutex<Option<Box<dyn Unmount>>>,
    worker: Mutex<Option<JoinHandle<io::Result<()>>>>,
    terminated: Mutex<bool>,
    done: Condvar,
    span: Span,
}

impl MountSession {
    /// Mount `projection` at `mount_point` through `adapter`.
    ///
    /// # Errors
    /// - Mount point does not exist or is not a directory
    /// - The adapter fails to attach
    pub fn mount(
        adapter: &dyn MountAdapter,
        projection: Arc<Projection>,
        mount_point: &Path,
        span: Span,
    ) -> Result<Self> {
        if !mount_point.exists() {
            return Err(Error::Mount(format!(
                "Mount point does not exist: {}",
                mount_point.display()
            )));
        }
        if !mount_point.is_dir() {
            return Err(Error::Mount(format!(
                "Mount point is not a directory: {}",
                mount_point.display()
            )));
        }

        let attached = adapter.attach(projection, mount_point)?;
        info!(parent: &span, mount_point = %mount_point.display(), "Vault mounted");

        Ok(Self {
            mount_point: mount_point.to_path_buf(),
            unmounter: Mutex::new(Some(attached.unmounter)),
            worker: Mutex::new(Some(attached.worker)),
            terminated: Mutex::new(false),
            done: Condvar::new(),
            span,
        })
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Detach the mount. Only the first call does anything.
    pub fn unmount(&self) {
        let unmounter = self.unmounter.lock().take();
        let Some(mut unmounter) = unmounter else {
            debug!(parent: &self.span, "Unmount already requested");
            return;
        };

        info!(parent: &self.span, mount_point = %self.mount_point.display(), "Unmounting");
        if let Err(e) = unmounter.unmount() {
            warn!(
                parent: &self.span,
                "Failed to unmount {}: {}",
                self.mount_point.display(),
                e
            );
        }
    }

    /// Block until the session has terminated.
    pub fn wait(&self) {
        let worker = self.worker.lock().take();
        match worker {
            Some(worker) => {
                match worker.join() {
                    Ok(Ok(())) => debug!(parent: &self.span, "Filesystem worker exited"),
                    Ok(Err(e)) => warn!(parent: &self.span, "Filesystem worker failed: {}", e),
                    Err(_) => error!(parent: &self.span, "Filesystem worker panicked"),
                }
                // The mount is gone; later unmount calls have nothing to release.
                self.unmounter.lock().take();

                *self.terminated.lock() = true;
                self.done.notify_all();
            }
            None => {
                let mut terminated = self.terminated.lock();
                while !*terminated {
                    self.done.wait(&mut terminated);
                }
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated.lock()
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Attached;
    use kdfs_projection::ProjectionOptions;
    use kdfs_vault::{CredentialStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    struct FakeUnmounter {
        stop: Option<mpsc::Sender<()>>,
        calls: Arc<AtomicUsize>,
    }

    impl Unmount for FakeUnmounter {
        fn unmount(&mut self) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            Ok(())
        }
    }

    struct FailingUnmounter;

    impl Unmount for FailingUnmounter {
        fn unmount(&mut self) -> io::Result<()> {
            Err(io::Error::other("device busy"))
        }
    }

    #[derive(Default)]
    struct FakeAdapter {
        attaches: AtomicUsize,
        unmounts: Arc<AtomicUsize>,
    }

    impl MountAdapter for FakeAdapter {
        fn attach(&self, projection: Arc<Projection>, _mount_point: &Path) -> Result<Attached> {
            self.attaches.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel::<()>();
            let worker = thread::spawn(move || {
                projection.populate();
                let _ = rx.recv();
                Ok(())
            });
            Ok(Attached {
                unmounter: Box::new(FakeUnmounter {
                    stop: Some(tx),
                    calls: self.unmounts.clone(),
                }),
                worker,
            })
        }
    }

    fn projection() -> Arc<Projection> {
        let mut store = MemoryStore::new(Vec::new(), Span::none()).unwrap();
        store.unlock().unwrap();
        let projection =
            Projection::new(Box::new(store), ProjectionOptions::default(), Span::none()).unwrap();
        Arc::new(projection)
    }

    #[test]
    fn test_missing_mount_point_rejected() {
        let dir = TempDir::new().unwrap();
        let adapter = FakeAdapter::default();
        let result = MountSession::mount(
            &adapter,
            projection(),
            &dir.path().join("absent"),
            Span::none(),
        );

        assert!(matches!(result, Err(Error::Mount(_))));
        assert_eq!(adapter.attaches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_file_mount_point_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let adapter = FakeAdapter::default();
        let result = MountSession::mount(&adapter, projection(), &file, Span::none());
        assert!(matches!(result, Err(Error::Mount(_))));
    }

    #[test]
    fn test_unmount_then_wait() {
        let dir = TempDir::new().unwrap();
        let adapter = FakeAdapter::default();
        let session =
            MountSession::mount(&adapter, projection(), dir.path(), Span::none()).unwrap();

        assert_eq!(session.mount_point(), dir.path());
        assert!(!session.is_terminated());

        session.unmount();
        session.unmount();
        session.wait();

        assert!(session.is_terminated());
        assert_eq!(adapter.unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_unmount_and_wait() {
        let dir = TempDir::new().unwrap();
        let adapter = FakeAdapter::default();
        let session = Arc::new(
            MountSession::mount(&adapter, projection(), dir.path(), Span::none()).unwrap(),
        );
        let returned = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                let returned = returned.clone();
                thread::spawn(move || {
                    session.wait();
                    returned.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        let unmounters: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                thread::spawn(move || session.unmount())
            })
            .collect();

        for handle in unmounters.into_iter().chain(waiters) {
            handle.join().unwrap();
        }

        assert_eq!(returned.load(Ordering::SeqCst), 4);
        assert_eq!(adapter.unmounts.load(Ordering::SeqCst), 1);
        assert!(session.is_terminated());
    }

    #[test]
    fn test_external_termination_ends_wait() {
        struct ExternalAdapter;

        impl MountAdapter for ExternalAdapter {
            fn attach(
                &self,
                _projection: Arc<Projection>,
                _mount_point: &Path,
            ) -> Result<Attached> {
                Ok(Attached {
                    unmounter: Box::new(FailingUnmounter),
                    worker: thread::spawn(|| Ok(())),
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let session =
            MountSession::mount(&ExternalAdapter, projection(), dir.path(), Span::none()).unwrap();
        session.wait();
        assert!(session.is_terminated());

        // Nothing left to release once the worker is gone.
        session.unmount();
    }

    #[test]
    fn test_unmount_failure_is_not_escalated() {
        struct BusyAdapter;

        impl MountAdapter for BusyAdapter {
            fn attach(
                &self,
                _projection: Arc<Projection>,
                _mount_point: &Path,
            ) -> Result<Attached> {
                Ok(Attached {
                    unmounter: Box::new(FailingUnmounter),
                    worker: thread::spawn(|| Err(io::Error::other("lost"))),
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let session =
            MountSession::mount(&BusyAdapter, projection(), dir.path(), Span::none()).unwrap();
        session.unmount();
        session.wait();
        assert!(session.is_terminated());
    }
}
