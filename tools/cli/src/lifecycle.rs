//! Process lifecycle: prompt, optionally detach, serve until unmounted.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::sync::Arc;
use tracing::{debug, info, info_span, Span};
use zeroize::Zeroizing;

use crate::config::MountConfig;
use crate::daemon;
use crate::secret::SecretSource;
use kdfs_fuse::{MountAdapter, MountSession};
use kdfs_projection::Projection;
use kdfs_vault::StoreOpener;

/// Exit status for a clean shutdown.
pub const EXIT_OK: u8 = 0;
/// Exit status for vault-open, credential and mount failures.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Prompt,
    Daemonize,
    Serve,
    Terminated,
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A background child took over serving.
    Detached { pid: u32 },
    /// The mount was served and has gone away.
    Unmounted,
}

/// Unmount `session` on SIGINT, SIGTERM or SIGHUP.
pub fn install_termination_handler(session: Arc<MountSession>, span: Span) -> Result<()> {
    ctrlc::set_handler(move || {
        info!(parent: &span, "Received termination signal");
        session.unmount();
    })
    .context("Failed to set signal handler")
}

/// Drives one process from parsed arguments to termination.
pub struct Lifecycle<'a> {
    config: &'a MountConfig,
    opener: &'a dyn StoreOpener,
    adapter: &'a dyn MountAdapter,
    phase: Phase,
    span: Span,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        config: &'a MountConfig,
        opener: &'a dyn StoreOpener,
        adapter: &'a dyn MountAdapter,
        span: Span,
    ) -> Self {
        Self {
            config,
            opener,
            adapter,
            phase: Phase::Init,
            span,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, next: Phase) {
        debug!(parent: &self.span, from = ?self.phase, to = ?next, "Lifecycle transition");
        self.phase = next;
    }

    /// Run to completion.
    ///
    /// `on_mounted` receives the live session before blocking on it and is
    /// where the termination handler gets installed.
    pub fn run<F>(
        &mut self,
        secrets: &dyn SecretSource,
        args: impl IntoIterator<Item = OsString>,
        on_mounted: F,
    ) -> Result<Outcome>
    where
        F: FnOnce(Arc<MountSession>) -> Result<()>,
    {
        self.advance(Phase::Prompt);
        let secret = secrets.obtain()?;

        if self.config.daemon && !self.config.daemon_child {
            self.advance(Phase::Daemonize);
            let command = daemon::child_command(args)?;
            let pid = daemon::spawn_detached(command, &secret)?;
            info!(parent: &self.span, pid, "Serving from background process");
            return Ok(Outcome::Detached { pid });
        }

        self.advance(Phase::Serve);
        let session = self.serve(secret)?;
        on_mounted(session.clone())?;
        session.wait();

        self.advance(Phase::Terminated);
        info!(parent: &self.span, "Vault unmounted");
        Ok(Outcome::Unmounted)
    }

    fn serve(&self, secret: Zeroizing<Vec<u8>>) -> Result<Arc<MountSession>> {
        let vault = &self.config.vault;
        let mut store = self
            .opener
            .open(vault, &secret, info_span!(parent: &self.span, "store"))
            .with_context(|| format!("Failed to open vault {}", vault.display()))?;
        drop(secret);

        store.unlock().context("Failed to unlock vault")?;

        let projection = Projection::new(
            store,
            self.config.projection,
            info_span!(parent: &self.span, "projection"),
        )?;
        let session = MountSession::mount(
            self.adapter,
            Arc::new(projection),
            &self.config.mount_point,
            info_span!(parent: &self.span, "session"),
        )?;
        Ok(Arc::new(session))
    }
}

/// Exit status for the result of [`Lifecycle::run`].
pub fn exit_status(result: &Result<Outcome>) -> u8 {
    match result {
        Ok(_) => EXIT_OK,
        Err(_) => EXIT_FAILURE,
    }
}
