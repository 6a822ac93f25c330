//! kdfs - mount a password vault as a read-only filesystem.
//!
//! Groups become directories, entries become directories inside their
//! group, and each entry's username, password, notes and URL become files.

mod config;
mod daemon;
mod lifecycle;
mod logging;
mod secret;

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info_span, warn};

use config::{Cli, MountConfig};
use kdfs_common::Error;
use kdfs_fuse::{FuseAdapter, FuseSupport};
use kdfs_vault::FormatOpener;
use lifecycle::{exit_status, install_termination_handler, Lifecycle, Outcome};
use secret::{Handoff, SecretSource, TerminalPrompt};

fn main() -> ExitCode {
    // Usage errors exit with status 2 from inside clap.
    let config = MountConfig::from(Cli::parse());

    // Logging trouble never stops a mount.
    let _log_guard = logging::init(&config.log).unwrap_or_else(|e| {
        eprintln!("Warning: {:#}", e);
        None
    });

    let span = info_span!("kdfs", vault = %config.vault.display());
    let adapter = FuseAdapter::new(config.mount.clone(), info_span!(parent: &span, "fuse"));
    let secrets: &dyn SecretSource = if config.daemon_child {
        &Handoff
    } else {
        &TerminalPrompt
    };

    let signals = info_span!(parent: &span, "signals");
    let daemon_child = config.daemon_child;

    let mut lifecycle = Lifecycle::new(&config, &FormatOpener, &adapter, span);
    let result = lifecycle.run(secrets, std::env::args_os().skip(1), |session| {
        install_termination_handler(session, signals)?;
        if daemon_child {
            daemon::notify_ready()?;
        }
        Ok(())
    });

    match &result {
        Ok(Outcome::Detached { pid }) => {
            let mount_point = config.mount_point.display();
            eprintln!("Serving {} in the background (PID: {})", mount_point, pid);
        }
        Ok(Outcome::Unmounted) => {}
        // The daemon child has no stderr, so failures go through the subscriber.
        Err(e) => {
            error!("{:#}", e);
            let mount_failed = matches!(e.downcast_ref::<Error>(), Some(Error::Mount(_)));
            let support = FuseSupport::detect();
            if mount_failed && !support.is_available() {
                warn!("{}", support);
            }
        }
    }

    ExitCode::from(exit_status(&result))
}
