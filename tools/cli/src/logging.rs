//! Subscriber installation. Only `main` calls into this module.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log file name; the daily appender adds a date suffix.
pub const LOG_FILE: &str = "kdfs.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Lower the stderr threshold to `debug`.
    pub verbose: bool,
    /// Directory receiving the rolling log file.
    pub dir: PathBuf,
    /// Also log to stderr. Off for the daemon child, whose stderr is discarded.
    pub stderr: bool,
}

/// `<data_local_dir>/kdfs/logs`, or under the temp dir if there is none.
pub fn default_log_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
        .join("kdfs")
        .join("logs")
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn stderr_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

fn prepare_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))
}

/// Non-blocking writer onto the daily log file in `dir`.
fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    prepare_dir(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must outlive
/// every event worth keeping. An unusable log directory only costs the file
/// layer: the failure is logged as a warning and `None` is returned.
///
/// # Errors
/// - A global subscriber is already installed
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard, file_error) = match file_writer(&config.dir) {
        Ok((writer, guard)) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter("info"));
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(filter(stderr_level(config.verbose)))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    if let Some(e) = file_error {
        warn!("{:#}; file logging disabled", e);
    }
    Ok(guard)
}
