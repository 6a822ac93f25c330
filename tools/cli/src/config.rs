//! Command line surface and the mount configuration assembled from it.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogConfig;
use kdfs_fuse::MountOptions;
use kdfs_projection::{CollisionPolicy, Permissions, ProjectionOptions};

/// Hidden flag marking the re-executed background child.
pub const DAEMON_CHILD_FLAG: &str = "--internal-daemon-child";

#[derive(Parser, Debug)]
#[command(name = "kdfs")]
#[command(about = "kdfs - Mount a password vault as a read-only filesystem")]
#[command(version)]
pub struct Cli {
    /// Directory to mount the vault on.
    #[arg(value_name = "MOUNTPOINT")]
    pub mount_point: PathBuf,

    /// Vault file to open.
    #[arg(value_name = "VAULT")]
    pub vault: PathBuf,

    /// Detach from the terminal and serve in the background.
    #[arg(short, long)]
    pub daemon: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Let other users access the mount.
    #[arg(long)]
    pub allow_other: bool,

    /// Leave the mount in place if the process dies.
    #[arg(long)]
    pub no_auto_unmount: bool,

    /// Permission bits of projected files, in octal.
    #[arg(long, value_name = "MODE", default_value = "400", value_parser = parse_mode)]
    pub file_mode: u16,

    /// Permission bits of projected directories, in octal.
    #[arg(long, value_name = "MODE", default_value = "500", value_parser = parse_mode)]
    pub dir_mode: u16,

    /// How to treat sibling groups or entries sharing a name.
    #[arg(long, value_enum, default_value_t = CollisionArg::Suffix)]
    pub on_collision: CollisionArg,

    /// Directory for log files.
    #[arg(long, env = "KDFS_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Secret arrives on stdin from the parent process.
    #[arg(long = "internal-daemon-child", hide = true)]
    pub internal_daemon_child: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CollisionArg {
    /// Same-named siblings share one directory.
    Merge,
    /// Later siblings get a " (n)" suffix.
    Suffix,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(arg: CollisionArg) -> Self {
        match arg {
            CollisionArg::Merge => CollisionPolicy::Merge,
            CollisionArg::Suffix => CollisionPolicy::Suffix,
        }
    }
}

/// Parse an octal permission mode such as `400` or `0o440`.
pub fn parse_mode(s: &str) -> Result<u16, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    let mode =
        u16::from_str_radix(digits, 8).map_err(|_| format!("'{}' is not an octal mode", s))?;
    if mode > 0o7777 {
        return Err(format!("mode {:o} exceeds 7777", mode));
    }
    Ok(mode)
}

/// Everything the process needs to serve one vault.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub mount_point: PathBuf,
    pub vault: PathBuf,
    pub daemon: bool,
    pub daemon_child: bool,
    pub projection: ProjectionOptions,
    pub mount: MountOptions,
    pub log: LogConfig,
}

impl From<Cli> for MountConfig {
    fn from(cli: Cli) -> Self {
        let log = LogConfig {
            verbose: cli.verbose,
            dir: cli.log_dir.unwrap_or_else(crate::logging::default_log_dir),
            stderr: !cli.internal_daemon_child,
        };

        Self {
            mount_point: cli.mount_point,
            vault: cli.vault,
            daemon: cli.daemon,
            daemon_child: cli.internal_daemon_child,
            projection: ProjectionOptions {
                permissions: Permissions {
                    file_mode: cli.file_mode,
                    dir_mode: cli.dir_mode,
                },
                collision: cli.on_collision.into(),
            },
            mount: MountOptions {
                allow_other: cli.allow_other,
                auto_unmount: !cli.no_auto_unmount,
                ..MountOptions::default()
            },
            log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("kdfs").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("400"), Ok(0o400));
        assert_eq!(parse_mode("0o550"), Ok(0o550));
        assert_eq!(parse_mode("0755"), Ok(0o755));
        assert_eq!(parse_mode("7777"), Ok(0o7777));
        assert!(parse_mode("800").is_err());
        assert!(parse_mode("10000").is_err());
        assert!(parse_mode("rw").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = MountConfig::from(parse(&["/mnt/vault", "db.kdfs"]).unwrap());

        assert_eq!(config.mount_point, PathBuf::from("/mnt/vault"));
        assert_eq!(config.vault, PathBuf::from("db.kdfs"));
        assert!(!config.daemon);
        assert!(!config.daemon_child);
        assert_eq!(config.projection, ProjectionOptions::default());
        assert_eq!(config.mount, MountOptions::default());
        assert!(config.log.stderr);
        assert!(!config.log.verbose);
    }

    #[test]
    fn test_all_options() {
        let cli = parse(&[
            "--daemon",
            "--verbose",
            "--allow-other",
            "--no-auto-unmount",
            "--file-mode",
            "440",
            "--dir-mode",
            "550",
            "--on-collision",
            "merge",
            "--log-dir",
            "/tmp/kdfs-logs",
            "/mnt/vault",
            "db.kdfs",
        ])
        .unwrap();
        let config = MountConfig::from(cli);

        assert!(config.daemon);
        assert!(config.log.verbose);
        assert!(config.mount.allow_other);
        assert!(!config.mount.auto_unmount);
        assert_eq!(config.projection.permissions.file_mode, 0o440);
        assert_eq!(config.projection.permissions.dir_mode, 0o550);
        assert_eq!(config.projection.collision, CollisionPolicy::Merge);
        assert_eq!(config.log.dir, PathBuf::from("/tmp/kdfs-logs"));
    }

    #[test]
    fn test_daemon_child_logs_to_file_only() {
        let cli = parse(&[DAEMON_CHILD_FLAG, "/mnt/vault", "db.kdfs"]).unwrap();
        let config = MountConfig::from(cli);

        assert!(config.daemon_child);
        assert!(!config.log.stderr);
    }

    #[test]
    fn test_usage_errors() {
        let missing = parse(&["/mnt/vault"]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(missing.exit_code(), 2);

        let bad_mode = parse(&["--file-mode", "9", "/mnt/vault", "db.kdfs"]).unwrap_err();
        assert_eq!(bad_mode.kind(), ErrorKind::ValueValidation);

        let bad_policy = parse(&["--on-collision", "skip", "/mnt/vault", "db.kdfs"]).unwrap_err();
        assert_eq!(bad_policy.kind(), ErrorKind::InvalidValue);
    }
}
