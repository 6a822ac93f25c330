//! Detaching into a background child.
//!
//! The parent re-executes its own binary with the same arguments plus the
//! hidden child flag. The child runs in a new session with stderr discarded
//! and receives the secret over a private stdin pipe, so the secret never
//! appears in arguments or the environment. Its stdout is a second pipe on
//! which it reports a live mount; the parent exits only after that report or
//! after the child has died.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::config::DAEMON_CHILD_FLAG;

/// Line the child prints once its mount is live.
pub const READY_LINE: &str = "kdfs-ready";

/// Longest wait for the child to report its mount.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Command re-running this binary as the daemon child.
pub fn child_command(args: impl IntoIterator<Item = OsString>) -> Result<Command> {
    let exe = std::env::current_exe().context("Failed to get current executable path")?;
    let mut command = Command::new(exe);
    command.args(args).arg(DAEMON_CHILD_FLAG);
    Ok(command)
}

/// Report a live mount to the waiting parent. Called once, by the child.
pub fn notify_ready() -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", READY_LINE)
        .and_then(|_| stdout.flush())
        .context("Failed to notify parent process")
}

/// Spawn `command` detached, hand it `secret` on stdin and return its pid
/// once it reports a live mount.
///
/// # Errors
/// - The child cannot be spawned or its stdin written
/// - The child exits before reporting, e.g. on a wrong secret
/// - The child does not report within the startup timeout; it is killed
#[cfg(unix)]
pub fn spawn_detached(command: Command, secret: &[u8]) -> Result<u32> {
    spawn_until_ready(command, secret, STARTUP_TIMEOUT)
}

#[cfg(unix)]
fn spawn_until_ready(mut command: Command, secret: &[u8], timeout: Duration) -> Result<u32> {
    use std::os::unix::process::CommandExt;

    command.stdin(Stdio::piped());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::null());

    // setsid() fails for a process group leader, so no process_group(0) here.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
        });
    }

    let mut child = command.spawn().context("Failed to spawn daemon process")?;
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .context("Daemon process has no stdout pipe")?;
    let mut stdin = child
        .stdin
        .take()
        .context("Daemon process has no stdin pipe")?;
    let handed = stdin.write_all(secret);
    // Closing the pipe is the child's end-of-input.
    drop(stdin);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let ready = BufReader::new(stdout)
            .read_line(&mut line)
            .is_ok_and(|_| line.trim_end() == READY_LINE);
        let _ = tx.send(ready);
    });

    match rx.recv_timeout(timeout) {
        Ok(true) => {
            handed.context("Failed to hand secret to daemon process")?;
            Ok(pid)
        }
        Ok(false) => {
            let status = child.wait().context("Failed to wait for daemon process")?;
            bail!("Daemon process exited before mounting ({})", status)
        }
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            bail!("Daemon process did not mount within {:?}", timeout)
        }
    }
}

#[cfg(not(unix))]
pub fn spawn_detached(_command: Command, _secret: &[u8]) -> Result<u32> {
    bail!("Daemon mode is only supported on Unix")
}
