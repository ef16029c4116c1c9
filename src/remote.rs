//! Remote operations over ssh and scp
//!
//! Every remote operation is a blocking subprocess call and the exit status
//! of the underlying command is surfaced to the caller.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use log::info;

/// ssh reserves this exit status for its own failures, remote commands
/// never produce it.
const SSH_ERROR_STATUS: i32 = 255;

/// Why a remote operation did not succeed.
#[derive(Debug)]
pub enum RemoteFailure {
    /// The remote command ran and exited with a nonzero status.
    Exit(i32),
    /// The local ssh/scp process could not be started at all.
    Spawn(io::Error),
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RemoteFailure::Exit(status) => write!(f, "exit status {status}"),
            RemoteFailure::Spawn(err) => write!(f, "{err}"),
        }
    }
}

/// Runs commands on a login host and copies files to it.
///
/// Operations are synchronous; each call blocks until the underlying
/// command completes and reports a process-style exit status (0 = success).
pub trait RemoteTransport {
    /// Test whether `path` exists on `host`.
    ///
    /// `Err` means the check itself could not be carried out (host
    /// unreachable, local client missing), which is distinct from
    /// `Ok(false)`.
    fn exists(&self, host: &str, path: &str) -> io::Result<bool>;

    /// Copy the local file at `local` into `remote_dir` on `host`.
    fn copy_to(&self, host: &str, local: &Path, remote_dir: &str) -> io::Result<i32>;

    /// Run `command` on `host` through the login shell.
    fn run(&self, host: &str, command: &str) -> io::Result<i32>;
}

/// Production transport shelling out to the OpenSSH client tools.
pub struct SshTransport;

impl RemoteTransport for SshTransport {
    fn exists(&self, host: &str, path: &str) -> io::Result<bool> {
        let status = Command::new("ssh")
            .arg(host)
            .arg(format!("test -e {path}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        match exit_code(status)? {
            0 => Ok(true),
            SSH_ERROR_STATUS => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("ssh to {host} exited with status {SSH_ERROR_STATUS}"),
            )),
            _ => Ok(false),
        }
    }

    fn copy_to(&self, host: &str, local: &Path, remote_dir: &str) -> io::Result<i32> {
        let status = Command::new("scp")
            .arg(local)
            .arg(format!("{host}:{remote_dir}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()?;
        exit_code(status)
    }

    fn run(&self, host: &str, command: &str) -> io::Result<i32> {
        info!("Running on {host}: {command}");
        let status = Command::new("ssh").arg(host).arg(command).status()?;
        exit_code(status)
    }
}

/// Map a process exit into a plain code, treating death by signal as an
/// error of the operation itself.
fn exit_code(status: ExitStatus) -> io::Result<i32> {
    status
        .code()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "process terminated by a signal"))
}
