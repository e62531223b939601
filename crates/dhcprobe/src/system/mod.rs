//! Trait seams for the OS collaborators discovery depends on.
//!
//! The drivers never talk to the operating system directly: link
//! manipulation, process-table introspection, and binary location all go
//! through the traits here so tests can substitute mocks and discovery can
//! be exercised without root privileges or real daemons.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::{env, fs};

use thiserror::Error;
use tracing::debug;

const SYSTEM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::system");

/// Errors raised by the OS collaborators.
#[derive(Debug, Error)]
pub enum SystemError {
    /// An external command could not be spawned.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// An external command ran but exited with a failure status.
    #[error("'{command}' exited with status {status}: {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Process exit status.
        status: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// A process-table entry could not be read.
    #[error("failed to read process table entry for pid {pid}: {source}")]
    ProcRead {
        /// The pid whose entry failed to load.
        pid: i32,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A process-table entry did not have the expected shape.
    #[error("malformed process table entry for pid {pid}")]
    MalformedProcEntry {
        /// The pid whose entry could not be parsed.
        pid: i32,
    },
}

/// Administrative link operations required before discovery.
///
/// The DHCP clients are run with their hook scripts disabled, so the
/// PREINIT-style "bring the link up" step they normally rely on must be
/// performed by the caller instead.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkOps {
    /// Brings the named interface administratively up.
    fn link_up(&self, interface: &str) -> Result<(), SystemError>;
}

/// Process-table introspection used to detect client daemonization.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable {
    /// Parent pid of `pid`, or `None` if the process no longer exists.
    fn parent_pid(&self, pid: i32) -> Result<Option<i32>, SystemError>;

    /// Process-group id of `pid`, or `None` if the process no longer
    /// exists.
    fn process_group(&self, pid: i32) -> Result<Option<i32>, SystemError>;
}

/// Locates client binaries on the executable search path.
#[cfg_attr(test, mockall::automock)]
pub trait BinaryLocator {
    /// Absolute path of `name`, or `None` when it is not installed.
    fn find(&self, name: &str) -> Option<PathBuf>;
}

/// Production [`NetworkOps`] backed by the iproute2 `ip` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iproute2;

impl NetworkOps for Iproute2 {
    fn link_up(&self, interface: &str) -> Result<(), SystemError> {
        let command = format!("ip link set dev {interface} up");
        debug!(target: SYSTEM_TARGET, interface, "bringing link up");
        let output = Command::new("ip")
            .args(["link", "set", "dev", interface, "up"])
            .output()
            .map_err(|source| SystemError::Spawn {
                command: command.clone(),
                source: Arc::new(source),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SystemError::CommandFailed {
                command,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

/// Production [`ProcessTable`] backed by `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcFs;

impl ProcFs {
    fn stat_fields(pid: i32) -> Result<Option<(i32, i32)>, SystemError> {
        let path = format!("/proc/{pid}/stat");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SystemError::ProcRead {
                    pid,
                    source: Arc::new(source),
                });
            }
        };
        parse_stat_fields(&content)
            .map(Some)
            .ok_or(SystemError::MalformedProcEntry { pid })
    }
}

impl ProcessTable for ProcFs {
    fn parent_pid(&self, pid: i32) -> Result<Option<i32>, SystemError> {
        Ok(Self::stat_fields(pid)?.map(|(ppid, _)| ppid))
    }

    fn process_group(&self, pid: i32) -> Result<Option<i32>, SystemError> {
        Ok(Self::stat_fields(pid)?.map(|(_, pgrp)| pgrp))
    }
}

/// Extracts `(ppid, pgrp)` from a `/proc/<pid>/stat` line.
///
/// The comm field may itself contain spaces and parentheses, so fields are
/// counted from the final closing parenthesis.
fn parse_stat_fields(content: &str) -> Option<(i32, i32)> {
    let (_, after_comm) = content.rsplit_once(')')?;
    let mut fields = after_comm.split_whitespace();
    let _state = fields.next()?;
    let ppid = fields.next()?.parse::<i32>().ok()?;
    let pgrp = fields.next()?.parse::<i32>().ok()?;
    Some((ppid, pgrp))
}

/// Production [`BinaryLocator`] scanning the `PATH` environment variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathSearch;

impl BinaryLocator for PathSearch {
    fn find(&self, name: &str) -> Option<PathBuf> {
        let path_var = env::var_os("PATH")?;
        search_dirs(env::split_paths(&path_var), name)
    }
}

/// Returns the first executable file named `name` in `dirs`.
fn search_dirs(dirs: impl Iterator<Item = PathBuf>, name: &str) -> Option<PathBuf> {
    dirs.map(|dir| dir.join(name)).find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
