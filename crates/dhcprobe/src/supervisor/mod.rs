//! Process supervision for ephemeral DHCP client runs.
//!
//! Every discovery attempt follows the same protocol: delete stale
//! artifacts from a previous attempt, spawn the client with its hook
//! scripts disabled, bound the run with a wall-clock deadline, poll for
//! the pid and lease artifacts, detect daemonization through the process
//! table, and unconditionally kill whatever the client left running before
//! the attempt returns. The exact daemon flags differ per client, so the
//! drivers compose these pieces rather than share one state machine.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::{fs, io};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::LeaseError;
use crate::system::ProcessTable;

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Poll quantum for artifact and pid-file waits.
pub const ARTIFACT_POLL: Duration = Duration::from_millis(10);
/// Poll quantum while waiting for a spawned client to exit.
const EXIT_POLL: Duration = Duration::from_millis(50);

/// Cap applied when a wait duration is too large to represent as a
/// deadline.
const DEADLINE_CAP: Duration = Duration::from_secs(60 * 60 * 24);

/// Monotonic deadline `timeout` from now, saturating instead of
/// panicking when the addition would overflow `Instant`.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + DEADLINE_CAP)
}

/// Everything needed to run one external client process for one attempt.
///
/// The handle owns the attempt's filesystem artifacts (pid file, lease
/// file, optional temporary config file) in the sense that it knows their
/// paths and clears stale copies before the attempt starts. It never
/// outlives the discovery call that created it.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    executable: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    pid_file: Option<PathBuf>,
    lease_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

impl ProcessHandle {
    /// Builds a handle for the given client executable.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            envs: Vec::new(),
            pid_file: None,
            lease_file: None,
            config_file: None,
        }
    }

    /// Appends one argument to the client command line.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments to the client command line.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the client process.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Records the pid-file artifact for this attempt.
    #[must_use]
    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    /// Records the lease-file artifact for this attempt.
    #[must_use]
    pub fn lease_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lease_file = Some(path.into());
        self
    }

    /// Records a temporary config-file artifact for this attempt.
    #[must_use]
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Path of the pid-file artifact, if one was recorded.
    #[must_use]
    pub fn pid_file_path(&self) -> Option<&Path> {
        self.pid_file.as_deref()
    }

    /// Path of the lease-file artifact, if one was recorded.
    #[must_use]
    pub fn lease_file_path(&self) -> Option<&Path> {
        self.lease_file.as_deref()
    }

    /// All artifact paths recorded on this handle.
    #[must_use]
    pub fn artifacts(&self) -> Vec<&Path> {
        [&self.pid_file, &self.lease_file, &self.config_file]
            .into_iter()
            .filter_map(|path| path.as_deref())
            .collect()
    }

    /// Deletes leftover artifacts from a previous attempt.
    ///
    /// A crashed prior run must not be mistaken for a fresh result, so the
    /// artifact paths are cleared before the client is spawned. Absent
    /// files are fine; other removal failures are logged and ignored.
    pub fn clear_stale_artifacts(&self) {
        clear_stale_artifacts(&self.artifacts());
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(&self.args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
    }

    fn command_line(&self) -> String {
        let mut rendered = self.executable.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

/// Stdout and stderr captured from a completed client run.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    /// Everything the client wrote to stdout.
    pub stdout: String,
    /// Everything the client wrote to stderr.
    pub stderr: String,
}

/// Deletes leftover artifact files, ignoring ones that do not exist.
pub fn clear_stale_artifacts(paths: &[&Path]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!(
                target: SUPERVISOR_TARGET,
                file = %path.display(),
                "removed stale artifact"
            ),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: SUPERVISOR_TARGET,
                file = %path.display(),
                error = %error,
                "failed to remove stale artifact"
            ),
        }
    }
}

/// Runs the client to completion, bounded by `timeout`.
///
/// The process is spawned with stdin closed and stdout/stderr piped;
/// drain threads keep the pipes from filling while the exit status is
/// polled against a monotonic deadline. On deadline expiry the process is
/// killed and the run fails. A non-zero exit also fails: clients invoked
/// in one-shot mode exit zero exactly when a lease was negotiated.
pub fn run_to_completion(
    handle: &ProcessHandle,
    client: &'static str,
    timeout: Duration,
) -> Result<CapturedOutput, LeaseError> {
    let mut command = handle.command();
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    debug!(
        target: SUPERVISOR_TARGET,
        client,
        command = %handle.command_line(),
        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        "spawning dhcp client"
    );

    let mut child = command.spawn().map_err(|source| {
        LeaseError::no_lease_caused_by(
            client,
            format!("failed to spawn '{}'", handle.command_line()),
            source,
        )
    })?;

    let stdout_drain = child.stdout.take().map(spawn_drain);
    let stderr_drain = child.stderr.take().map(spawn_drain);
    let deadline = deadline_after(timeout);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = join_drain(stdout_drain);
                let stderr = join_drain(stderr_drain);
                if status.success() {
                    debug!(target: SUPERVISOR_TARGET, client, "dhcp client exited cleanly");
                    return Ok(CapturedOutput { stdout, stderr });
                }
                let code = status.code().unwrap_or(-1);
                debug!(
                    target: SUPERVISOR_TARGET,
                    client,
                    code,
                    stderr = %stderr.trim(),
                    stdout = %stdout.trim(),
                    "dhcp client exited with failure"
                );
                return Err(LeaseError::no_lease(
                    client,
                    format!("exited with status {code}"),
                ));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        client,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "dhcp client timed out, killing process"
                    );
                    drop(child.kill());
                    drop(child.wait());
                    drop(join_drain(stdout_drain));
                    drop(join_drain(stderr_drain));
                    return Err(LeaseError::no_lease(
                        client,
                        format!("timed out after {}ms", timeout.as_millis()),
                    ));
                }
                thread::sleep(EXIT_POLL);
            }
            Err(source) => {
                drop(child.kill());
                drop(child.wait());
                return Err(LeaseError::no_lease_caused_by(
                    client,
                    "failed to poll client process",
                    source,
                ));
            }
        }
    }
}

fn spawn_drain<R>(stream: R) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = String::new();
        let mut reader = io::BufReader::new(stream);
        drop(reader.read_to_string(&mut buffer));
        buffer
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|drain| drain.join().ok())
        .unwrap_or_default()
}

/// Polls until every path in `paths` exists or `maxwait` elapses.
///
/// Returns the paths still missing at the deadline; an empty result means
/// all artifacts appeared in time.
#[must_use]
pub fn wait_for_files(paths: &[&Path], maxwait: Duration, quantum: Duration) -> Vec<PathBuf> {
    let deadline = deadline_after(maxwait);
    loop {
        let missing: Vec<PathBuf> = paths
            .iter()
            .filter(|path| !path.exists())
            .map(|path| path.to_path_buf())
            .collect();
        if missing.is_empty() || Instant::now() >= deadline {
            return missing;
        }
        thread::sleep(quantum);
    }
}

/// Outcome of waiting for a spawned client to detach from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonWait {
    /// Pid read from the pid file, when one could be parsed.
    pub pid: Option<i32>,
    /// Whether the pid was observed reparented to init.
    pub daemonized: bool,
}

/// Waits for the pid named by `pid_file` to be reparented to init.
///
/// A parent pid of 1 confirms the client has detached and is running as
/// intended; killing earlier could interrupt an unfinished negotiation.
/// Budget exhaustion is a warning, not a failure: the lease file may
/// already be complete even though the client has not visibly detached.
pub fn await_daemonization(
    pid_file: &Path,
    process_table: &dyn ProcessTable,
    budget: Duration,
    quantum: Duration,
) -> DaemonWait {
    let deadline = deadline_after(budget);
    let mut last_pid = None;
    loop {
        match read_pid_file(pid_file) {
            Ok(pid) => {
                last_pid = Some(pid);
                match process_table.parent_pid(pid) {
                    Ok(Some(1)) => {
                        debug!(target: SUPERVISOR_TARGET, pid, "dhcp client daemonized");
                        return DaemonWait {
                            pid: Some(pid),
                            daemonized: true,
                        };
                    }
                    Ok(_) => {}
                    Err(error) => warn!(
                        target: SUPERVISOR_TARGET,
                        pid,
                        error = %error,
                        "failed to resolve parent pid"
                    ),
                }
            }
            Err(detail) => {
                debug!(target: SUPERVISOR_TARGET, detail, "dhcp client is still initializing");
            }
        }
        if Instant::now() >= deadline {
            warn!(
                target: SUPERVISOR_TARGET,
                pid_file = %pid_file.display(),
                budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                "dhcp client did not daemonize within budget"
            );
            return DaemonWait {
                pid: last_pid,
                daemonized: false,
            };
        }
        thread::sleep(quantum);
    }
}

fn read_pid_file(pid_file: &Path) -> Result<i32, String> {
    let content =
        fs::read_to_string(pid_file).map_err(|_| format!("no pid file at {}", pid_file.display()))?;
    content
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("pid file contained [{}]", content.trim()))
}

/// What the [`ReapGuard`] should signal when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillTarget {
    /// A single process.
    Process(i32),
    /// An entire process group.
    Group(i32),
}

/// Scope guard that SIGKILLs the spawned client when dropped.
///
/// No discovery attempt may leave a DHCP daemon running past the end of
/// the call that started it, whichever way the attempt concludes. The
/// guard is armed as soon as a pid (or process group) is known and fires
/// on drop; delivery failures are logged and swallowed, because a lease
/// that was already obtained is worth more than a clean shutdown.
#[derive(Debug)]
pub struct ReapGuard {
    client: &'static str,
    target: Option<KillTarget>,
}

impl ReapGuard {
    /// Builds an unarmed guard for the named client.
    #[must_use]
    pub const fn new(client: &'static str) -> Self {
        Self {
            client,
            target: None,
        }
    }

    /// Arms the guard to kill a single process.
    pub fn arm_pid(&mut self, pid: i32) {
        self.target = Some(KillTarget::Process(pid));
    }

    /// Arms the guard to kill a whole process group.
    pub fn arm_group(&mut self, pgid: i32) {
        self.target = Some(KillTarget::Group(pgid));
    }

    /// Whether a kill target has been recorded.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.target.is_some()
    }
}

impl Drop for ReapGuard {
    fn drop(&mut self) {
        let Some(target) = self.target else {
            return;
        };
        let (result, id) = match target {
            KillTarget::Process(pid) => (kill(Pid::from_raw(pid), Signal::SIGKILL), pid),
            KillTarget::Group(pgid) => (killpg(Pid::from_raw(pgid), Signal::SIGKILL), pgid),
        };
        match result {
            Ok(()) => debug!(
                target: SUPERVISOR_TARGET,
                client = self.client,
                id,
                "killed leftover dhcp client"
            ),
            Err(Errno::ESRCH) => debug!(
                target: SUPERVISOR_TARGET,
                client = self.client,
                id,
                "dhcp client already exited"
            ),
            Err(errno) => warn!(
                target: SUPERVISOR_TARGET,
                client = self.client,
                id,
                errno = %errno,
                "failed to kill dhcp client"
            ),
        }
    }
}

#[cfg(test)]
mod tests;
