//! Unit tests for the process-supervision protocol.

use std::fs;
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use super::*;
use crate::system::MockProcessTable;

const SHORT: Duration = Duration::from_millis(50);

#[test]
fn process_handle_collects_artifacts() {
    let handle = ProcessHandle::new("/sbin/dhclient")
        .args(["-1", "-v"])
        .pid_file("/run/dhclient.pid")
        .lease_file("/run/dhclient.lease");
    assert_eq!(handle.artifacts().len(), 2);
    assert_eq!(
        handle.pid_file_path().map(Path::to_path_buf),
        Some(PathBuf::from("/run/dhclient.pid"))
    );
}

#[test]
fn clear_stale_artifacts_removes_files_and_ignores_missing() {
    let dir = TempDir::new().expect("create temp dir");
    let present = dir.path().join("dhclient.pid");
    let absent = dir.path().join("dhclient.lease");
    fs::write(&present, "999999\n").expect("write pid file");

    clear_stale_artifacts(&[present.as_path(), absent.as_path()]);
    assert!(!present.exists());

    // Running again with nothing left is a no-op.
    clear_stale_artifacts(&[present.as_path(), absent.as_path()]);
}

#[test]
fn run_to_completion_captures_stdout() {
    let handle = ProcessHandle::new("echo").arg("lease acquired");
    let output =
        run_to_completion(&handle, "echo", Duration::from_secs(5)).expect("echo should succeed");
    assert_eq!(output.stdout.trim(), "lease acquired");
    assert!(output.stderr.is_empty());
}

#[test]
fn run_to_completion_fails_on_non_zero_exit() {
    let handle = ProcessHandle::new("false");
    let error = run_to_completion(&handle, "false", Duration::from_secs(5))
        .expect_err("false should fail");
    assert!(
        matches!(error, LeaseError::NoLease { .. }),
        "expected NoLease, got: {error}"
    );
}

#[test]
fn run_to_completion_kills_on_deadline() {
    let handle = ProcessHandle::new("sleep").arg("30");
    let started = std::time::Instant::now();
    let error = run_to_completion(&handle, "sleep", Duration::from_millis(100))
        .expect_err("sleep should time out");
    assert!(
        matches!(error, LeaseError::NoLease { .. }),
        "expected NoLease, got: {error}"
    );
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "timed-out child must be reaped promptly"
    );
}

#[test]
fn run_to_completion_fails_on_missing_executable() {
    let handle = ProcessHandle::new("/nonexistent/dhcp-client");
    let error = run_to_completion(&handle, "dhclient", SHORT).expect_err("spawn should fail");
    assert!(
        matches!(error, LeaseError::NoLease { source: Some(_), .. }),
        "expected NoLease with a source, got: {error}"
    );
}

#[test]
fn deadline_saturates_on_absurd_timeouts() {
    // An unrepresentable deadline must cap out, not panic.
    let capped = deadline_after(Duration::MAX);
    assert!(capped > std::time::Instant::now());
}

#[test]
fn wait_for_files_tolerates_maximum_wait() {
    let dir = TempDir::new().expect("create temp dir");
    let file = dir.path().join("dhclient.lease");
    fs::write(&file, "lease {}\n").expect("write lease file");

    let missing = wait_for_files(&[file.as_path()], Duration::MAX, ARTIFACT_POLL);
    assert!(missing.is_empty());
}

#[test]
fn wait_for_files_returns_empty_when_all_present() {
    let dir = TempDir::new().expect("create temp dir");
    let file = dir.path().join("dhclient.lease");
    fs::write(&file, "lease {}\n").expect("write lease file");

    let missing = wait_for_files(&[file.as_path()], SHORT, ARTIFACT_POLL);
    assert!(missing.is_empty());
}

#[test]
fn wait_for_files_reports_missing_at_deadline() {
    let dir = TempDir::new().expect("create temp dir");
    let present = dir.path().join("dhclient.pid");
    let absent = dir.path().join("dhclient.lease");
    fs::write(&present, "4242\n").expect("write pid file");

    let missing = wait_for_files(&[present.as_path(), absent.as_path()], SHORT, ARTIFACT_POLL);
    assert_eq!(missing, vec![absent]);
}

#[rstest]
#[case::reparented_to_init(Some(1), true)]
#[case::still_attached(Some(4000), false)]
fn await_daemonization_checks_parent_pid(#[case] ppid: Option<i32>, #[case] daemonized: bool) {
    let dir = TempDir::new().expect("create temp dir");
    let pid_file = dir.path().join("dhclient.pid");
    fs::write(&pid_file, "4321\n").expect("write pid file");

    let mut table = MockProcessTable::new();
    table
        .expect_parent_pid()
        .withf(|pid| *pid == 4321)
        .returning(move |_| Ok(ppid));

    let wait = await_daemonization(&pid_file, &table, SHORT, ARTIFACT_POLL);
    assert_eq!(wait.pid, Some(4321));
    assert_eq!(wait.daemonized, daemonized);
}

#[rstest]
#[case::absent_pid_file(None)]
#[case::garbage_pid_file(Some("not-a-pid\n"))]
fn await_daemonization_tolerates_bad_pid_files(#[case] content: Option<&str>) {
    let dir = TempDir::new().expect("create temp dir");
    let pid_file = dir.path().join("dhclient.pid");
    if let Some(content) = content {
        fs::write(&pid_file, content).expect("write pid file");
    }

    let table = MockProcessTable::new();
    let wait = await_daemonization(&pid_file, &table, SHORT, ARTIFACT_POLL);
    assert_eq!(wait.pid, None);
    assert!(!wait.daemonized);
}

#[test]
fn unarmed_reap_guard_is_a_no_op() {
    let guard = ReapGuard::new("dhclient");
    assert!(!guard.is_armed());
    drop(guard);
}

#[test]
fn armed_reap_guard_tolerates_vanished_process() {
    // Pid numbers above the kernel default pid_max cannot exist, so the
    // SIGKILL fails with ESRCH, which the guard must swallow.
    let mut guard = ReapGuard::new("dhcpcd");
    guard.arm_pid(i32::MAX - 1);
    assert!(guard.is_armed());
    drop(guard);
}
