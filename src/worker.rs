use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::error::{Result, ShellError};

/// How to launch the backend: `executable script`, rooted at `working_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLaunch {
    pub executable: String,
    pub script: PathBuf,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Receives worker diagnostics one line at a time.
pub trait LogSink: Send + Sync {
    fn line(&self, stream: OutputStream, line: &str);
}

/// Forwards worker output to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogForwarder;

impl LogSink for LogForwarder {
    fn line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => log::info!("[worker] {}", line),
            OutputStream::Stderr => log::error!("[worker:stderr] {}", line),
        }
    }
}

/// Outcome of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The worker had already exited, so no signal was sent.
    NotRunning,
    /// Signal sent; exit was not observed.
    Requested,
    /// Signal sent and the worker exited. `None` means it died by signal.
    Confirmed(Option<i32>),
}

/// Launches and terminates the backend worker.
///
/// `terminate` consumes the handle, so a session can signal its worker
/// at most once.
pub trait WorkerLauncher {
    type Handle;

    /// Spawn failures are logged, never returned.
    fn start(&self, launch: &WorkerLaunch) -> Option<Self::Handle>;

    fn terminate(&self, handle: Self::Handle) -> Termination;
}

#[derive(Default)]
struct ExitState {
    // Outer `Some` once the process has been reaped
    status: Mutex<Option<Option<i32>>>,
    exited: Condvar,
    terminating: AtomicBool,
}

/// A running worker process. The child itself is owned by the monitor thread.
pub struct WorkerHandle {
    pid: u32,
    exit: Arc<ExitState>,
}

impl WorkerHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exit.status.lock().is_some()
    }

    /// Exit code once reaped. `Some(None)` means killed by a signal.
    pub fn exit_code(&self) -> Option<Option<i32>> {
        *self.exit.status.lock()
    }

    /// Block for up to `timeout` waiting for the worker to be reaped.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Option<i32>> {
        let mut status = self.exit.status.lock();
        if status.is_none() {
            let _ = self
                .exit
                .exited
                .wait_while_for(&mut status, |s| s.is_none(), timeout);
        }
        *status
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("pid", &self.pid)
            .field("exit", &self.exit_code())
            .finish()
    }
}

/// Supervises the backend as a child process.
///
/// Output is drained on two reader threads and forwarded to the sink as it
/// arrives. A third thread reaps the child and records its exit. There is no
/// restart: a crash is logged and the session carries on without a backend.
pub struct ProcessSupervisor {
    sink: Arc<dyn LogSink>,
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Arc::new(LogForwarder))
    }
}

impl ProcessSupervisor {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            grace: Duration::ZERO,
        }
    }

    /// Wait up to `grace` after signalling so termination can be confirmed.
    /// The wait never escalates to a kill.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn spawn(&self, launch: &WorkerLaunch) -> Result<WorkerHandle> {
        log::info!(
            "Starting worker: {} {} (cwd {})",
            launch.executable,
            launch.script.display(),
            launch.working_dir.display()
        );

        // The monitor exists before the process does, so a spawned child
        // always has an owner that reaps it.
        let exit = Arc::new(ExitState::default());
        let (child_tx, child_rx) = mpsc::sync_channel(1);
        monitor(child_rx, exit.clone())?;

        let mut child = Command::new(&launch.executable)
            .arg(&launch.script)
            .current_dir(&launch.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ShellError::Spawn {
                executable: launch.executable.clone(),
                source,
            })?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, OutputStream::Stdout, self.sink.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            drain(stderr, OutputStream::Stderr, self.sink.clone());
        }

        if let Err(mpsc::SendError(child)) = child_tx.send(child) {
            abandon(child);
            return Err(ShellError::Io(std::io::Error::other(
                "worker monitor exited before the process started",
            )));
        }

        log::info!("Worker started with pid {}", pid);
        Ok(WorkerHandle { pid, exit })
    }
}

impl WorkerLauncher for ProcessSupervisor {
    type Handle = WorkerHandle;

    fn start(&self, launch: &WorkerLaunch) -> Option<WorkerHandle> {
        match self.spawn(launch) {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.sink.line(OutputStream::Stderr, &e.to_string());
                None
            }
        }
    }

    fn terminate(&self, handle: WorkerHandle) -> Termination {
        {
            // The monitor only reaps while holding this lock, so the pid
            // cannot be recycled between the check and the signal.
            let status = handle.exit.status.lock();
            if status.is_some() {
                log::info!("Worker {} already exited", handle.pid);
                return Termination::NotRunning;
            }

            handle.exit.terminating.store(true, Ordering::SeqCst);
            if let Err(e) = send_terminate(handle.pid) {
                log::warn!("Failed to signal worker {}: {}", handle.pid, e);
                return Termination::Requested;
            }
        }
        log::info!("Sent termination signal to worker {}", handle.pid);

        if self.grace.is_zero() {
            return Termination::Requested;
        }
        match handle.wait_timeout(self.grace) {
            Some(code) => Termination::Confirmed(code),
            None => {
                log::warn!(
                    "Worker {} still running {}ms after termination signal",
                    handle.pid,
                    self.grace.as_millis()
                );
                Termination::Requested
            }
        }
    }
}

fn drain<R>(reader: R, stream: OutputStream, sink: Arc<dyn LogSink>)
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("worker-{}", stream))
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        sink.line(stream, line.trim_end_matches(['\r', '\n']));
                    }
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        log::error!("Failed to start {} reader for worker: {}", stream, e);
    }
}

fn monitor(child_rx: mpsc::Receiver<Child>, exit: Arc<ExitState>) -> Result<()> {
    thread::Builder::new()
        .name("worker-monitor".to_string())
        .spawn(move || {
            // Sender dropped: the process never started
            let Ok(mut child) = child_rx.recv() else {
                return;
            };
            let pid = child.id();
            let result = reap(&mut child, &exit);
            exit.exited.notify_all();

            match result {
                Ok(status) => {
                    let expected = exit.terminating.load(Ordering::SeqCst);
                    if status.success() || expected {
                        log::info!("Worker {} exited: {}", pid, status);
                    } else {
                        log::warn!("Worker {} crashed: {}", pid, status);
                    }
                }
                Err(e) => log::error!("Failed to wait on worker {}: {}", pid, e),
            }
        })?;
    Ok(())
}

/// Wait for exit and record the status. The pid is released only while the
/// status lock is held.
#[cfg(unix)]
fn reap(child: &mut Child, exit: &ExitState) -> std::io::Result<ExitStatus> {
    if let Err(e) = wait_exited(child.id()) {
        log::warn!("waitid failed for worker {}: {}", child.id(), e);
        let result = child.wait();
        *exit.status.lock() = Some(result.as_ref().ok().and_then(ExitStatus::code));
        return result;
    }
    let mut status = exit.status.lock();
    let result = child.wait();
    *status = Some(result.as_ref().ok().and_then(ExitStatus::code));
    result
}

// Windows never reuses a pid while a handle to the process is open, and
// `child` keeps one open until the status is recorded.
#[cfg(windows)]
fn reap(child: &mut Child, exit: &ExitState) -> std::io::Result<ExitStatus> {
    let result = child.wait();
    *exit.status.lock() = Some(result.as_ref().ok().and_then(ExitStatus::code));
    result
}

/// Block until `pid` exits, leaving it unreaped.
#[cfg(unix)]
fn wait_exited(pid: u32) -> std::io::Result<()> {
    loop {
        // Safety: siginfo_t is plain data; waitid only writes into it
        let rc = unsafe {
            let mut info: libc::siginfo_t = std::mem::zeroed();
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Reap a child that no monitor owns.
fn abandon(mut child: Child) {
    log::error!("Killing unmonitored worker {}", child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    // Safety: kill() only sends a signal, no memory is touched
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Ask politely first. Console processes usually refuse a plain taskkill,
/// and then the worker is force-stopped: this is the one place shutdown is
/// not graceful, since Windows has no SIGTERM to send.
#[cfg(windows)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    if taskkill(pid, false)? {
        return Ok(());
    }
    log::warn!("Worker {} ignored graceful taskkill, forcing", pid);
    if taskkill(pid, true)? {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("taskkill /F failed for {}", pid)))
    }
}

#[cfg(windows)]
fn taskkill(pid: u32, force: bool) -> std::io::Result<bool> {
    let status = Command::new("taskkill")
        .args(taskkill_args(pid, force))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(status.success())
}

#[cfg(windows)]
fn taskkill_args(pid: u32, force: bool) -> Vec<String> {
    let mut args = vec!["/PID".to_string(), pid.to_string(), "/T".to_string()];
    if force {
        args.push("/F".to_string());
    }
    args
}

#[cfg(all(test, windows))]
mod windows_tests {
    use super::*;

    #[test]
    fn taskkill_is_graceful_unless_forced() {
        assert_eq!(taskkill_args(7, false), ["/PID", "7", "/T"]);
        assert_eq!(taskkill_args(7, true), ["/PID", "7", "/T", "/F"]);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(OutputStream, String)>>,
        updated: Condvar,
    }

    impl RecordingSink {
        fn wait_for(&self, count: usize) -> Vec<(OutputStream, String)> {
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut lines = self.lines.lock();
            while lines.len() < count {
                if self.updated.wait_until(&mut lines, deadline).timed_out() {
                    break;
                }
            }
            lines.clone()
        }
    }

    impl LogSink for RecordingSink {
        fn line(&self, stream: OutputStream, line: &str) {
            self.lines.lock().push((stream, line.to_string()));
            self.updated.notify_all();
        }
    }

    fn script(dir: &tempfile::TempDir, body: &str) -> WorkerLaunch {
        let path = dir.path().join("worker.sh");
        std::fs::write(&path, body).unwrap();
        WorkerLaunch {
            executable: "sh".to_string(),
            script: path,
            working_dir: dir.path().to_path_buf(),
        }
    }

    #[test]
    fn forwards_both_streams_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let launch = script(&dir, "echo ready\necho one\necho oops 1>&2\n");
        let sink = Arc::new(RecordingSink::default());
        let supervisor = ProcessSupervisor::new(sink.clone());

        let handle = supervisor.start(&launch).expect("worker should spawn");
        let lines = sink.wait_for(3);

        let stdout: Vec<_> = lines
            .iter()
            .filter(|(s, _)| *s == OutputStream::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout, ["ready", "one"]);
        assert!(lines.contains(&(OutputStream::Stderr, "oops".to_string())));
        assert_eq!(handle.wait_timeout(Duration::from_secs(5)), Some(Some(0)));
    }

    #[test]
    fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let launch = script(&dir, "pwd\n");
        let sink = Arc::new(RecordingSink::default());
        ProcessSupervisor::new(sink.clone()).start(&launch).unwrap();

        let lines = sink.wait_for(1);
        let reported = std::fs::canonicalize(&lines[0].1).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn missing_executable_is_logged_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let launch = WorkerLaunch {
            executable: "ada-no-such-interpreter".to_string(),
            script: dir.path().join("server.py"),
            working_dir: dir.path().to_path_buf(),
        };
        let sink = Arc::new(RecordingSink::default());

        assert!(ProcessSupervisor::new(sink.clone()).start(&launch).is_none());
        let lines = sink.wait_for(1);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, OutputStream::Stderr);
        assert!(lines[0].1.contains("failed to spawn"), "{}", lines[0].1);
    }

    #[test]
    fn terminate_signals_running_worker() {
        let dir = tempfile::tempdir().unwrap();
        let launch = script(&dir, "echo up\nexec sleep 30\n");
        let sink = Arc::new(RecordingSink::default());
        let supervisor =
            ProcessSupervisor::new(sink.clone()).with_grace(Duration::from_secs(5));

        let handle = supervisor.start(&launch).unwrap();
        sink.wait_for(1);
        assert!(!handle.has_exited());

        // SIGTERM leaves no exit code
        assert_eq!(supervisor.terminate(handle), Termination::Confirmed(None));
    }

    #[test]
    fn terminate_without_grace_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let launch = script(&dir, "exec sleep 30\n");
        let supervisor = ProcessSupervisor::new(Arc::new(RecordingSink::default()));

        let handle = supervisor.start(&launch).unwrap();
        let exit = handle.exit.clone();
        assert_eq!(supervisor.terminate(handle), Termination::Requested);

        let mut status = exit.status.lock();
        if status.is_none() {
            let _ = exit
                .exited
                .wait_while_for(&mut status, |s| s.is_none(), Duration::from_secs(5));
        }
        assert_eq!(*status, Some(None));
    }

    #[test]
    fn crashed_worker_is_not_signalled() {
        let dir = tempfile::tempdir().unwrap();
        let launch = script(&dir, "echo boom 1>&2\nexit 3\n");
        let sink = Arc::new(RecordingSink::default());
        let supervisor = ProcessSupervisor::new(sink.clone());

        let handle = supervisor.start(&launch).unwrap();
        assert_eq!(handle.wait_timeout(Duration::from_secs(5)), Some(Some(3)));
        assert_eq!(supervisor.terminate(handle), Termination::NotRunning);
    }

    fn alive(pid: u32) -> bool {
        // Safety: signal 0 only checks existence
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[test]
    fn exited_child_stays_unreaped_until_waited() {
        let mut child = Command::new("sh").args(["-c", "exit 0"]).spawn().unwrap();
        let pid = child.id();

        wait_exited(pid).unwrap();
        // Zombie still holds the pid, so it cannot be recycled yet
        assert!(alive(pid));

        assert!(child.wait().unwrap().success());
        assert!(!alive(pid));
    }

    #[test]
    fn abandoned_child_is_killed_and_reaped() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(alive(pid));

        abandon(child);
        assert!(!alive(pid));
    }

    #[test]
    fn monitor_records_exit_before_notifying() {
        let dir = tempfile::tempdir().unwrap();
        let launch = script(&dir, "exit 0\n");
        let supervisor = ProcessSupervisor::new(Arc::new(RecordingSink::default()));

        let handle = supervisor.start(&launch).unwrap();
        assert_eq!(handle.wait_timeout(Duration::from_secs(5)), Some(Some(0)));
        assert!(!alive(handle.pid()));
        assert_eq!(supervisor.terminate(handle), Termination::NotRunning);
    }

    #[test]
    fn invalid_utf8_is_forwarded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let launch = script(&dir, "printf 'a\\377b\\r\\n'\n");
        let sink = Arc::new(RecordingSink::default());
        ProcessSupervisor::new(sink.clone()).start(&launch).unwrap();

        let lines = sink.wait_for(1);
        assert_eq!(lines[0].1, "a\u{FFFD}b");
    }
}
