//! Execution engine for managed jobs.
//!
//! Two ways to execute a job's command outside of cron:
//!
//! - **Run now** ([`Engine::run_now`]): blocks until the command exits, with
//!   no engine timeout, streaming combined stdout/stderr to the caller while
//!   buffering it for the history record.
//! - **Test** ([`Engine::test`]): static checks from [`analysis`] plus an
//!   optional execution under a hard wall-clock timeout. Test records are
//!   filed under `<name>-test` so they never mix with production history.
//!
//! Each invocation moves `Pending -> Running -> {Succeeded, Failed, TimedOut}`.
//! A non-zero exit is a normal outcome; only failures to start are errors.

pub mod analysis;

use crate::config::Settings;
use crate::crontab::ManagedBlock;
use crate::history::{ExecutionRecord, HistoryLog, Trigger, test_job_name};
use crate::{Error, Result};
use analysis::{ExecutableCheck, Hint, PathCheck};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// How often a bounded execution checks for a user interrupt.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to keep draining output after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Keep the process alive on Ctrl-C so an interrupted run is still recorded.
///
/// The child of a run-now shares the terminal's process group and receives
/// the interrupt itself; bounded test executions run in their own group and
/// are killed when the flag is seen.
pub fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
        tracing::warn!("could not install interrupt handler: {}", e);
    }
}

fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Terminal outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        }
    }

    fn from_exit(status: &ExitStatus) -> Self {
        if status.success() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a single invocation, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Finished(RunStatus),
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running => write!(f, "running"),
            RunState::Finished(status) => write!(f, "{}", status),
        }
    }
}

fn transition(job: &str, from: RunState, to: RunState) {
    tracing::debug!(job, "{} -> {}", from, to);
}

/// Raw result of running a command.
#[derive(Debug, Clone)]
pub struct Execution {
    pub status: RunStatus,
    /// `None` when the process was killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Combined stdout/stderr in arrival order
    pub output: String,
}

/// Check that a job can be started at all.
fn ensure_runnable(job: &str, command: &str) -> Result<()> {
    if command.trim().is_empty() {
        return Err(Error::EmptyCommand(job.to_string()));
    }
    Ok(())
}

fn spawn(shell: &str, job: &str, command: &str, own_group: bool) -> Result<Child> {
    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        if own_group {
            cmd.process_group(0);
        }
    }
    #[cfg(not(unix))]
    let _ = own_group;

    cmd.spawn().map_err(|source| Error::Spawn {
        job: job.to_string(),
        source,
    })
}

/// Forward each line of a pipe to the channel until EOF.
fn forward_lines<R: Read + Send + 'static>(pipe: R, tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

/// Attach reader threads to the child's stdout and stderr.
fn capture_output(child: &mut Child) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx);
    }
    rx
}

fn push_line(output: &mut String, line: &str) {
    output.push_str(line);
    output.push('\n');
}

/// Collect what is left in the pipes once the child has exited, for at most
/// [`DRAIN_GRACE`].
fn drain_after_exit(rx: &Receiver<String>, job: &str, on_line: &mut dyn FnMut(&str)) {
    let drain_until = Instant::now() + DRAIN_GRACE;
    loop {
        let remaining = drain_until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) => on_line(&line),
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!(job, "output still open after exit, stopped draining");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Run a command until the shell exits, streaming each output line to `sink`.
///
/// Completion is decided by the child process, not by its pipes.
pub fn execute_streaming(
    shell: &str,
    job: &str,
    command: &str,
    sink: &mut dyn FnMut(&str),
) -> Result<Execution> {
    ensure_runnable(job, command)?;
    transition(job, RunState::Pending, RunState::Running);

    let started_at = Utc::now();
    let start = Instant::now();
    let mut child = spawn(shell, job, command, false)?;
    let rx = capture_output(&mut child);

    let mut output = String::new();
    let exit = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                sink(&line);
                push_line(&mut output, &line);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break child.wait()?,
        }
        if let Some(exit) = child.try_wait()? {
            break exit;
        }
    };
    let duration = start.elapsed();

    // Background processes started by the job may hold the pipes open.
    drain_after_exit(&rx, job, &mut |line: &str| {
        sink(line);
        push_line(&mut output, line);
    });

    let mut status = RunStatus::from_exit(&exit);
    if interrupted() && exit.code().is_none() {
        tracing::warn!(job, "run interrupted by user");
        status = RunStatus::Failed;
    }
    transition(job, RunState::Running, RunState::Finished(status));

    Ok(Execution {
        status,
        exit_code: exit.code(),
        started_at,
        duration,
        output,
    })
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        tracing::debug!("killpg failed ({}), killing child only", e);
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Run a command under a hard wall-clock timeout.
///
/// On expiry the child's whole process group is killed and the outcome is
/// [`RunStatus::TimedOut`].
pub fn execute_bounded(
    shell: &str,
    job: &str,
    command: &str,
    timeout: Duration,
) -> Result<Execution> {
    ensure_runnable(job, command)?;
    transition(job, RunState::Pending, RunState::Running);

    let started_at = Utc::now();
    let start = Instant::now();
    let mut child = spawn(shell, job, command, true)?;
    let rx = capture_output(&mut child);

    let deadline = start + timeout;
    let exit = loop {
        let now = Instant::now();
        if now >= deadline {
            break None;
        }
        let slice = POLL_INTERVAL.min(deadline - now);
        if let Some(exit) = child.wait_timeout(slice)? {
            break Some(exit);
        }
        if interrupted() {
            tracing::warn!(job, "test interrupted by user");
            kill_tree(&mut child);
            let exit = child.wait()?;
            break Some(exit);
        }
    };

    let (status, exit_code) = match exit {
        Some(exit) if interrupted() && exit.code().is_none() => (RunStatus::Failed, None),
        Some(exit) => (RunStatus::from_exit(&exit), exit.code()),
        None => {
            kill_tree(&mut child);
            child.wait()?;
            (RunStatus::TimedOut, None)
        }
    };
    let duration = start.elapsed();

    let mut output = String::new();
    drain_after_exit(&rx, job, &mut |line: &str| push_line(&mut output, line));

    transition(job, RunState::Running, RunState::Finished(status));
    Ok(Execution {
        status,
        exit_code,
        started_at,
        duration,
        output,
    })
}

/// Result of a run-now.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub record: ExecutionRecord,
    /// Full combined output
    pub output: String,
    /// Problems writing history or the job log
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Options for a test.
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// Execute the command under the timeout after the static checks
    pub execute: bool,
    pub timeout: Duration,
}

/// Result of a test.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub job_name: String,
    pub command: String,
    pub hints: Vec<Hint>,
    pub paths: Vec<PathCheck>,
    pub executables: Vec<ExecutableCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<RunReport>,
}

impl TestReport {
    /// Paths whose parent directory is missing.
    pub fn flagged_paths(&self) -> usize {
        self.paths.iter().filter(|p| p.status.is_flagged()).count()
    }

    /// Known executables that could not be resolved.
    pub fn missing_executables(&self) -> usize {
        self.executables.iter().filter(|e| !e.found()).count()
    }

    /// Final status of the bounded execution, if one ran.
    pub fn status(&self) -> Option<RunStatus> {
        self.execution.as_ref().map(|r| r.record.status)
    }
}

/// Runs and tests managed jobs, recording every execution.
pub struct Engine<'a> {
    settings: &'a Settings,
    history: HistoryLog,
}

impl<'a> Engine<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            history: HistoryLog::from_settings(settings),
        }
    }

    /// Execute a job now, streaming output to `sink`, and record it.
    pub fn run_now(&self, block: &ManagedBlock, sink: &mut dyn FnMut(&str)) -> Result<RunReport> {
        tracing::info!(job = %block.name, "running job now");
        let execution = execute_streaming(&self.settings.shell, &block.name, &block.command, sink)?;
        Ok(self.finish(&block.name, Trigger::Manual, &block.command, execution))
    }

    /// Static checks plus an optional bounded execution.
    pub fn test(&self, block: &ManagedBlock, options: &TestOptions) -> Result<TestReport> {
        ensure_runnable(&block.name, &block.command)?;

        let hints = analysis::hints(&block.command, &self.settings.log_dir);
        let paths = analysis::check_paths(&block.command);
        let executables = analysis::check_executables(&block.command);

        let execution = if options.execute {
            let job_name = test_job_name(&block.name);
            tracing::info!(job = %job_name, timeout_secs = options.timeout.as_secs(), "test execution");
            let execution = execute_bounded(
                &self.settings.shell,
                &job_name,
                &block.command,
                options.timeout,
            )?;
            Some(self.finish(&job_name, Trigger::Test, &block.command, execution))
        } else {
            None
        };

        Ok(TestReport {
            job_name: block.name.clone(),
            command: block.command.clone(),
            hints,
            paths,
            executables,
            execution,
        })
    }

    fn finish(
        &self,
        job_name: &str,
        trigger: Trigger,
        command: &str,
        execution: Execution,
    ) -> RunReport {
        let record = ExecutionRecord::from_execution(
            job_name,
            trigger,
            &execution,
            self.settings.output_snippet_chars,
        );

        let mut warnings = Vec::new();
        if let Err(e) = self.history.append(&record) {
            tracing::warn!(job = job_name, "failed to append history: {}", e);
            warnings.push(format!("Failed to append execution history: {}", e));
        }
        if let Err(e) = self.history.append_job_log(&record, command, &execution.output) {
            tracing::warn!(job = job_name, "failed to write job log: {}", e);
            warnings.push(format!("Failed to write job log: {}", e));
        }

        RunReport {
            record,
            output: execution.output,
            warnings,
        }
    }
}
