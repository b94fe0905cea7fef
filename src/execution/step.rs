//! Individual Step Execution
//!
//! Runs one resolved command as a child process:
//! - `sh -c` in its own process group, stdin detached
//! - stdout and stderr forwarded line by line as they arrive
//! - operator signals observed concurrently with the process
//! - optional deadline from the step's `timeout`
//!
//! Termination (skip, interrupt or deadline) sends SIGTERM to the process
//! group, waits for the grace period, then kills it.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use super::display;
use super::operator::{OperatorSignal, SignalReceiver};
use crate::error::{Result, RunnerError};
use crate::workflow::StepSpec;

/// Shell used to run commands.
const DEFAULT_SHELL: &str = "sh";

/// Time a terminated step gets before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound on waiting for buffered output once a process is gone.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between "still running" debug messages.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Number of stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// Capacity of the output channel between readers and the step loop.
const OUTPUT_BUFFER: usize = 256;

/// How a step ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Exit code 0
    Completed,
    /// Non-zero exit or killed by a signal
    Failed {
        code: Option<i32>,
        stderr_tail: Vec<String>,
    },
    /// Terminated because the operator sent end-of-input
    Skipped,
    /// Terminated because the step deadline elapsed
    TimedOut,
    /// Terminated because the operator asked to stop the run
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct OutputLine {
    stream: Stream,
    text: String,
}

/// Why the step loop stopped waiting on the process.
enum Stop {
    Exited(ExitStatus),
    Terminate(StepOutcome),
}

/// Runs step commands.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    shell: String,
    grace_period: Duration,
    drain_timeout: Duration,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl StepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a terminated step may take to exit before it is killed.
    pub fn set_grace_period(&mut self, grace_period: Duration) {
        self.grace_period = grace_period;
    }

    /// Sets how long to keep printing output after the process is gone.
    pub fn set_drain_timeout(&mut self, drain_timeout: Duration) {
        self.drain_timeout = drain_timeout;
    }

    /// Executes an already-resolved command for `step`.
    ///
    /// # Returns
    ///
    /// * `Ok(StepOutcome)` - how the process ended
    /// * `Err(RunnerError::Spawn)` - the shell could not be started
    pub async fn execute(
        &self,
        step: &StepSpec,
        command: &str,
        signals: &mut SignalReceiver,
    ) -> Result<StepOutcome> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            step: step.name.clone(),
            source,
        })?;
        debug!("Step '{}' started (pid {:?})", step.name, child.id());

        let (line_tx, mut line_rx) = mpsc::channel(OUTPUT_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, Stream::Stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, Stream::Stderr, line_tx.clone()));
        }
        drop(line_tx);

        let started = Instant::now();
        let deadline = step.timeout_duration().and_then(|limit| {
            let deadline = started.checked_add(limit);
            if deadline.is_none() {
                warn!(
                    "Timeout of step '{}' ({:?}) is too far out; running without a deadline",
                    step.name, limit
                );
            }
            deadline
        });
        let mut heartbeat = time::interval_at(started + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut signals_open = true;

        let stop = loop {
            tokio::select! {
                status = child.wait() => break Stop::Exited(status?),
                Some(line) = line_rx.recv() => emit(line, &mut stderr_tail),
                signal = signals.recv(), if signals_open => match signal {
                    Some(OperatorSignal::EndOfInput) => {
                        info!("Skip requested for step '{}'", step.name);
                        break Stop::Terminate(StepOutcome::Skipped);
                    }
                    Some(OperatorSignal::Interrupt) => {
                        info!("Interrupt requested during step '{}'", step.name);
                        break Stop::Terminate(StepOutcome::Interrupted);
                    }
                    Some(OperatorSignal::Line(text)) => {
                        debug!("Ignoring operator input while running: {:?}", text);
                    }
                    None => signals_open = false,
                },
                _ = wait_for_deadline(deadline) => {
                    warn!(
                        "Step '{}' exceeded its timeout of {:?}",
                        step.name,
                        step.timeout_duration().unwrap_or_default()
                    );
                    break Stop::Terminate(StepOutcome::TimedOut);
                }
                _ = heartbeat.tick() => {
                    debug!("Step '{}' still running ({:?})", step.name, started.elapsed());
                }
            }
        };

        let outcome = match stop {
            Stop::Exited(status) => {
                drain_output(&mut line_rx, &mut stderr_tail, self.drain_timeout).await;
                classify(status, stderr_tail)
            }
            Stop::Terminate(outcome) => {
                self.terminate(&mut child, &step.name).await;
                drain_output(&mut line_rx, &mut stderr_tail, self.drain_timeout).await;
                outcome
            }
        };

        debug!(
            "Step '{}' finished in {:?}: {:?}",
            step.name,
            started.elapsed(),
            outcome
        );
        Ok(outcome)
    }

    /// SIGTERM to the process group, grace period, then SIGKILL.
    async fn terminate(&self, child: &mut Child, step_name: &str) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let group = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(group, Signal::SIGTERM) {
                debug!("SIGTERM to step '{}' failed: {}", step_name, e);
            }

            if time::timeout(self.grace_period, child.wait()).await.is_ok() {
                return;
            }

            warn!(
                "Step '{}' ignored SIGTERM for {:?}; killing it",
                step_name, self.grace_period
            );
            let _ = killpg(group, Signal::SIGKILL);
        }

        if let Err(e) = child.kill().await {
            debug!("Kill of step '{}' failed: {}", step_name, e);
        }
    }
}

async fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf).trim_end_matches(['\n', '\r']).to_string();
                if tx.send(OutputLine { stream, text }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Stopped reading {:?}: {}", stream, e);
                break;
            }
        }
    }
}

fn emit(line: OutputLine, stderr_tail: &mut VecDeque<String>) {
    let is_stderr = line.stream == Stream::Stderr;
    display::output_line(&line.text, is_stderr);

    if is_stderr {
        if stderr_tail.len() == STDERR_TAIL_LINES {
            stderr_tail.pop_front();
        }
        stderr_tail.push_back(line.text);
    }
}

/// Prints whatever output is still buffered. Bounded, since a background
/// process may keep the pipes open.
async fn drain_output(
    line_rx: &mut mpsc::Receiver<OutputLine>,
    stderr_tail: &mut VecDeque<String>,
    limit: Duration,
) {
    let drained = time::timeout(limit, async {
        while let Some(line) = line_rx.recv().await {
            emit(line, stderr_tail);
        }
    })
    .await;

    if drained.is_err() {
        debug!("Output pipes still open after {:?}", limit);
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn classify(status: ExitStatus, stderr_tail: VecDeque<String>) -> StepOutcome {
    if status.success() {
        StepOutcome::Completed
    } else {
        StepOutcome::Failed {
            code: exit_status_code(&status),
            stderr_tail: stderr_tail.into(),
        }
    }
}

/// Exit code, using 128+signal for signal-terminated processes on Unix.
pub(crate) fn exit_status_code(status: &ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    None
}
