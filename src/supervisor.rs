use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::command::InvocationDescriptor;
use crate::output::{ResultFilter, Utf8Decoder};
use crate::tool::ToolKind;

pub const KILL_GRACE: Duration = Duration::from_secs(2);
const REAPER_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(16);
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_secs(1);
const SHUTDOWN_SLACK: Duration = Duration::from_millis(100);
const READ_CHUNK_SIZE: usize = 8192;
const MAX_EVENTS_PER_POLL: usize = 256;
const STDERR_PREFIX: &str = "\nError: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Cancelling,
    Completed,
    Failed(FailureKind),
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Cancelling)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed(FailureKind::Cancelled) => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("tool not found or not startable: {0}")]
    Spawn(String),

    #[error("exit code {code}")]
    Runtime { code: i32 },

    #[error("terminated by signal {signal}")]
    Signalled { signal: i32 },

    #[error("lost track of the process: {0}")]
    Wait(String),

    #[error("timed out after {}", format_budget(.budget))]
    Timeout { budget: Duration },

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(FailureKind),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn into_state(self) -> RunState {
        match self {
            Self::Completed => RunState::Completed,
            Self::Failed(kind) => RunState::Failed(kind),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Please enter a prompt")]
    EmptyPrompt,

    #[error("an invocation is already running in this panel")]
    Busy,

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Receives everything a run produces. Called only from the thread that polls the supervisor.
pub trait RunSink {
    /// Raw child output for diagnostics; stderr chunks arrive prefixed.
    fn on_execution_chunk(&mut self, text: &str);

    /// The whole filtered stdout so far, replacing whatever was shown before.
    fn on_result(&mut self, content: &str);

    fn on_state_change(&mut self, _state: &RunState) {}
}

/// A sink that keeps everything, for headless runs and inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTranscript {
    pub execution_log: String,
    pub result: String,
    pub states: Vec<RunState>,
}

impl RunSink for RunTranscript {
    fn on_execution_chunk(&mut self, text: &str) {
        self.execution_log.push_str(text);
    }

    fn on_result(&mut self, content: &str) {
        self.result.clear();
        self.result.push_str(content);
    }

    fn on_state_change(&mut self, state: &RunState) {
        self.states.push(state.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorLimits {
    /// Replaces the tool's own budget when set.
    pub timeout: Option<Duration>,
    pub kill_grace: Duration,
}

impl Default for SupervisorLimits {
    fn default() -> Self {
        Self {
            timeout: None,
            kill_grace: KILL_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug)]
enum ChildEvent {
    Output(StreamKind, String),
    Exited(ExitStatus),
    WaitFailed(String),
}

#[derive(Debug)]
struct TaggedEvent {
    run_id: u64,
    event: ChildEvent,
}

#[derive(Debug, Clone, Copy)]
enum ProcessControl {
    Terminate,
}

/// The single live-process slot. Dropping it closes the control channel, which the reaper
/// treats as a termination request.
#[derive(Debug)]
struct ActiveRun {
    run_id: u64,
    pid: u32,
    budget: Duration,
    deadline: Instant,
    control_tx: Sender<ProcessControl>,
    reaper: JoinHandle<()>,
    result: ResultFilter,
}

/// Runs one assistant process at a time and turns its life into sink callbacks.
#[derive(Debug)]
pub struct Supervisor {
    state: RunState,
    active: Option<ActiveRun>,
    limits: SupervisorLimits,
    next_run_id: u64,
    event_tx: Sender<TaggedEvent>,
    event_rx: Receiver<TaggedEvent>,
    /// Reapers of runs that were abandoned while their process was still alive.
    retiring: Vec<JoinHandle<()>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::with_limits(SupervisorLimits::default())
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SupervisorLimits) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            state: RunState::Idle,
            active: None,
            limits,
            next_run_id: 1,
            event_tx,
            event_rx,
            retiring: Vec::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_pid(&self) -> Option<u32> {
        self.active.as_ref().map(|active| active.pid)
    }

    /// Spawns the descriptor's process. A previous terminal state first moves back to `Idle`.
    /// A spawn failure leaves the supervisor in `Failed(Spawn)` without emitting any output.
    pub fn start(
        &mut self,
        descriptor: &InvocationDescriptor,
        tool: ToolKind,
        cwd: &Path,
        sink: &mut dyn RunSink,
    ) -> Result<(), RunError> {
        if self.active.is_some() {
            return Err(RunError::Busy);
        }
        if self.state != RunState::Idle {
            self.transition(RunState::Idle, sink);
        }

        let mut command = Command::new(&descriptor.executable);
        command
            .args(&descriptor.argv)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                tracing::warn!(
                    program = %descriptor.executable,
                    error = %source,
                    "failed to spawn assistant"
                );
                self.transition(RunState::Failed(FailureKind::Spawn(source.to_string())), sink);
                return Err(RunError::Spawn {
                    program: descriptor.executable.clone(),
                    source,
                });
            }
        };

        let run_id = self.next_run_id;
        self.next_run_id += 1;
        let pid = child.id();
        let budget = self.limits.timeout.unwrap_or_else(|| tool.timeout());
        tracing::info!(run_id, pid, %tool, program = %descriptor.executable, "assistant started");

        if let Some(stdin) = child.stdin.take() {
            deliver_payload(stdin, descriptor.payload.clone(), run_id);
        }

        let (done_tx, done_rx) = mpsc::channel();
        let mut readers = 0;
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, StreamKind::Stdout, run_id, self.event_tx.clone(), done_tx.clone());
            readers += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, StreamKind::Stderr, run_id, self.event_tx.clone(), done_tx);
            readers += 1;
        }

        let (control_tx, control_rx) = mpsc::channel();
        let reaper = Reaper {
            child,
            run_id,
            control_rx,
            done_rx,
            readers,
            kill_grace: self.limits.kill_grace,
            event_tx: self.event_tx.clone(),
        };
        let reaper = thread::spawn(move || reaper.run());

        self.active = Some(ActiveRun {
            run_id,
            pid,
            budget,
            deadline: Instant::now() + budget,
            control_tx,
            reaper,
            result: ResultFilter::new(tool.result_banner()),
        });
        self.transition(RunState::Running, sink);
        Ok(())
    }

    /// Delivers pending output and returns the terminal outcome once, when it happens.
    pub fn poll(&mut self, sink: &mut dyn RunSink) -> Option<RunOutcome> {
        for _ in 0..MAX_EVENTS_PER_POLL {
            let Ok(tagged) = self.event_rx.try_recv() else {
                break;
            };
            let Some(active) = self.active.as_mut() else {
                continue;
            };
            if tagged.run_id != active.run_id {
                continue;
            }
            match tagged.event {
                ChildEvent::Output(StreamKind::Stdout, text) => {
                    sink.on_execution_chunk(&text);
                    active.result.push(&text);
                    sink.on_result(active.result.content());
                }
                ChildEvent::Output(StreamKind::Stderr, text) => {
                    sink.on_execution_chunk(&format!("{STDERR_PREFIX}{text}"));
                }
                ChildEvent::Exited(status) => {
                    return Some(self.finish(classify_exit(status), sink));
                }
                ChildEvent::WaitFailed(message) => {
                    return Some(self.finish(RunOutcome::Failed(FailureKind::Wait(message)), sink));
                }
            }
        }

        let expired = self
            .active
            .as_ref()
            .is_some_and(|active| Instant::now() >= active.deadline);
        if expired {
            return self.expire(sink);
        }
        None
    }

    /// Stops the live run. The caller sees `Failed(Cancelled)` at once; the process gets
    /// SIGTERM now and SIGKILL after the grace period if it is still alive.
    pub fn cancel(&mut self, sink: &mut dyn RunSink) -> Option<RunOutcome> {
        let active = self.active.take()?;
        self.transition(RunState::Cancelling, sink);
        tracing::info!(run_id = active.run_id, pid = active.pid, "assistant cancelled");
        self.retire(active);
        sink.on_execution_chunk("\n\nCommand was cancelled.");
        let outcome = RunOutcome::Failed(FailureKind::Cancelled);
        self.transition(outcome.clone().into_state(), sink);
        Some(outcome)
    }

    /// Starts the descriptor and blocks until it reaches a terminal outcome.
    pub fn run(
        &mut self,
        descriptor: &InvocationDescriptor,
        tool: ToolKind,
        cwd: &Path,
        sink: &mut dyn RunSink,
    ) -> Result<RunOutcome, RunError> {
        match self.start(descriptor, tool, cwd, sink) {
            Ok(()) => {}
            Err(RunError::Spawn { source, .. }) => {
                return Ok(RunOutcome::Failed(FailureKind::Spawn(source.to_string())));
            }
            Err(err) => return Err(err),
        }
        loop {
            if let Some(outcome) = self.poll(sink) {
                return Ok(outcome);
            }
            thread::sleep(BLOCKING_POLL_INTERVAL);
        }
    }

    fn expire(&mut self, sink: &mut dyn RunSink) -> Option<RunOutcome> {
        let active = self.active.take()?;
        tracing::warn!(
            run_id = active.run_id,
            pid = active.pid,
            budget_secs = active.budget.as_secs_f64(),
            "assistant timed out"
        );
        let budget = active.budget;
        self.retire(active);
        sink.on_execution_chunk(&format!(
            "\n\nCommand timed out after {}",
            format_budget(&budget)
        ));
        let outcome = RunOutcome::Failed(FailureKind::Timeout { budget });
        self.transition(outcome.clone().into_state(), sink);
        Some(outcome)
    }

    fn finish(&mut self, outcome: RunOutcome, sink: &mut dyn RunSink) -> RunOutcome {
        if let Some(active) = self.active.take() {
            tracing::info!(run_id = active.run_id, ?outcome, "assistant finished");
        }
        let closing = match &outcome {
            RunOutcome::Completed => "\n\nCommand completed successfully.".to_string(),
            RunOutcome::Failed(FailureKind::Cancelled) => "\n\nCommand was cancelled.".to_string(),
            RunOutcome::Failed(FailureKind::Runtime { code }) => {
                format!("\n\nCommand failed with exit code {code}")
            }
            RunOutcome::Failed(other) => format!("\n\nCommand failed: {other}"),
        };
        sink.on_execution_chunk(&closing);
        self.transition(outcome.clone().into_state(), sink);
        outcome
    }

    /// Cancels any live run and waits, bounded by the kill grace plus output drain, until every
    /// process this supervisor started has been reaped.
    pub fn shutdown(&mut self, sink: &mut dyn RunSink) {
        self.cancel(sink);
        let deadline =
            Instant::now() + self.limits.kill_grace + OUTPUT_DRAIN_LIMIT + SHUTDOWN_SLACK;
        while self.retiring.iter().any(|reaper| !reaper.is_finished()) {
            if Instant::now() >= deadline {
                tracing::warn!("assistant processes still alive at shutdown");
                return;
            }
            thread::sleep(REAPER_POLL_INTERVAL);
        }
        self.retiring.clear();
    }

    fn retire(&mut self, active: ActiveRun) {
        let _ = active.control_tx.send(ProcessControl::Terminate);
        self.retiring.retain(|reaper| !reaper.is_finished());
        self.retiring.push(active.reaper);
    }

    fn transition(&mut self, state: RunState, sink: &mut dyn RunSink) {
        tracing::debug!(from = self.state.label(), to = state.label(), "run state change");
        self.state = state;
        sink.on_state_change(&self.state);
    }
}

pub fn format_budget(budget: &Duration) -> String {
    if budget.subsec_millis() == 0 {
        format!("{} seconds", budget.as_secs())
    } else {
        format!("{} ms", budget.as_millis())
    }
}

fn classify_exit(status: ExitStatus) -> RunOutcome {
    if status.success() {
        return RunOutcome::Completed;
    }
    if let Some(code) = status.code() {
        return RunOutcome::Failed(FailureKind::Runtime { code });
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(libc::SIGTERM) | Some(libc::SIGKILL) => {
                RunOutcome::Failed(FailureKind::Cancelled)
            }
            Some(signal) => RunOutcome::Failed(FailureKind::Signalled { signal }),
            None => RunOutcome::Failed(FailureKind::Runtime { code: -1 }),
        }
    }
    #[cfg(not(unix))]
    {
        RunOutcome::Failed(FailureKind::Runtime { code: -1 })
    }
}

/// Writes the payload from its own thread, then closes stdin by dropping it. An empty payload
/// closes stdin at once.
fn deliver_payload(mut stdin: ChildStdin, payload: String, run_id: u64) {
    if payload.is_empty() {
        return;
    }
    thread::spawn(move || {
        if let Err(err) = stdin.write_all(payload.as_bytes()) {
            tracing::debug!(run_id, error = %err, "assistant closed stdin early");
        }
    });
}

fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    stream: StreamKind,
    run_id: u64,
    tx: Sender<TaggedEvent>,
    done_tx: Sender<()>,
) {
    thread::spawn(move || {
        let mut decoder = Utf8Decoder::default();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => {
                    let text = decoder.decode(&buf[..read]);
                    if !text.is_empty() {
                        let _ = tx.send(TaggedEvent {
                            run_id,
                            event: ChildEvent::Output(stream, text),
                        });
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            let _ = tx.send(TaggedEvent {
                run_id,
                event: ChildEvent::Output(stream, rest),
            });
        }
        let _ = done_tx.send(());
    });
}

/// Owns the child for one run: relays termination requests, escalates to SIGKILL, and
/// reports the exit once the output readers have drained.
struct Reaper {
    child: Child,
    run_id: u64,
    control_rx: Receiver<ProcessControl>,
    done_rx: Receiver<()>,
    readers: usize,
    kill_grace: Duration,
    event_tx: Sender<TaggedEvent>,
}

impl Reaper {
    fn run(mut self) {
        let mut control_open = true;
        let mut terminate_sent_at: Option<Instant> = None;
        let mut killed = false;

        let waited = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(err) => break Err(err),
            }

            let request = if control_open {
                match self.control_rx.recv_timeout(REAPER_POLL_INTERVAL) {
                    Ok(request) => Some(request),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        control_open = false;
                        Some(ProcessControl::Terminate)
                    }
                }
            } else {
                thread::sleep(REAPER_POLL_INTERVAL);
                None
            };

            if matches!(request, Some(ProcessControl::Terminate)) && terminate_sent_at.is_none() {
                self.terminate();
                terminate_sent_at = Some(Instant::now());
            }
            if let Some(sent_at) = terminate_sent_at
                && !killed
                && sent_at.elapsed() >= self.kill_grace
            {
                tracing::warn!(run_id = self.run_id, "assistant ignored SIGTERM, killing");
                let _ = self.child.kill();
                killed = true;
            }
        };

        self.drain_readers();
        let event = match waited {
            Ok(status) => ChildEvent::Exited(status),
            Err(err) => ChildEvent::WaitFailed(err.to_string()),
        };
        let _ = self.event_tx.send(TaggedEvent {
            run_id: self.run_id,
            event,
        });
    }

    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            let pid = self.child.id() as libc::pid_t;
            // SAFETY: `kill` only reads its two integer arguments. The child is reaped solely by
            // this thread's `try_wait`, which has not yet seen an exit, so `pid` still names it.
            if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
                tracing::debug!(
                    run_id = self.run_id,
                    error = %io::Error::last_os_error(),
                    "SIGTERM delivery failed"
                );
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }
    }

    /// Waits briefly for both pipes to close. Descendants that inherited the pipes can keep
    /// them open indefinitely, so this is bounded; anything they print later is stale.
    fn drain_readers(&self) {
        let limit = Instant::now() + OUTPUT_DRAIN_LIMIT;
        for _ in 0..self.readers {
            let remaining = limit.saturating_duration_since(Instant::now());
            if self.done_rx.recv_timeout(remaining).is_err() {
                tracing::debug!(run_id = self.run_id, "output pipes still open after exit");
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/supervisor_tests.rs"]
mod tests;
