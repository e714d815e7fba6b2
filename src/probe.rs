use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::command::InvocationDescriptor;
use crate::supervisor::{
    FailureKind, RunError, RunOutcome, RunTranscript, Supervisor, SupervisorLimits,
};
use crate::tool::ToolKind;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub tool: ToolKind,
    pub program: String,
    pub outcome: RunOutcome,
    /// First non-empty line the tool printed, usually its version.
    pub version: Option<String>,
}

impl ProbeReport {
    pub fn is_working(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn message(&self) -> String {
        let name = cli_name(self.tool);
        if self.is_working() {
            format!("{name} found and working!")
        } else {
            format!("{name} not found or not working. Check the path.")
        }
    }

    /// One-line summary for the panel's notice area.
    pub fn notice(&self) -> String {
        match self.version.as_deref() {
            Some(version) if self.is_working() => format!("{} ({version})", self.message()),
            _ => self.message(),
        }
    }
}

/// A `<program> --version` run on its own supervisor, advanced by [`VersionCheck::poll`].
#[derive(Debug)]
pub struct VersionCheck {
    tool: ToolKind,
    program: String,
    supervisor: Supervisor,
    transcript: RunTranscript,
    spawn_failure: Option<RunOutcome>,
}

impl VersionCheck {
    /// Spawns the check without waiting. A program that cannot start is reported by the next
    /// `poll`.
    pub fn start(tool: ToolKind, program: &str, cwd: &Path) -> Self {
        let descriptor = InvocationDescriptor {
            executable: program.to_string(),
            argv: vec!["--version".to_string()],
            payload: String::new(),
        };
        let mut supervisor = Supervisor::with_limits(SupervisorLimits {
            timeout: Some(PROBE_TIMEOUT),
            ..SupervisorLimits::default()
        });
        let mut transcript = RunTranscript::default();
        let spawn_failure = match supervisor.start(&descriptor, tool, cwd, &mut transcript) {
            Ok(()) => None,
            Err(RunError::Spawn { source, .. }) => {
                Some(RunOutcome::Failed(FailureKind::Spawn(source.to_string())))
            }
            Err(err) => Some(RunOutcome::Failed(FailureKind::Spawn(err.to_string()))),
        };
        Self {
            tool,
            program: program.to_string(),
            supervisor,
            transcript,
            spawn_failure,
        }
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Returns the report once, when the check has finished.
    pub fn poll(&mut self) -> Option<ProbeReport> {
        let outcome = match self.spawn_failure.take() {
            Some(outcome) => outcome,
            None => self.supervisor.poll(&mut self.transcript)?,
        };
        let version = self
            .transcript
            .result
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(ToString::to_string);
        tracing::info!(tool = %self.tool, program = %self.program, ?outcome, "probed assistant");
        Some(ProbeReport {
            tool: self.tool,
            program: self.program.clone(),
            outcome,
            version,
        })
    }

    /// Stops a check that is still running and waits for its process to be reaped.
    pub fn shutdown(&mut self) {
        self.supervisor.shutdown(&mut self.transcript);
    }
}

/// Runs `<program> --version` and blocks until it reports whether it answered successfully.
pub fn probe(tool: ToolKind, program: &str, cwd: &Path) -> ProbeReport {
    let mut check = VersionCheck::start(tool, program, cwd);
    loop {
        if let Some(report) = check.poll() {
            return report;
        }
        thread::sleep(BLOCKING_POLL_INTERVAL);
    }
}

fn cli_name(tool: ToolKind) -> &'static str {
    match tool {
        ToolKind::Claude => "Claude Code CLI",
        ToolKind::Gemini => "Gemini CLI",
    }
}
