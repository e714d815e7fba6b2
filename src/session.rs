use std::path::{Path, PathBuf};
use std::thread;

use crate::command;
use crate::context::{self, EditorHost};
use crate::expand;
use crate::settings::Settings;
use crate::supervisor::{
    BLOCKING_POLL_INTERVAL, FailureKind, RunError, RunOutcome, RunSink, RunState, Supervisor,
};
use crate::tool::ToolKind;
use crate::vault::VaultStore;

pub const NOTICE_TOOL_NOT_FOUND: &str = "CLI tool not found. Check the path in settings.";
pub const NOTICE_CANCELLED: &str = "Command was cancelled.";
pub const NOTICE_FAILED: &str = "Command execution failed. Check output for details.";

/// One panel's worth of assistant state: the vault it works in, the selected tool and the
/// single supervised run.
#[derive(Debug)]
pub struct AssistSession {
    store: VaultStore,
    settings: Settings,
    tool: ToolKind,
    supervisor: Supervisor,
}

impl AssistSession {
    pub fn new(vault_root: impl Into<PathBuf>, settings: Settings) -> Self {
        Self::with_supervisor(vault_root, settings, Supervisor::new())
    }

    pub fn with_supervisor(
        vault_root: impl Into<PathBuf>,
        settings: Settings,
        supervisor: Supervisor,
    ) -> Self {
        let tool = settings.tools.default_tool;
        Self {
            store: VaultStore::new(vault_root),
            settings,
            tool,
            supervisor,
        }
    }

    pub fn vault_root(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Switches the tool used by the next submission. A live run keeps its own tool.
    pub fn set_tool(&mut self, tool: ToolKind) {
        if self.tool != tool {
            tracing::info!(from = %self.tool, to = %tool, "tool switched");
        }
        self.tool = tool;
    }

    pub fn state(&self) -> &RunState {
        self.supervisor.state()
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Expands, annotates and launches `raw_prompt`. Progress lines go to the sink's execution
    /// log; the run itself advances through [`AssistSession::poll`].
    pub fn submit(
        &mut self,
        raw_prompt: &str,
        host: &dyn EditorHost,
        sink: &mut dyn RunSink,
    ) -> Result<(), RunError> {
        if self.supervisor.is_running() {
            return Err(RunError::Busy);
        }
        let prompt = raw_prompt.trim();
        if prompt.is_empty() {
            return Err(RunError::EmptyPrompt);
        }

        sink.on_result("");
        sink.on_execution_chunk("Processing prompt...\n");
        let expanded = expand::expand(prompt, &self.store);
        let context = context::resolve(host);
        let program = self.settings.program_for(self.tool);
        let descriptor = command::build(self.tool, &program, &expanded, &context);

        sink.on_execution_chunk(&format!(
            "Working directory: {}\n",
            self.store.root().display()
        ));
        sink.on_execution_chunk(&format!("Command: {}\n\n", descriptor.display_command()));
        sink.on_execution_chunk("Executing...\n");

        let result = self
            .supervisor
            .start(&descriptor, self.tool, self.store.root(), sink);
        match &result {
            Ok(()) => tracing::debug!(
                tool = %self.tool,
                pid = ?self.supervisor.active_pid(),
                with_context = !context.is_empty(),
                "prompt submitted"
            ),
            Err(err) => sink.on_execution_chunk(&format!("\nError: {err}")),
        }
        result
    }

    pub fn poll(&mut self, sink: &mut dyn RunSink) -> Option<RunOutcome> {
        self.supervisor.poll(sink)
    }

    pub fn cancel(&mut self, sink: &mut dyn RunSink) -> Option<RunOutcome> {
        self.supervisor.cancel(sink)
    }

    /// Stops any live run and waits for its process to be reaped.
    pub fn shutdown(&mut self, sink: &mut dyn RunSink) {
        self.supervisor.shutdown(sink);
    }

    /// Submits and blocks until the run finishes. Validation errors are returned as errors,
    /// while a tool that cannot be started is a failed outcome.
    pub fn run(
        &mut self,
        raw_prompt: &str,
        host: &dyn EditorHost,
        sink: &mut dyn RunSink,
    ) -> Result<RunOutcome, RunError> {
        match self.submit(raw_prompt, host, sink) {
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
}

/// The user-facing notice for a finished run, if it deserves one.
pub fn notice_for(outcome: &RunOutcome) -> Option<&'static str> {
    match outcome {
        RunOutcome::Completed => None,
        RunOutcome::Failed(FailureKind::Spawn(_)) => Some(NOTICE_TOOL_NOT_FOUND),
        RunOutcome::Failed(FailureKind::Cancelled) => Some(NOTICE_CANCELLED),
        RunOutcome::Failed(_) => Some(NOTICE_FAILED),
    }
}

#[cfg(test)]
#[path = "../tests/unit/session_tests.rs"]
mod tests;
