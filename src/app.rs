use crate::context::{self, DocumentRef, EditorHost};
use crate::probe::VersionCheck;
use crate::session::{self, AssistSession};
use crate::supervisor::{RunError, RunSink, RunState};
use crate::text_layout::layout_input;
use crate::tool::ToolKind;
use crate::vault::DocumentStore;

const COMMAND_INDEX: [(&str, &str); 9] = [
    ("/tool", "Switch assistant (claude or gemini)"),
    ("/open", "Open a vault document as the current file"),
    ("/close", "Close the current file"),
    ("/select", "Set the selected text"),
    ("/unselect", "Clear the selected text"),
    ("/cancel", "Cancel the running command"),
    ("/clear", "Clear result and execution log"),
    ("/check", "Test the current assistant with --version"),
    ("/quit", "Quit app"),
];
pub const SELECTION_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSuggestion {
    pub command: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Prompt,
    Result,
    ExecutionLog,
}

/// The panel's stand-in for an editor: the document it has open and the text selected in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelHost {
    pub document: Option<DocumentRef>,
    pub selection: String,
}

impl EditorHost for PanelHost {
    fn active_document(&self) -> Option<DocumentRef> {
        self.document.clone()
    }

    fn selection(&self) -> String {
        self.selection.clone()
    }
}

/// Result and execution-log text shown by the panel.
#[derive(Debug, Clone, Default)]
pub struct PanelOutput {
    result: String,
    execution_log: String,
}

impl PanelOutput {
    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn execution_log(&self) -> &str {
        &self.execution_log
    }

    fn clear(&mut self) {
        self.result.clear();
        self.execution_log.clear();
    }
}

impl RunSink for PanelOutput {
    fn on_execution_chunk(&mut self, text: &str) {
        self.execution_log.push_str(text);
    }

    fn on_result(&mut self, content: &str) {
        if self.result != content {
            self.result.clear();
            self.result.push_str(content);
        }
    }
}

#[derive(Debug)]
pub struct App {
    pub running: bool,
    pub ticks: u64,
    pub active_pane: Pane,
    session: AssistSession,
    host: PanelHost,
    output: PanelOutput,
    input: String,
    cursor: usize,
    notice: Option<String>,
    version_check: Option<VersionCheck>,
    result_scroll: usize,
    log_scroll: usize,
    log_follow: bool,
}

impl App {
    pub fn new(session: AssistSession, host: PanelHost) -> Self {
        Self {
            running: true,
            ticks: 0,
            active_pane: Pane::Prompt,
            session,
            host,
            output: PanelOutput::default(),
            input: String::new(),
            cursor: 0,
            notice: None,
            version_check: None,
            result_scroll: 0,
            log_scroll: 0,
            log_follow: true,
        }
    }

    /// Advances the live run by one UI tick.
    pub fn on_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
        if let Some(outcome) = self.session.poll(&mut self.output)
            && let Some(notice) = session::notice_for(&outcome)
        {
            self.notice = Some(notice.to_string());
        }
        if let Some(check) = self.version_check.as_mut()
            && let Some(report) = check.poll()
        {
            self.version_check = None;
            self.notice = Some(report.notice());
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Cancels a live run before the panel goes away so no assistant outlives it.
    pub fn shutdown(&mut self) {
        self.session.shutdown(&mut self.output);
        if let Some(mut check) = self.version_check.take() {
            check.shutdown();
        }
    }

    pub fn next_pane(&mut self) {
        self.active_pane = match self.active_pane {
            Pane::Prompt => Pane::Result,
            Pane::Result => Pane::ExecutionLog,
            Pane::ExecutionLog => Pane::Prompt,
        };
    }

    pub fn prev_pane(&mut self) {
        self.active_pane = match self.active_pane {
            Pane::Prompt => Pane::ExecutionLog,
            Pane::Result => Pane::Prompt,
            Pane::ExecutionLog => Pane::Result,
        };
    }

    pub fn input_char(&mut self, c: char) {
        let byte_idx = char_to_byte_idx(&self.input, self.cursor);
        self.input.insert(byte_idx, c);
        self.cursor = self.cursor.saturating_add(1);
    }

    pub fn backspace_input(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = char_to_byte_idx(&self.input, self.cursor - 1);
        let end = char_to_byte_idx(&self.input, self.cursor);
        self.input.drain(start..end);
        self.cursor -= 1;
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        let char_len = self.input.chars().count();
        self.cursor = (self.cursor + 1).min(char_len);
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_cursor_line_col(&self, width: u16) -> (u16, u16) {
        let layout = layout_input(&self.input, width);
        layout
            .cursor_positions
            .get(self.cursor)
            .copied()
            .unwrap_or((0, 0))
    }

    /// Handles Enter in the prompt pane: slash commands act on the panel, anything else is
    /// sent to the current assistant.
    pub fn submit(&mut self) {
        if is_command(&self.input) {
            let command = self.take_input();
            self.run_command(&command);
            return;
        }
        self.notice = None;
        self.log_follow = true;
        self.result_scroll = 0;
        let prompt = self.input.clone();
        if !self.session.is_running() && !prompt.trim().is_empty() {
            self.output.clear();
        }
        match self.session.submit(&prompt, &self.host, &mut self.output) {
            Ok(()) => {
                self.take_input();
            }
            Err(RunError::EmptyPrompt) => {
                self.notice = Some(RunError::EmptyPrompt.to_string());
            }
            Err(RunError::Busy) => {
                self.notice = Some("A command is already running. Press Esc to cancel.".to_string());
            }
            Err(RunError::Spawn { .. }) => {
                self.notice = Some(session::NOTICE_TOOL_NOT_FOUND.to_string());
            }
        }
    }

    pub fn cancel_run(&mut self) {
        if let Some(outcome) = self.session.cancel(&mut self.output)
            && let Some(notice) = session::notice_for(&outcome)
        {
            self.notice = Some(notice.to_string());
        }
    }

    pub fn toggle_tool(&mut self) {
        let next = self.session.tool().other();
        self.set_tool(next);
    }

    fn set_tool(&mut self, tool: ToolKind) {
        self.session.set_tool(tool);
        self.notice = Some(format!("Using {}", tool.display_name()));
    }

    fn run_command(&mut self, command: &str) {
        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        match name {
            "/tool" if argument.is_empty() => self.toggle_tool(),
            "/tool" => match argument.parse::<ToolKind>() {
                Ok(tool) => self.set_tool(tool),
                Err(err) => self.notice = Some(err),
            },
            "/open" => self.open_document(argument),
            "/close" => {
                self.host.document = None;
                self.notice = None;
            }
            "/select" => {
                self.host.selection = argument.to_string();
                self.notice = None;
            }
            "/unselect" => {
                self.host.selection.clear();
                self.notice = None;
            }
            "/cancel" => {
                if self.session.is_running() {
                    self.cancel_run();
                } else {
                    self.notice = Some("Nothing is running.".to_string());
                }
            }
            "/clear" => {
                if self.session.is_running() {
                    self.notice = Some("Cannot clear while a command is running.".to_string());
                } else {
                    self.output.clear();
                    self.result_scroll = 0;
                    self.log_scroll = 0;
                    self.notice = None;
                }
            }
            "/check" => self.check_tool(),
            "/quit" | "/exit" => self.quit(),
            other => self.notice = Some(format!("Unknown command: {other}")),
        }
    }

    fn open_document(&mut self, path: &str) {
        if path.is_empty() {
            self.notice = Some("Usage: /open <path>".to_string());
            return;
        }
        if self.session.store().lookup_document(path).is_some() {
            self.host.document = Some(DocumentRef::new(path));
            self.notice = None;
        } else {
            self.notice = Some(format!("File not found in vault: {path}"));
        }
    }

    fn check_tool(&mut self) {
        let tool = self.session.tool();
        let program = self.session.settings().program_for(tool);
        if let Some(check) = &self.version_check {
            self.notice = Some(format!("Still checking {}...", check.tool().display_name()));
            return;
        }
        self.version_check = Some(VersionCheck::start(tool, &program, self.session.vault_root()));
        self.notice = Some(format!("Checking {}...", tool.display_name()));
    }

    fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input).trim().to_string()
    }

    pub fn command_suggestions(&self) -> Vec<CommandSuggestion> {
        let Some(query) = command_query(&self.input) else {
            return Vec::new();
        };
        COMMAND_INDEX
            .iter()
            .filter(|(command, _)| command.starts_with(query))
            .map(|(command, description)| CommandSuggestion {
                command,
                description,
            })
            .collect()
    }

    pub fn autocomplete_top_command(&mut self) -> bool {
        if self.input.contains(char::is_whitespace) {
            return false;
        }
        let Some(top) = self.command_suggestions().first().copied() else {
            return false;
        };
        self.input = format!("{} ", top.command);
        self.cursor = self.input.chars().count();
        true
    }

    pub fn output(&self) -> &PanelOutput {
        &self.output
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn tool(&self) -> ToolKind {
        self.session.tool()
    }

    pub fn run_state(&self) -> &RunState {
        self.session.state()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// "Current file" and "Selected text" lines, read fresh from the host each time.
    pub fn context_lines(&self) -> Vec<String> {
        let focus = context::resolve(&self.host);
        let file_line = match focus.document {
            Some(document) => format!("Current file: {}", document.path),
            None => "No file open".to_string(),
        };
        let selection_line = match focus.selected_text {
            Some(selection) => format!("Selected text: \"{}\"", selection_preview(&selection)),
            None => "No text selected".to_string(),
        };
        vec![file_line, selection_line]
    }

    /// `max_scroll` is the focused pane's bottom offset; leaving follow mode starts from there.
    pub fn scroll_up(&mut self, max_scroll: usize) {
        match self.active_pane {
            Pane::Prompt => {}
            Pane::Result => self.result_scroll = self.result_scroll.saturating_sub(1),
            Pane::ExecutionLog => {
                if self.log_follow {
                    self.log_follow = false;
                    self.log_scroll = max_scroll;
                }
                self.log_scroll = self.log_scroll.saturating_sub(1);
            }
        }
    }

    pub fn scroll_down(&mut self, max_scroll: usize) {
        match self.active_pane {
            Pane::Prompt => {}
            Pane::Result => self.result_scroll = (self.result_scroll + 1).min(max_scroll),
            Pane::ExecutionLog => {
                self.log_scroll = (self.log_scroll + 1).min(max_scroll);
                self.log_follow = self.log_scroll >= max_scroll;
            }
        }
    }

    pub fn result_scroll(&self) -> usize {
        self.result_scroll
    }

    /// Scroll offset for the execution log; `None` while it should stick to the bottom.
    pub fn log_scroll(&self) -> Option<usize> {
        (!self.log_follow).then_some(self.log_scroll)
    }
}

/// First characters of the selection, marked with `...` when cut.
pub fn selection_preview(selection: &str) -> String {
    let mut chars = selection.chars();
    let preview: String = chars.by_ref().take(SELECTION_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}...")
    } else {
        preview
    }
}

fn is_command(input: &str) -> bool {
    input.trim_start().starts_with('/')
}

fn char_to_byte_idx(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(byte_idx, _)| byte_idx)
        .unwrap_or(s.len())
}

fn command_query(input: &str) -> Option<&str> {
    let trimmed = input.trim_start();
    if !trimmed.starts_with('/') {
        return None;
    }
    Some(trimmed.split_whitespace().next().unwrap_or(trimmed))
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
