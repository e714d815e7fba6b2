use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;

mod app;
mod command;
mod context;
mod events;
mod expand;
mod logging;
mod output;
mod probe;
mod session;
mod settings;
mod supervisor;
mod text_layout;
mod theme;
mod tool;
mod ui;
mod vault;

use app::{App, Pane, PanelHost};
use context::{DocumentRef, FixedHost};
use events::AppEvent;
use session::AssistSession;
use settings::Settings;
use supervisor::{RunError, RunOutcome, RunSink};
use theme::{THEME_FILE_NAME, Theme};
use tool::ToolKind;

const EXIT_FAILED: u8 = 1;
const EXIT_INVALID: u8 = 2;

/// Terminal panel that sends prompts about a notes vault to Claude Code or Gemini CLI.
#[derive(Debug, Parser)]
#[command(name = "vault-assist", version)]
struct Cli {
    /// Vault directory; tools run here and `@file.md` references resolve against it.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Settings file instead of ~/.vault-assist/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Assistant to use instead of the configured default.
    #[arg(long, global = true, value_enum)]
    tool: Option<ToolKind>,

    /// Vault-relative path of the document treated as currently open.
    #[arg(long, global = true)]
    file: Option<String>,

    /// Text treated as the current selection.
    #[arg(long, global = true)]
    selection: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one prompt without the panel; result on stdout, execution log on stderr.
    Run {
        #[arg(long)]
        prompt: String,
    },
    /// Check that the configured assistants answer `--version`.
    Check,
}

fn main() -> io::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging();

    let settings = load_settings(cli.config.as_deref());
    let vault = match resolve_vault(cli.vault.as_deref()) {
        Ok(vault) => vault,
        Err(err) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(EXIT_INVALID));
        }
    };
    tracing::info!(vault = %vault.display(), "starting");

    match cli.command {
        Some(Commands::Run { ref prompt }) => {
            let mut session = AssistSession::new(vault, settings);
            if let Some(tool) = cli.tool {
                session.set_tool(tool);
            }
            let host = FixedHost {
                document: cli.file.clone().map(DocumentRef::new),
                selection: cli.selection.clone().unwrap_or_default(),
            };
            run_headless(&mut session, &host, prompt)
        }
        Some(Commands::Check) => Ok(run_check(&settings, cli.tool, &vault)),
        None => {
            let mut session = AssistSession::new(vault, settings);
            if let Some(tool) = cli.tool {
                session.set_tool(tool);
            }
            let host = PanelHost {
                document: cli.file.map(DocumentRef::new),
                selection: cli.selection.unwrap_or_default(),
            };
            run_panel(App::new(session, host))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging() {
    let path = match settings::app_dir() {
        Ok(dir) => dir.join(logging::LOG_FILE_NAME),
        Err(err) => {
            eprintln!("Logging disabled: {err}");
            return;
        }
    };
    if let Err(err) = logging::init_file_logging(&path) {
        eprintln!("Logging disabled: failed to open '{}': {err}", path.display());
    }
}

fn load_settings(path: Option<&Path>) -> Settings {
    match Settings::load_or_create(path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}. Using default settings.");
            Settings::default()
        }
    }
}

fn resolve_vault(requested: Option<&Path>) -> io::Result<PathBuf> {
    let vault = match requested {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?,
    };
    if !vault.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Vault directory not found: {}", vault.display()),
        ));
    }
    Ok(vault)
}

/// Streams the execution log to stderr as it arrives and keeps the latest result view.
struct HeadlessSink<W: Write> {
    log: W,
    result: String,
}

impl<W: Write> RunSink for HeadlessSink<W> {
    fn on_execution_chunk(&mut self, text: &str) {
        let _ = self.log.write_all(text.as_bytes());
        let _ = self.log.flush();
    }

    fn on_result(&mut self, content: &str) {
        self.result.clear();
        self.result.push_str(content);
    }
}

fn run_headless(
    session: &mut AssistSession,
    host: &FixedHost,
    prompt: &str,
) -> io::Result<ExitCode> {
    let mut sink = HeadlessSink {
        log: io::stderr(),
        result: String::new(),
    };
    let outcome = match session.run(prompt, host, &mut sink) {
        Ok(outcome) => outcome,
        Err(err @ (RunError::EmptyPrompt | RunError::Busy)) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(EXIT_INVALID));
        }
        Err(err @ RunError::Spawn { .. }) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(EXIT_FAILED));
        }
    };
    eprintln!();

    let mut stdout = io::stdout().lock();
    stdout.write_all(sink.result.as_bytes())?;
    stdout.flush()?;

    if let Some(notice) = session::notice_for(&outcome) {
        eprintln!("{notice}");
    }
    Ok(match outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Failed(_) => ExitCode::from(EXIT_FAILED),
    })
}

fn run_check(settings: &Settings, only: Option<ToolKind>, vault: &Path) -> ExitCode {
    let tools = match only {
        Some(tool) => vec![tool],
        None => ToolKind::ALL.to_vec(),
    };
    let mut all_working = true;
    for tool in tools {
        let report = probe::probe(tool, &settings.program_for(tool), vault);
        match report.version.as_deref() {
            Some(version) if report.is_working() => {
                println!("{} ({}: {version})", report.message(), report.program);
            }
            _ => println!("{} ({})", report.message(), report.program),
        }
        all_working &= report.is_working();
    }
    if all_working {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}

fn run_panel(app: App) -> io::Result<()> {
    let theme = Theme::load_or_default(THEME_FILE_NAME);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        SetCursorStyle::SteadyBar
    )?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    let result = run_app(&mut terminal, app, &theme);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        SetCursorStyle::DefaultUserShape,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App, theme: &Theme) -> io::Result<()> {
    let result = event_loop(terminal, &mut app, theme);
    app.shutdown();
    result
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    theme: &Theme,
) -> io::Result<()> {
    while app.running {
        terminal.draw(|frame| ui::render(frame, app, theme))?;

        match events::next_event()? {
            AppEvent::Tick => {}
            AppEvent::Quit => app.quit(),
            AppEvent::Cancel => app.cancel_run(),
            AppEvent::ToggleTool => app.toggle_tool(),
            AppEvent::NextPane => {
                let completed =
                    app.active_pane == Pane::Prompt && app.autocomplete_top_command();
                if !completed {
                    app.next_pane();
                }
            }
            AppEvent::PrevPane => app.prev_pane(),
            AppEvent::ScrollUp => {
                let max_scroll = focused_max_scroll(terminal, app)?;
                app.scroll_up(max_scroll);
            }
            AppEvent::ScrollDown => {
                let max_scroll = focused_max_scroll(terminal, app)?;
                app.scroll_down(max_scroll);
            }
            AppEvent::CursorLeft => app.move_cursor_left(),
            AppEvent::CursorRight => app.move_cursor_right(),
            AppEvent::InputChar(c) => {
                app.active_pane = Pane::Prompt;
                app.input_char(c);
            }
            AppEvent::Backspace => app.backspace_input(),
            AppEvent::Submit => app.submit(),
        }

        app.on_tick();
    }
    Ok(())
}

fn focused_max_scroll<B: Backend>(terminal: &Terminal<B>, app: &App) -> io::Result<usize> {
    let size = terminal.size()?;
    let screen = Rect::new(0, 0, size.width, size.height);
    Ok(match app.active_pane {
        Pane::Prompt => 0,
        Pane::Result => ui::result_max_scroll(screen, app),
        Pane::ExecutionLog => ui::log_max_scroll(screen, app),
    })
}
