use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Clear, Padding, Paragraph};

use crate::app::{App, CommandSuggestion, Pane};
use crate::text_layout::{layout_input, wrap_text};
use crate::theme::Theme;

const MAX_INPUT_TEXT_LINES: u16 = 8;
const TEXT_PADDING: u16 = 1;
const STATUS_HEIGHT: u16 = 3;
const TITLE_BAR_HEIGHT: u16 = 3;
const CONTEXT_LINES: u16 = 2;
const TITLE_DARKEN: u8 = 12;
const ACTIVE_TITLE_BG: Color = Color::Rgb(90, 145, 200);
const ACTIVE_TITLE_FG: Color = Color::Black;
const IDLE_HELP_TEXT: &str = "Enter run | Tab focus | Ctrl+T tool | / for commands";
const RUNNING_HELP_TEXT: &str = "Esc cancel | Tab focus | Up/Down scroll";

struct PanelAreas {
    context: Rect,
    prompt: Rect,
    result: Rect,
    log: Rect,
    status: Rect,
}

fn panel_areas(screen: Rect) -> PanelAreas {
    let [body, status] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(STATUS_HEIGHT)]).areas(screen);
    let [left, right] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(body);
    let [context, prompt] = Layout::vertical([
        Constraint::Length(TITLE_BAR_HEIGHT + CONTEXT_LINES + TEXT_PADDING * 2),
        Constraint::Min(0),
    ])
    .areas(left);
    let [result, log] =
        Layout::vertical([Constraint::Percentage(60), Constraint::Percentage(40)]).areas(right);
    PanelAreas {
        context,
        prompt,
        result,
        log,
        status,
    }
}

fn content_area(pane: Rect) -> Rect {
    let [_title, content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(pane);
    content
}

fn text_width(content: Rect) -> u16 {
    content.width.saturating_sub(TEXT_PADDING * 2).max(1)
}

fn visible_lines(content: Rect) -> usize {
    usize::from(content.height.saturating_sub(TEXT_PADDING * 2))
}

fn max_scroll_for(text: &str, content: Rect) -> usize {
    let (_, lines) = wrap_text(text, text_width(content));
    lines.saturating_sub(visible_lines(content))
}

/// The wrapped lines of `text` that fit in `content` starting `scroll` lines down.
fn visible_window(text: &str, content: Rect, scroll: usize) -> String {
    let (wrapped, _) = wrap_text(text, text_width(content));
    wrapped
        .split('\n')
        .skip(scroll)
        .take(visible_lines(content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn result_max_scroll(screen: Rect, app: &App) -> usize {
    max_scroll_for(app.output().result(), content_area(panel_areas(screen).result))
}

pub fn log_max_scroll(screen: Rect, app: &App) -> usize {
    max_scroll_for(
        app.output().execution_log(),
        content_area(panel_areas(screen).log),
    )
}

pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let areas = panel_areas(frame.area());

    render_context_pane(frame, areas.context, app, theme);
    render_prompt_pane(frame, areas.prompt, app, app.active_pane == Pane::Prompt, theme);

    let result_max = result_max_scroll(frame.area(), app);
    render_text_pane(
        frame,
        areas.result,
        TextPane {
            title: "Result",
            text: app.output().result(),
            scroll: app.result_scroll().min(result_max),
            active: app.active_pane == Pane::Result,
            bg: theme.result_bg,
        },
        theme,
    );
    let log_max = log_max_scroll(frame.area(), app);
    render_text_pane(
        frame,
        areas.log,
        TextPane {
            title: "Execution Log",
            text: app.output().execution_log(),
            scroll: app.log_scroll().unwrap_or(log_max).min(log_max),
            active: app.active_pane == Pane::ExecutionLog,
            bg: theme.log_bg,
        },
        theme,
    );

    render_status(frame, areas.status, app, theme);
}

fn render_title_bar(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    active: bool,
    base: Color,
    theme: &Theme,
) {
    let title_bg = title_bar_bg(base, active);
    let title_fg = if active {
        ACTIVE_TITLE_FG
    } else {
        theme.muted_fg
    };
    frame.render_widget(
        Paragraph::new(title.to_string())
            .style(Style::default().bg(title_bg).fg(title_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(title_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn render_context_pane(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let [title_area, content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    render_title_bar(frame, title_area, "Context", false, theme.context_bg, theme);
    let lines: Vec<Line> = app.context_lines().into_iter().map(Line::from).collect();
    frame.render_widget(
        Paragraph::new(lines)
            .style(Style::default().bg(theme.context_bg).fg(theme.text_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.context_bg))
                    .padding(Padding::new(TEXT_PADDING, TEXT_PADDING, TEXT_PADDING, 0)),
            ),
        content,
    );
}

fn render_prompt_pane(frame: &mut Frame, area: Rect, app: &App, active: bool, theme: &Theme) {
    let [title_area, content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    let title = format!("Prompt [{}]", app.tool().display_name());
    render_title_bar(frame, title_area, &title, active, theme.prompt_bg, theme);

    frame.render_widget(
        Block::default().style(Style::default().bg(theme.prompt_bg)),
        content,
    );
    if content.width < 1 || content.height < 1 {
        return;
    }

    let width = text_width(content);
    let layout = layout_input(app.input(), width);
    let (cursor_line, cursor_col) = app.input_cursor_line_col(width);
    let max_input_height = content.height.max(1);
    let (input_height, input_scroll) =
        input_box_metrics(layout.line_count, cursor_line, max_input_height);
    let [input_area, below_input] =
        Layout::vertical([Constraint::Length(input_height), Constraint::Min(0)]).areas(content);

    frame.render_widget(
        Paragraph::new(layout.rendered)
            .style(Style::default().bg(theme.prompt_bg).fg(theme.text_fg))
            .scroll((input_scroll, 0))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.prompt_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        input_area,
    );
    render_command_index(frame, app.command_suggestions(), below_input, theme);

    if active {
        let inner = input_area.inner(Margin {
            horizontal: TEXT_PADDING,
            vertical: TEXT_PADDING,
        });
        let visible_line = cursor_line.saturating_sub(input_scroll);
        if inner.width > 0 && inner.height > 0 && visible_line < inner.height {
            frame.set_cursor_position((
                inner.x.saturating_add(cursor_col.min(inner.width.saturating_sub(1))),
                inner.y.saturating_add(visible_line),
            ));
        }
    }
}

fn render_command_index(
    frame: &mut Frame,
    suggestions: Vec<CommandSuggestion>,
    area: Rect,
    theme: &Theme,
) {
    if suggestions.is_empty() || area.height < 3 || area.width == 0 {
        return;
    }
    let max_items = usize::from(area.height.saturating_sub(TEXT_PADDING * 2).max(1));
    let lines: Vec<Line> = suggestions
        .iter()
        .take(max_items)
        .enumerate()
        .map(|(idx, item)| {
            let style = if idx == 0 {
                Style::default().fg(theme.active_fg)
            } else {
                Style::default().fg(theme.text_fg)
            };
            Line::from(vec![
                Span::styled(item.command.to_string(), style),
                Span::raw(" "),
                Span::styled(
                    item.description.to_string(),
                    Style::default().fg(theme.muted_fg),
                ),
            ])
        })
        .collect();
    let height = (lines.len() as u16).saturating_add(TEXT_PADDING * 2).min(area.height);
    let overlay = Rect::new(area.x, area.y, area.width, height);
    frame.render_widget(Clear, overlay);
    frame.render_widget(
        Paragraph::new(lines)
            .style(Style::default().bg(theme.context_bg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.context_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        overlay,
    );
}

struct TextPane<'a> {
    title: &'a str,
    text: &'a str,
    scroll: usize,
    active: bool,
    bg: Color,
}

fn render_text_pane(frame: &mut Frame, area: Rect, pane: TextPane<'_>, theme: &Theme) {
    let [title_area, content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    render_title_bar(frame, title_area, pane.title, pane.active, pane.bg, theme);
    frame.render_widget(
        Paragraph::new(visible_window(pane.text, content, pane.scroll))
            .style(Style::default().bg(pane.bg).fg(theme.text_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(pane.bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        content,
    );
}

fn render_status(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let mut spans = vec![Span::styled(
        status_line_text(app),
        Style::default().fg(theme.muted_fg),
    )];
    if let Some(notice) = app.notice() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            notice.to_string(),
            Style::default().fg(theme.error_fg),
        ));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(theme.status_bg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.status_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn status_line_text(app: &App) -> String {
    let tool = app.tool().display_name();
    let state = app.run_state();
    if state.is_active() {
        format!(
            "{tool} | {} {} | {RUNNING_HELP_TEXT}",
            state.label(),
            working_dots(app.ticks)
        )
    } else {
        format!("{tool} | {} | {IDLE_HELP_TEXT}", state.label())
    }
}

fn working_dots(ticks: u64) -> &'static str {
    const FRAMES: [&str; 6] = ["[   ]", "[.  ]", "[.. ]", "[...]", "[ ..]", "[  .]"];
    FRAMES[((ticks / 4) as usize) % FRAMES.len()]
}

fn input_box_metrics(input_text_lines: u16, cursor_line: u16, max_input_height: u16) -> (u16, u16) {
    let capped_text_lines = input_text_lines.clamp(1, MAX_INPUT_TEXT_LINES);
    let desired_height = capped_text_lines.saturating_add(TEXT_PADDING * 2);
    let input_height = desired_height.clamp(1, max_input_height.max(1));
    let visible_text_lines = input_height.saturating_sub(TEXT_PADDING * 2).max(1);
    let max_scroll = input_text_lines.saturating_sub(visible_text_lines);
    let input_scroll = cursor_line
        .saturating_sub(visible_text_lines.saturating_sub(1))
        .min(max_scroll);
    (input_height, input_scroll)
}

fn title_bar_bg(base: Color, active: bool) -> Color {
    if active {
        return ACTIVE_TITLE_BG;
    }
    match base {
        Color::Rgb(r, g, b) => Color::Rgb(
            r.saturating_sub(TITLE_DARKEN),
            g.saturating_sub(TITLE_DARKEN),
            b.saturating_sub(TITLE_DARKEN),
        ),
        _ => base,
    }
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
