use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};

pub const TICK: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    Cancel,
    ToggleTool,
    NextPane,
    PrevPane,
    ScrollUp,
    ScrollDown,
    CursorLeft,
    CursorRight,
    InputChar(char),
    Backspace,
    Submit,
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) {
        return match key_event.code {
            KeyCode::Char('c') => AppEvent::Quit,
            KeyCode::Char('t') => AppEvent::ToggleTool,
            _ => AppEvent::Tick,
        };
    }

    match key_event.code {
        KeyCode::Esc => AppEvent::Cancel,
        KeyCode::Tab => AppEvent::NextPane,
        KeyCode::BackTab => AppEvent::PrevPane,
        KeyCode::Up | KeyCode::PageUp => AppEvent::ScrollUp,
        KeyCode::Down | KeyCode::PageDown => AppEvent::ScrollDown,
        KeyCode::Left => AppEvent::CursorLeft,
        KeyCode::Right => AppEvent::CursorRight,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Char(c) => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

fn map_mouse_event_kind(kind: MouseEventKind) -> AppEvent {
    match kind {
        MouseEventKind::ScrollUp => AppEvent::ScrollUp,
        MouseEventKind::ScrollDown => AppEvent::ScrollDown,
        _ => AppEvent::Tick,
    }
}

/// Waits up to one tick for input. The run loop polls the assistant on every return.
pub fn next_event() -> io::Result<AppEvent> {
    if event::poll(TICK)? {
        match event::read()? {
            Event::Key(key_event) => return Ok(map_key_event(key_event)),
            Event::Mouse(mouse_event) => return Ok(map_mouse_event_kind(mouse_event.kind)),
            _ => {}
        }
    }
    Ok(AppEvent::Tick)
}
