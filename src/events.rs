use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    Lock,
    NextFocus,
    PrevFocus,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Submit,
    Back,
    Backspace,
    InputChar(char),
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) {
        return match key_event.code {
            KeyCode::Char('c') => AppEvent::Quit,
            KeyCode::Char('l') => AppEvent::Lock,
            _ => AppEvent::Tick,
        };
    }

    match key_event.code {
        KeyCode::Tab => AppEvent::NextFocus,
        KeyCode::BackTab => AppEvent::PrevFocus,
        KeyCode::Up => AppEvent::Up,
        KeyCode::Down => AppEvent::Down,
        KeyCode::Left => AppEvent::Left,
        KeyCode::Right => AppEvent::Right,
        KeyCode::PageUp => AppEvent::PageUp,
        KeyCode::PageDown => AppEvent::PageDown,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Esc => AppEvent::Back,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Char(c) => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

pub fn next_event(tick: Duration) -> io::Result<AppEvent> {
    if event::poll(tick)?
        && let Event::Key(key_event) = event::read()?
    {
        return Ok(map_key_event(key_event));
    }
    Ok(AppEvent::Tick)
}
