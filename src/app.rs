use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::agent::AgentRole;
use crate::agent_session::{AgentResponse, SessionId, SessionInfo, SessionState};
use crate::events::AppEvent;
use crate::lock::{ScreenLock, UnlockOutcome};
use crate::menu::{Focus, MenuState, Screen};
use crate::solitaire::{Game, Pile};
use crate::version::VersionInfo;

const STATUS_TTL: Duration = Duration::from_secs(4);
const QUIT_CHORD_WINDOW: Duration = Duration::from_secs(2);
const MAX_TRANSCRIPT_LINES: usize = 2000;
const PAGE_LINES: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateSession { role: AgentRole, name: String },
    CloseSession(SessionId),
    SendPrompt { session: SessionId, prompt: String },
    Broadcast(String),
    ForgeStart,
    ForgeStop,
    ForgeRestart,
    SaveSolitaire,
    LoadLogs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentInput {
    New { role: AgentRole, name: String },
    Close,
    Broadcast(String),
    Clear,
    Prompt(String),
    Invalid(String),
}

pub fn parse_agent_input(line: &str) -> AgentInput {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return AgentInput::Prompt(line.to_string());
    };
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));
    match name {
        "new" => {
            let (role_raw, session_name) = rest
                .split_once(char::is_whitespace)
                .map(|(role, name)| (role, name.trim()))
                .unwrap_or((rest, ""));
            if role_raw.is_empty() {
                return AgentInput::Invalid(format!("Usage: /new <role> [name]. {}", role_list()));
            }
            match AgentRole::parse(role_raw) {
                Some(role) => AgentInput::New {
                    role,
                    name: session_name.to_string(),
                },
                None => AgentInput::Invalid(format!("Unknown role '{role_raw}'. {}", role_list())),
            }
        }
        "close" => AgentInput::Close,
        "clear" => AgentInput::Clear,
        "broadcast" if rest.is_empty() => {
            AgentInput::Invalid("Usage: /broadcast <text>".to_string())
        }
        "broadcast" => AgentInput::Broadcast(rest.to_string()),
        other => AgentInput::Invalid(format!(
            "Unknown command '/{other}'. Try /new, /close, /broadcast or /clear."
        )),
    }
}

fn role_list() -> String {
    let roles: Vec<&str> = AgentRole::ALL.iter().map(|role| role.label()).collect();
    format!("Roles: {}", roles.join(", "))
}

#[derive(Debug, Clone, Default)]
pub struct InputLine {
    text: String,
    cursor: usize,
}

impl InputLine {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn insert(&mut self, c: char) {
        let byte_idx = char_to_byte_idx(&self.text, self.cursor);
        self.text.insert(byte_idx, c);
        self.cursor = self.cursor.saturating_add(1);
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = char_to_byte_idx(&self.text, self.cursor - 1);
        let end = char_to_byte_idx(&self.text, self.cursor);
        self.text.drain(start..end);
        self.cursor -= 1;
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

fn char_to_byte_idx(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(byte_idx, _)| byte_idx)
        .unwrap_or(s.len())
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct App {
    pub running: bool,
    pub ticks: u64,
    pub menu: MenuState,
    pub lock: ScreenLock,
    pub game: Game,
    pub version: VersionInfo,
    user: String,
    pile_cursor: usize,
    picked: Option<Pile>,
    input: InputLine,
    unlock_input: InputLine,
    sessions: Vec<SessionInfo>,
    selected_session: usize,
    transcripts: HashMap<SessionId, Vec<String>>,
    log_lines: Vec<String>,
    content_scroll: u16,
    status: Option<StatusMessage>,
    quit_armed_at: Option<Instant>,
}

impl App {
    pub fn new(user: String, game: Game, version: VersionInfo, lock: ScreenLock) -> Self {
        Self {
            running: true,
            ticks: 0,
            menu: MenuState::default(),
            lock,
            game,
            version,
            user,
            pile_cursor: Pile::Stock.cursor(),
            picked: None,
            input: InputLine::default(),
            unlock_input: InputLine::default(),
            sessions: Vec::new(),
            selected_session: 0,
            transcripts: HashMap::new(),
            log_lines: Vec::new(),
            content_scroll: 0,
            status: None,
            quit_armed_at: None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn on_tick(&mut self, now: Instant) {
        self.ticks = self.ticks.saturating_add(1);
        if self
            .status
            .as_ref()
            .is_some_and(|status| now >= status.expires_at)
        {
            self.status = None;
        }
        if self
            .quit_armed_at
            .is_some_and(|armed| now.saturating_duration_since(armed) > QUIT_CHORD_WINDOW)
        {
            self.quit_armed_at = None;
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn set_status(&mut self, text: impl Into<String>, now: Instant) {
        self.status = Some(StatusMessage {
            text: text.into(),
            expires_at: now + STATUS_TTL,
        });
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status.as_ref().map(|status| status.text.as_str())
    }

    pub fn is_quit_armed(&self) -> bool {
        self.quit_armed_at.is_some()
    }

    pub fn help_line(&self) -> &'static str {
        if self.lock.is_locked() {
            return if self.lock.is_prompt_open() {
                "Enter unlock · Esc cancel"
            } else {
                "u unlock · ←/→ pile · Enter pick/place · d draw · f foundation · n new game"
            };
        }
        if self.menu.focus() == Focus::Sidebar {
            return "↑/↓ select · Enter open · Tab focus · Esc home · q q quit · Ctrl-L lock";
        }
        match self.menu.screen() {
            Screen::Agents => {
                "/new <role> [name] · /close · /broadcast <text> · /clear · ↑/↓ session · PgUp/PgDn scroll"
            }
            Screen::Forge => "s start · x stop · r restart · PgUp/PgDn scroll · Esc back",
            Screen::Solitaire => {
                "←/→ pile · Enter pick/place · d draw · f foundation · n new game · Esc back"
            }
            Screen::Lock => "Enter lock again · Esc back",
            Screen::Logs => "r reload · PgUp/PgDn scroll · Esc back",
            Screen::Version | Screen::Home => "PgUp/PgDn scroll · Esc back",
        }
    }

    pub fn check_idle(&mut self, now: Instant) {
        if self.lock.check_idle(now) {
            self.on_locked();
        }
    }

    pub fn lock_screen(&mut self, now: Instant) {
        if self.lock.lock() {
            self.on_locked();
        } else if !self.lock.is_enabled() {
            self.set_status("Screen lock is disabled in config", now);
        }
    }

    fn on_locked(&mut self) {
        self.picked = None;
        self.unlock_input.clear();
    }

    pub fn handle_event(&mut self, event: AppEvent, now: Instant) -> Vec<Action> {
        if event == AppEvent::Tick {
            return Vec::new();
        }
        self.lock.record_activity(now);
        if event != AppEvent::InputChar('q')
            || self.menu.focus() != Focus::Sidebar
            || self.lock.is_locked()
        {
            self.quit_armed_at = None;
        }
        if event == AppEvent::Quit {
            self.quit();
            return Vec::new();
        }
        if self.lock.is_locked() {
            return self.handle_locked(event, now);
        }
        if event == AppEvent::Lock {
            self.lock_screen(now);
            return Vec::new();
        }
        match self.menu.focus() {
            Focus::Sidebar => self.handle_sidebar(event, now),
            Focus::Content => self.handle_content(event, now),
        }
    }

    fn handle_locked(&mut self, event: AppEvent, now: Instant) -> Vec<Action> {
        if self.lock.is_prompt_open() {
            match event {
                AppEvent::InputChar(c) => self.unlock_input.insert(c),
                AppEvent::Backspace => self.unlock_input.backspace(),
                AppEvent::Back => {
                    self.unlock_input.clear();
                    self.lock.cancel_prompt();
                }
                AppEvent::Submit => {
                    let attempt = self.unlock_input.take();
                    match self.lock.try_unlock(&attempt, now) {
                        UnlockOutcome::Unlocked => self.set_status("Unlocked", now),
                        UnlockOutcome::Rejected => self.set_status(
                            format!("Wrong passphrase ({} failed)", self.lock.failed_attempts()),
                            now,
                        ),
                    }
                }
                _ => {}
            }
            return Vec::new();
        }
        if event == AppEvent::InputChar('u') {
            self.lock.open_prompt();
            return Vec::new();
        }
        self.handle_solitaire(event, now)
    }

    fn handle_sidebar(&mut self, event: AppEvent, now: Instant) -> Vec<Action> {
        match event {
            AppEvent::Up => self.menu.move_up(),
            AppEvent::Down => self.menu.move_down(),
            AppEvent::Submit | AppEvent::Right => return self.open_selected(now),
            AppEvent::Back => {
                let leaving_solitaire = self.menu.screen() == Screen::Solitaire;
                self.menu.back();
                if leaving_solitaire && self.menu.screen() == Screen::Home {
                    return vec![Action::SaveSolitaire];
                }
            }
            AppEvent::NextFocus | AppEvent::PrevFocus => self.menu.toggle_focus(),
            AppEvent::InputChar('q') => {
                if self.quit_armed_at.take().is_some() {
                    self.quit();
                } else {
                    self.quit_armed_at = Some(now);
                    self.set_status("Press q again to quit", now);
                }
            }
            _ => {}
        }
        Vec::new()
    }

    /// Jumps straight to a menu entry as if it had been selected and entered.
    pub fn open_screen(&mut self, screen: Screen, now: Instant) -> Vec<Action> {
        if self.menu.select_by_id(screen) {
            self.open_selected(now)
        } else {
            Vec::new()
        }
    }

    fn open_selected(&mut self, now: Instant) -> Vec<Action> {
        let previous = self.menu.screen();
        let screen = self.menu.enter();
        let mut actions = Vec::new();
        if previous != screen {
            self.content_scroll = 0;
            if previous == Screen::Solitaire {
                actions.push(Action::SaveSolitaire);
            }
        }
        match screen {
            Screen::Lock => self.lock_screen(now),
            Screen::Logs => actions.push(Action::LoadLogs),
            _ => {}
        }
        actions
    }

    fn handle_content(&mut self, event: AppEvent, now: Instant) -> Vec<Action> {
        match event {
            AppEvent::Back => {
                self.menu.back();
                return Vec::new();
            }
            AppEvent::NextFocus | AppEvent::PrevFocus => {
                self.menu.toggle_focus();
                return Vec::new();
            }
            AppEvent::PageUp => {
                self.content_scroll = self.content_scroll.saturating_add(PAGE_LINES);
                return Vec::new();
            }
            AppEvent::PageDown => {
                self.content_scroll = self.content_scroll.saturating_sub(PAGE_LINES);
                return Vec::new();
            }
            _ => {}
        }
        match self.menu.screen() {
            Screen::Agents => self.handle_agents(event, now),
            Screen::Forge => match event {
                AppEvent::InputChar('s') => vec![Action::ForgeStart],
                AppEvent::InputChar('x') => vec![Action::ForgeStop],
                AppEvent::InputChar('r') => vec![Action::ForgeRestart],
                _ => Vec::new(),
            },
            Screen::Solitaire => self.handle_solitaire(event, now),
            Screen::Lock => {
                if event == AppEvent::Submit {
                    self.lock_screen(now);
                }
                Vec::new()
            }
            Screen::Logs if event == AppEvent::InputChar('r') => vec![Action::LoadLogs],
            Screen::Logs | Screen::Version => {
                match event {
                    AppEvent::Up => self.content_scroll = self.content_scroll.saturating_add(1),
                    AppEvent::Down => self.content_scroll = self.content_scroll.saturating_sub(1),
                    _ => {}
                }
                Vec::new()
            }
            Screen::Home => Vec::new(),
        }
    }

    fn handle_agents(&mut self, event: AppEvent, now: Instant) -> Vec<Action> {
        match event {
            AppEvent::InputChar(c) => self.input.insert(c),
            AppEvent::Backspace => self.input.backspace(),
            AppEvent::Left => self.input.left(),
            AppEvent::Right => self.input.right(),
            AppEvent::Up => self.select_session(self.selected_session.saturating_sub(1)),
            AppEvent::Down => self.select_session(self.selected_session + 1),
            AppEvent::Submit => return self.submit_agent_input(now),
            _ => {}
        }
        Vec::new()
    }

    fn submit_agent_input(&mut self, now: Instant) -> Vec<Action> {
        let line = self.input.text().trim().to_string();
        if line.is_empty() {
            return Vec::new();
        }
        let parsed = parse_agent_input(&line);
        if let AgentInput::Invalid(message) = parsed {
            self.set_status(message, now);
            return Vec::new();
        }
        self.input.clear();
        match parsed {
            AgentInput::New { role, name } => vec![Action::CreateSession { role, name }],
            AgentInput::Broadcast(prompt) => vec![Action::Broadcast(prompt)],
            AgentInput::Close => match self.selected_session_id() {
                Some(id) => vec![Action::CloseSession(id)],
                None => {
                    self.set_status("No session selected", now);
                    Vec::new()
                }
            },
            AgentInput::Clear => {
                if let Some(id) = self.selected_session_id() {
                    self.transcripts.remove(&id);
                    self.content_scroll = 0;
                }
                Vec::new()
            }
            AgentInput::Prompt(prompt) => match self.selected_open_session() {
                Some(session) => vec![Action::SendPrompt { session, prompt }],
                None => {
                    self.set_status("No open session; create one with /new <role> [name]", now);
                    Vec::new()
                }
            },
            AgentInput::Invalid(_) => Vec::new(),
        }
    }

    fn handle_solitaire(&mut self, event: AppEvent, now: Instant) -> Vec<Action> {
        let slots = Pile::CURSOR_SLOTS;
        match event {
            AppEvent::Left => self.pile_cursor = (self.pile_cursor + slots - 1) % slots,
            AppEvent::Right => self.pile_cursor = (self.pile_cursor + 1) % slots,
            AppEvent::Submit | AppEvent::InputChar(' ') => self.solitaire_select(now),
            AppEvent::InputChar('d') => {
                self.picked = None;
                if let Err(err) = self.game.draw() {
                    self.set_status(err.to_string(), now);
                }
            }
            AppEvent::InputChar('f') => {
                let from = self
                    .picked
                    .take()
                    .unwrap_or_else(|| Pile::from_cursor(self.pile_cursor));
                match self.game.auto_to_foundation(from) {
                    Ok(()) => self.announce_win(now),
                    Err(err) => self.set_status(err.to_string(), now),
                }
            }
            AppEvent::InputChar('n') => {
                self.game = Game::new(rand::random());
                self.picked = None;
                self.pile_cursor = Pile::Stock.cursor();
                self.set_status(format!("New game (seed {})", self.game.seed), now);
                return vec![Action::SaveSolitaire];
            }
            _ => {}
        }
        Vec::new()
    }

    fn solitaire_select(&mut self, now: Instant) {
        let target = Pile::from_cursor(self.pile_cursor);
        match self.picked.take() {
            None if target == Pile::Stock => {
                if let Err(err) = self.game.draw() {
                    self.set_status(err.to_string(), now);
                }
            }
            None => {
                if self.game.top(target).is_some_and(|card| card.face_up) {
                    self.picked = Some(target);
                }
            }
            Some(from) if from == target => {}
            Some(from) => match self.game.move_cards(from, target) {
                Ok(()) => self.announce_win(now),
                Err(err) => self.set_status(err.to_string(), now),
            },
        }
    }

    fn announce_win(&mut self, now: Instant) {
        if self.game.is_won() {
            self.set_status(
                format!("Solved in {} moves, score {}", self.game.moves, self.game.score),
                now,
            );
        }
    }

    pub fn pile_cursor(&self) -> Pile {
        Pile::from_cursor(self.pile_cursor)
    }

    pub fn picked_pile(&self) -> Option<Pile> {
        self.picked
    }

    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn masked_unlock_input(&self) -> String {
        "•".repeat(self.unlock_input.text().chars().count())
    }

    pub fn content_scroll(&self) -> u16 {
        self.content_scroll
    }

    pub fn set_sessions(&mut self, sessions: Vec<SessionInfo>) {
        self.sessions = sessions;
        self.selected_session = self
            .selected_session
            .min(self.sessions.len().saturating_sub(1));
    }

    pub fn sessions(&self) -> &[SessionInfo] {
        &self.sessions
    }

    pub fn selected_session_index(&self) -> usize {
        self.selected_session
    }

    pub fn selected_session_id(&self) -> Option<SessionId> {
        self.sessions
            .get(self.selected_session)
            .map(|session| session.id.clone())
    }

    fn selected_open_session(&self) -> Option<SessionId> {
        self.sessions
            .get(self.selected_session)
            .filter(|session| session.state != SessionState::Closed)
            .map(|session| session.id.clone())
    }

    pub fn select_session(&mut self, index: usize) {
        let index = index.min(self.sessions.len().saturating_sub(1));
        if index != self.selected_session {
            self.content_scroll = 0;
        }
        self.selected_session = index;
    }

    pub fn select_session_by_id(&mut self, id: &str) {
        if let Some(index) = self.sessions.iter().position(|session| session.id == id) {
            self.select_session(index);
        }
    }

    pub fn transcript(&self, session_id: &str) -> &[String] {
        self.transcripts
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn record_prompt(&mut self, session_id: &str, prompt: &str) {
        self.push_transcript(session_id, format!("› {prompt}"));
    }

    pub fn push_transcript(&mut self, session_id: &str, line: impl Into<String>) {
        let lines = self.transcripts.entry(session_id.to_string()).or_default();
        lines.push(line.into());
        if lines.len() > MAX_TRANSCRIPT_LINES {
            let overflow = lines.len() - MAX_TRANSCRIPT_LINES;
            lines.drain(0..overflow);
        }
    }

    pub fn record_response(&mut self, response: &AgentResponse) {
        let seconds = response.duration_ms as f64 / 1000.0;
        let header = if response.success {
            format!("✓ #{} in {seconds:.1}s", response.command_id)
        } else {
            format!("✗ #{} failed after {seconds:.1}s", response.command_id)
        };
        self.push_transcript(&response.session_id, header);
        for line in response.output.lines() {
            self.push_transcript(&response.session_id, line.to_string());
        }
        if let Some(error) = &response.error {
            self.push_transcript(&response.session_id, format!("error: {error}"));
        }
        self.push_transcript(&response.session_id, String::new());
    }

    pub fn set_log_lines(&mut self, lines: Vec<String>) {
        self.log_lines = lines;
        self.content_scroll = 0;
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log_lines
    }
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
