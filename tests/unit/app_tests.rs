use super::*;
use crate::config::LockConfig;
use crate::solitaire::{Card, Suit};
use chrono::Utc;

fn lock_config(enabled: bool) -> LockConfig {
    LockConfig {
        enabled,
        idle_timeout_secs: 30,
        passphrase_hash: String::new(),
    }
}

fn app() -> App {
    App::new(
        "ayse".to_string(),
        Game::new(11),
        VersionInfo::default(),
        ScreenLock::from_config(&lock_config(true)),
    )
}

fn session(id: &str, state: SessionState) -> SessionInfo {
    SessionInfo {
        id: id.to_string(),
        name: format!("general-{id}"),
        role: AgentRole::General,
        state,
        processed: 0,
        failures: 0,
        created_at: Utc::now(),
    }
}

fn type_text(app: &mut App, text: &str, now: Instant) -> Vec<Action> {
    let mut actions = Vec::new();
    for c in text.chars() {
        actions.extend(app.handle_event(AppEvent::InputChar(c), now));
    }
    actions
}

fn open(app: &mut App, screen: Screen, now: Instant) -> Vec<Action> {
    app.menu.select_by_id(screen);
    app.handle_event(AppEvent::Submit, now)
}

#[test]
fn parses_agent_commands() {
    assert_eq!(
        parse_agent_input("/new review api-check"),
        AgentInput::New {
            role: AgentRole::CodeReview,
            name: "api-check".to_string()
        }
    );
    assert_eq!(
        parse_agent_input("/new docs"),
        AgentInput::New {
            role: AgentRole::Docs,
            name: String::new()
        }
    );
    assert_eq!(parse_agent_input(" /close "), AgentInput::Close);
    assert_eq!(parse_agent_input("/clear"), AgentInput::Clear);
    assert_eq!(
        parse_agent_input("/broadcast run the tests"),
        AgentInput::Broadcast("run the tests".to_string())
    );
    assert_eq!(
        parse_agent_input("explain main.rs"),
        AgentInput::Prompt("explain main.rs".to_string())
    );
}

#[test]
fn rejects_malformed_agent_commands() {
    assert!(matches!(parse_agent_input("/new"), AgentInput::Invalid(_)));
    assert!(matches!(parse_agent_input("/new wizard"), AgentInput::Invalid(msg) if msg.contains("wizard")));
    assert!(matches!(parse_agent_input("/broadcast"), AgentInput::Invalid(_)));
    assert!(matches!(parse_agent_input("/deploy"), AgentInput::Invalid(_)));
}

#[test]
fn input_line_edits_at_cursor_with_multibyte_chars() {
    let mut line = InputLine::default();
    for c in "gül".chars() {
        line.insert(c);
    }
    line.left();
    line.backspace();
    assert_eq!(line.text(), "gl");
    line.insert('ö');
    assert_eq!(line.text(), "göl");
    line.right();
    line.right();
    assert_eq!(line.cursor(), 3);
    assert_eq!(line.take(), "göl");
    assert_eq!(line.cursor(), 0);
}

#[test]
fn quit_chord_needs_two_presses_within_window() {
    let mut app = app();
    let start = Instant::now();
    app.handle_event(AppEvent::InputChar('q'), start);
    assert!(app.running);
    assert!(app.is_quit_armed());
    assert_eq!(app.status_message(), Some("Press q again to quit"));
    app.handle_event(AppEvent::InputChar('q'), start + Duration::from_millis(500));
    assert!(!app.running);
}

#[test]
fn quit_chord_disarms_on_timeout_or_other_key() {
    let mut app = app();
    let start = Instant::now();
    app.handle_event(AppEvent::InputChar('q'), start);
    app.on_tick(start + Duration::from_secs(3));
    assert!(!app.is_quit_armed());

    app.handle_event(AppEvent::InputChar('q'), start);
    app.handle_event(AppEvent::Down, start);
    app.handle_event(AppEvent::InputChar('q'), start);
    assert!(app.running);
}

#[test]
fn ctrl_c_quits_even_while_locked() {
    let mut app = app();
    let now = Instant::now();
    app.handle_event(AppEvent::Lock, now);
    assert!(app.lock.is_locked());
    app.handle_event(AppEvent::Quit, now);
    assert!(!app.running);
}

#[test]
fn status_message_expires() {
    let mut app = app();
    let now = Instant::now();
    app.set_status("saved", now);
    app.on_tick(now + Duration::from_secs(1));
    assert_eq!(app.status_message(), Some("saved"));
    app.on_tick(now + Duration::from_secs(5));
    assert_eq!(app.status_message(), None);
}

#[test]
fn opening_logs_requests_a_reload() {
    let mut app = app();
    let now = Instant::now();
    assert_eq!(open(&mut app, Screen::Logs, now), vec![Action::LoadLogs]);
    assert_eq!(app.menu.focus(), Focus::Content);
    assert_eq!(app.handle_event(AppEvent::InputChar('r'), now), vec![Action::LoadLogs]);
}

#[test]
fn leaving_solitaire_saves_the_game() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Solitaire, now);
    app.handle_event(AppEvent::Back, now);
    assert_eq!(open(&mut app, Screen::Version, now), vec![Action::SaveSolitaire]);
}

#[test]
fn screen_lock_item_locks_immediately() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Lock, now);
    assert!(app.lock.is_locked());
}

#[test]
fn disabled_lock_reports_status() {
    let mut app = App::new(
        "ayse".to_string(),
        Game::new(1),
        VersionInfo::default(),
        ScreenLock::from_config(&lock_config(false)),
    );
    let now = Instant::now();
    app.handle_event(AppEvent::Lock, now);
    assert!(!app.lock.is_locked());
    assert_eq!(app.status_message(), Some("Screen lock is disabled in config"));
}

#[test]
fn unlock_prompt_masks_input_and_unlocks() {
    let mut app = app();
    let now = Instant::now();
    app.handle_event(AppEvent::Lock, now);
    app.handle_event(AppEvent::InputChar('u'), now);
    assert!(app.lock.is_prompt_open());
    type_text(&mut app, "abc", now);
    assert_eq!(app.masked_unlock_input(), "•••");
    app.handle_event(AppEvent::Back, now);
    assert!(!app.lock.is_prompt_open());
    assert!(app.lock.is_locked());

    app.handle_event(AppEvent::InputChar('u'), now);
    assert_eq!(app.masked_unlock_input(), "");
    app.handle_event(AppEvent::Submit, now);
    assert!(!app.lock.is_locked());
}

#[test]
fn idle_check_locks_after_timeout() {
    let mut app = app();
    let start = Instant::now();
    app.handle_event(AppEvent::Down, start);
    app.check_idle(start + Duration::from_secs(10));
    assert!(!app.lock.is_locked());
    app.check_idle(start + Duration::from_secs(31));
    assert!(app.lock.is_locked());
}

#[test]
fn locked_screen_still_plays_solitaire() {
    let mut app = app();
    let now = Instant::now();
    app.handle_event(AppEvent::Lock, now);
    let stock = app.game.cards(Pile::Stock).len();
    app.handle_event(AppEvent::InputChar('d'), now);
    assert_eq!(app.game.cards(Pile::Stock).len(), stock - 1);
    assert_eq!(app.game.cards(Pile::Waste).len(), 1);
}

#[test]
fn plain_text_needs_an_open_session() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Agents, now);
    type_text(&mut app, "hello", now);
    assert!(app.handle_event(AppEvent::Submit, now).is_empty());
    assert!(app.status_message().is_some_and(|msg| msg.contains("/new")));

    app.set_sessions(vec![session("s1", SessionState::Closed)]);
    type_text(&mut app, "hello", now);
    assert!(app.handle_event(AppEvent::Submit, now).is_empty());
}

#[test]
fn agent_console_emits_actions() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Agents, now);
    app.set_sessions(vec![
        session("s1", SessionState::Idle),
        session("s2", SessionState::Busy),
    ]);

    type_text(&mut app, "/new test fixtures", now);
    assert_eq!(
        app.handle_event(AppEvent::Submit, now),
        vec![Action::CreateSession {
            role: AgentRole::Test,
            name: "fixtures".to_string()
        }]
    );
    assert_eq!(app.input().text(), "");

    app.handle_event(AppEvent::Down, now);
    type_text(&mut app, "summarise", now);
    assert_eq!(
        app.handle_event(AppEvent::Submit, now),
        vec![Action::SendPrompt {
            session: "s2".to_string(),
            prompt: "summarise".to_string()
        }]
    );

    type_text(&mut app, "/broadcast status?", now);
    assert_eq!(
        app.handle_event(AppEvent::Submit, now),
        vec![Action::Broadcast("status?".to_string())]
    );

    type_text(&mut app, "/close", now);
    assert_eq!(
        app.handle_event(AppEvent::Submit, now),
        vec![Action::CloseSession("s2".to_string())]
    );
}

#[test]
fn invalid_command_keeps_input_for_editing() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Agents, now);
    type_text(&mut app, "/new wizard", now);
    assert!(app.handle_event(AppEvent::Submit, now).is_empty());
    assert_eq!(app.input().text(), "/new wizard");
}

#[test]
fn q_in_agent_console_is_text_not_quit() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Agents, now);
    type_text(&mut app, "qq", now);
    assert!(app.running);
    assert_eq!(app.input().text(), "qq");
}

#[test]
fn responses_append_to_transcript_and_clear_empties_it() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Agents, now);
    app.set_sessions(vec![session("s1", SessionState::Idle)]);
    app.record_prompt("s1", "list files");
    app.record_response(&AgentResponse {
        session_id: "s1".to_string(),
        command_id: 3,
        prompt: "list files".to_string(),
        success: false,
        output: "partial\nlisting".to_string(),
        error: Some("exit 2".to_string()),
        started_at: Utc::now(),
        duration_ms: 1500,
    });
    let transcript = app.transcript("s1");
    assert_eq!(transcript[0], "› list files");
    assert_eq!(transcript[1], "✗ #3 failed after 1.5s");
    assert_eq!(transcript[2], "partial");
    assert_eq!(transcript[4], "error: exit 2");

    type_text(&mut app, "/clear", now);
    app.handle_event(AppEvent::Submit, now);
    assert!(app.transcript("s1").is_empty());
}

#[test]
fn session_selection_clamps_to_list() {
    let mut app = app();
    app.set_sessions(vec![
        session("s1", SessionState::Idle),
        session("s2", SessionState::Idle),
    ]);
    app.select_session_by_id("s2");
    assert_eq!(app.selected_session_index(), 1);
    app.set_sessions(vec![session("s1", SessionState::Idle)]);
    assert_eq!(app.selected_session_id().as_deref(), Some("s1"));
}

#[test]
fn forge_keys_map_to_actions() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Forge, now);
    assert_eq!(app.handle_event(AppEvent::InputChar('s'), now), vec![Action::ForgeStart]);
    assert_eq!(app.handle_event(AppEvent::InputChar('x'), now), vec![Action::ForgeStop]);
    assert_eq!(app.handle_event(AppEvent::InputChar('r'), now), vec![Action::ForgeRestart]);
    app.handle_event(AppEvent::PageUp, now);
    assert_eq!(app.content_scroll(), 10);
    app.handle_event(AppEvent::PageDown, now);
    assert_eq!(app.content_scroll(), 0);
}

#[test]
fn solitaire_cursor_wraps_and_picks_then_places() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Solitaire, now);
    assert_eq!(app.pile_cursor(), Pile::Stock);
    app.handle_event(AppEvent::Left, now);
    assert_eq!(app.pile_cursor(), Pile::Tableau(6));
    app.handle_event(AppEvent::Right, now);
    assert_eq!(app.pile_cursor(), Pile::Stock);

    app.game.waste = vec![Card {
        suit: Suit::Hearts,
        rank: 13,
        face_up: true,
    }];
    app.game.tableau[0].clear();
    app.handle_event(AppEvent::Right, now);
    app.handle_event(AppEvent::Submit, now);
    assert_eq!(app.picked_pile(), Some(Pile::Waste));
    for _ in 0..5 {
        app.handle_event(AppEvent::Right, now);
    }
    assert_eq!(app.pile_cursor(), Pile::Tableau(0));
    app.handle_event(AppEvent::InputChar(' '), now);
    assert_eq!(app.picked_pile(), None);
    assert_eq!(app.game.tableau[0].len(), 1);
    assert!(app.game.waste.is_empty());
}

#[test]
fn illegal_solitaire_move_reports_status() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Solitaire, now);
    app.game.waste = vec![Card {
        suit: Suit::Spades,
        rank: 5,
        face_up: true,
    }];
    app.game.tableau[0].clear();
    app.handle_event(AppEvent::Right, now);
    app.handle_event(AppEvent::Submit, now);
    for _ in 0..5 {
        app.handle_event(AppEvent::Right, now);
    }
    app.handle_event(AppEvent::Submit, now);
    assert!(app.status_message().is_some());
    assert_eq!(app.game.waste.len(), 1);
}

#[test]
fn new_game_requests_a_save() {
    let mut app = app();
    let now = Instant::now();
    open(&mut app, Screen::Solitaire, now);
    assert_eq!(
        app.handle_event(AppEvent::InputChar('n'), now),
        vec![Action::SaveSolitaire]
    );
    assert_eq!(app.game.moves, 0);
}

#[test]
fn open_screen_focuses_content_and_requests_logs() {
    let mut app = app();
    let now = Instant::now();
    assert_eq!(app.open_screen(Screen::Logs, now), vec![Action::LoadLogs]);
    assert_eq!(app.menu.screen(), Screen::Logs);
    assert_eq!(app.menu.focus(), Focus::Content);
    assert!(app.open_screen(Screen::Home, now).is_empty());
    assert_eq!(app.menu.screen(), Screen::Logs);
}
