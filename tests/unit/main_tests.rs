use super::*;
use crate::agent::{CommandExecutor, ExecutionOutcome, ExecutionRequest};
use crate::config::{ForgeConfig, LockConfig};
use crate::events::AppEvent;
use crate::menu::Screen;
use std::thread;

struct UpperExecutor;

impl CommandExecutor for UpperExecutor {
    fn execute(&self, request: &ExecutionRequest) -> crate::error::Result<ExecutionOutcome> {
        Ok(ExecutionOutcome {
            text: request.prompt.to_uppercase(),
            session_id: None,
        })
    }
}

fn shell(root: &Path) -> Shell {
    let store = DataStore::open(root.join("data")).expect("store");
    let forge = BackendForge::new(ForgeCommand::from_config(
        &ForgeConfig::default(),
        root.to_path_buf(),
    ));
    Shell::new(
        AgentSessionManager::new(Arc::new(UpperExecutor), 2),
        forge,
        store,
        "ayse".to_string(),
        root.join("unibos.log"),
    )
}

fn app() -> App {
    App::new(
        "ayse".to_string(),
        Game::new(8),
        VersionInfo::default(),
        ScreenLock::from_config(&LockConfig::default()),
    )
}

fn drain_until(shell: &mut Shell, app: &mut App, session: &str, lines: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline && app.transcript(session).len() < lines {
        shell.drain_responses(app);
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn parses_subcommands() {
    let cli = Cli::try_parse_from(["unibos", "release", "1.3.0", "--summary", "forge logs"])
        .expect("release parses");
    assert!(matches!(
        cli.command,
        Some(Commands::Release { ref version, ref summary, file: None, date: None })
            if version == "1.3.0" && summary == "forge logs"
    ));

    let cli = Cli::try_parse_from(["unibos", "--config", "/tmp/u.toml"]).expect("bare parses");
    assert!(cli.command.is_none());
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/u.toml")));

    let cli = Cli::try_parse_from(["unibos", "--open", "agents"]).expect("open parses");
    assert_eq!(cli.open, Some(Screen::Agents));
    assert!(Cli::try_parse_from(["unibos", "--open", "casino"]).is_err());

    let cli = Cli::try_parse_from(["unibos", "fanout", "-r", "docs,refactor", "tidy up"])
        .expect("fanout parses");
    match cli.command {
        Some(Commands::Fanout { roles, prompt, .. }) => {
            assert_eq!(roles, vec!["docs", "refactor"]);
            assert_eq!(prompt, "tidy up");
        }
        other => panic!("unexpected command: {other:?}"),
    }

    assert!(Cli::try_parse_from(["unibos", "release", "1.0.0"]).is_err());
}

#[test]
fn parse_role_lists_choices_on_error() {
    assert_eq!(parse_role("review").expect("role"), AgentRole::CodeReview);
    let err = parse_role("poet").expect_err("unknown role");
    assert!(err.to_string().contains("general, review"));
}

#[test]
fn wait_limit_follows_agent_timeout() {
    let mut config = UnibosConfig::default();
    config.agent.timeout_secs = 60;
    assert_eq!(wait_limit(None, &config), Duration::from_secs(65));
    assert_eq!(wait_limit(Some(3), &config), Duration::from_secs(3));
    config.agent.timeout_secs = 0;
    assert_eq!(wait_limit(None, &config), Duration::from_secs(86_400));
}

#[test]
fn describe_version_lists_changelog() {
    let mut info = VersionInfo::default();
    info.codename = "kuzgun".to_string();
    info.record_release("1.0.0", "first", "2026-10-01");
    let text = describe_version(&info);
    assert!(text.starts_with("v1.0.0 (build 1)\n"));
    assert!(text.contains("codename: kuzgun"));
    assert!(text.contains("  v1.0.0 (2026-10-01) first"));
}

#[test]
fn read_log_tail_keeps_last_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("unibos.log");
    let body: String = (1..=20).map(|n| format!("line {n}\n")).collect();
    fs::write(&path, body).expect("write");
    let tail = read_log_tail(&path, 3);
    assert_eq!(tail, vec!["line 18", "line 19", "line 20"]);

    let mut mixed = b"INFO ok\nWARN agent stderr: \xff\xfe bytes\n".to_vec();
    mixed.extend_from_slice(b"INFO after\n");
    let mixed_path = dir.path().join("mixed.log");
    fs::write(&mixed_path, mixed).expect("write");
    let tail = read_log_tail(&mixed_path, 10);
    assert_eq!(tail.len(), 3);
    assert!(tail[1].starts_with("WARN agent stderr: "));
    assert!(tail[1].contains('\u{FFFD}'));
    assert_eq!(tail[2], "INFO after");

    let missing = read_log_tail(&dir.path().join("absent.log"), 3);
    assert_eq!(missing.len(), 1);
    assert!(missing[0].starts_with("cannot read"));
}

#[test]
fn read_log_tail_only_reads_the_end_of_large_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("big.log");
    let body: String = (1..=5000).map(|n| format!("entry {n:05} {}\n", "x".repeat(40))).collect();
    fs::write(&path, body).expect("write");
    let tail = read_log_tail(&path, 2);
    assert_eq!(tail.len(), 2);
    assert!(tail[0].starts_with("entry 04999 "));
    assert!(tail[1].starts_with("entry 05000 "));
    let (bytes, truncated) = read_file_tail(&path, 64).expect("tail bytes");
    assert_eq!(bytes.len(), 64);
    assert!(truncated);
}

#[test]
fn created_session_receives_prompts_and_persists_transcript() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut shell = shell(dir.path());
    let mut app = app();
    let now = Instant::now();

    shell.perform(
        Action::CreateSession {
            role: AgentRole::Docs,
            name: "writer".to_string(),
        },
        &mut app,
        now,
    );
    assert_eq!(app.selected_session_id().as_deref(), Some("s1"));
    assert_eq!(app.status_message(), Some("Created s1 (writer), 1 open"));

    shell.perform(
        Action::SendPrompt {
            session: "s1".to_string(),
            prompt: "hello".to_string(),
        },
        &mut app,
        now,
    );
    drain_until(&mut shell, &mut app, "s1", 3);
    assert_eq!(app.transcript("s1")[0], "› hello");
    assert_eq!(app.transcript("s1")[2], "HELLO");

    let files = shell.store.list_transcripts().expect("list");
    assert_eq!(files.len(), 1);
    assert!(files[0].name.starts_with("writer-"));
    let entries = shell.store.read_transcript(&files[0].path).expect("read");
    assert_eq!(entries[0].output, "HELLO");
    assert_eq!(entries[0].role, AgentRole::Docs);
}

#[test]
fn session_limit_and_missing_session_surface_as_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut shell = shell(dir.path());
    let mut app = app();
    let now = Instant::now();
    for _ in 0..3 {
        shell.perform(
            Action::CreateSession {
                role: AgentRole::General,
                name: String::new(),
            },
            &mut app,
            now,
        );
    }
    assert!(app.status_message().is_some_and(|msg| msg.contains("limit")));

    shell.perform(Action::CloseSession("s9".to_string()), &mut app, now);
    assert!(app.status_message().is_some_and(|msg| msg.contains("s9")));
}

#[test]
fn broadcast_records_prompt_on_every_open_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut shell = shell(dir.path());
    let mut app = app();
    let now = Instant::now();

    shell.perform(Action::Broadcast("ping".to_string()), &mut app, now);
    assert_eq!(app.status_message(), Some("No open sessions to broadcast to"));

    for role in [AgentRole::Test, AgentRole::Refactor] {
        shell.perform(
            Action::CreateSession {
                role,
                name: String::new(),
            },
            &mut app,
            now,
        );
    }
    shell.perform(Action::Broadcast("ping".to_string()), &mut app, now);
    assert_eq!(app.status_message(), Some("Broadcast to 2 session(s)"));
    drain_until(&mut shell, &mut app, "s1", 3);
    drain_until(&mut shell, &mut app, "s2", 3);
    assert_eq!(app.transcript("s1")[2], "PING");
    assert_eq!(app.transcript("s2")[2], "PING");
}

#[test]
fn solitaire_is_saved_for_the_user() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut shell = shell(dir.path());
    let mut app = app();
    app.menu.select_by_id(Screen::Solitaire);
    let now = Instant::now();
    app.handle_event(AppEvent::Submit, now);
    app.handle_event(AppEvent::InputChar('d'), now);
    shell.perform(Action::SaveSolitaire, &mut app, now);
    let saved = shell.store.load_solitaire("ayse").expect("saved game");
    assert_eq!(saved, app.game);
    assert_eq!(saved.moves, 1);
}

#[test]
fn stopping_idle_forge_reports_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut shell = shell(dir.path());
    let mut app = app();
    shell.perform(Action::ForgeStop, &mut app, Instant::now());
    assert_eq!(app.status_message(), Some("Backend is not running"));
}

#[test]
fn load_logs_reads_the_log_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut shell = shell(dir.path());
    let mut app = app();
    fs::write(dir.path().join("unibos.log"), "INFO started\n").expect("write log");
    shell.perform(Action::LoadLogs, &mut app, Instant::now());
    assert_eq!(app.log_lines(), ["INFO started".to_string()]);
}
