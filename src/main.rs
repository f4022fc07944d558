use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use tracing::{info, warn};

mod agent;
mod agent_session;
mod app;
mod config;
mod error;
mod events;
mod forge;
mod lock;
mod logging;
mod menu;
mod solitaire;
mod store;
mod text_layout;
mod theme;
mod ui;
mod version;

use agent::{AgentCommandConfig, AgentRole, ClaudeCliExecutor};
use agent_session::{AgentResponse, AgentSessionManager, SessionId};
use app::{Action, App};
use config::UnibosConfig;
use forge::{BackendForge, ForgeCommand};
use lock::ScreenLock;
use menu::Screen;
use solitaire::Game;
use store::{DataStore, TranscriptEntry};
use theme::Theme;
use version::VersionInfo;

const LOG_TAIL_LINES: usize = 500;
const LOG_TAIL_LINE_BYTES: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "unibos", version, about = "Personal terminal shell")]
struct Cli {
    /// Config file (defaults to ~/.unibos/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Screen to open on start (interactive mode only)
    #[arg(long, value_enum)]
    open: Option<Screen>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the version metadata
    Version {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Record a release: bump the build number and prepend a changelog entry
    Release {
        version: String,
        #[arg(short, long)]
        summary: String,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Release date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Print an argon2 hash for lock.passphrase_hash
    HashPassphrase { passphrase: String },
    /// Print the config file path in use
    ConfigPath,
    /// List saved agent transcripts, or print one
    Transcripts { name: Option<String> },
    /// Send one prompt to a fresh agent session and print the reply
    Ask {
        #[arg(short, long, default_value = "general")]
        role: String,
        /// Seconds to wait for the reply (defaults to agent.timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
        prompt: String,
    },
    /// Send one prompt to a session per role in parallel and print every reply
    Fanout {
        #[arg(short, long, value_delimiter = ',', default_value = "review,test")]
        roles: Vec<String>,
        #[arg(long)]
        timeout: Option<u64>,
        prompt: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        None => run_interactive(cli.config.as_deref(), cli.open),
        Some(Commands::ConfigPath) => {
            let path = match cli.config {
                Some(path) => path,
                None => config::default_config_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
        Some(Commands::HashPassphrase { passphrase }) => {
            if passphrase.is_empty() {
                bail!("passphrase must not be empty");
            }
            println!("{}", lock::hash_passphrase(&passphrase)?);
            Ok(())
        }
        Some(command) => {
            let config = UnibosConfig::load(cli.config.as_deref())
                .context("failed to load config")?;
            logging::init_stderr_logger(&config.logging.level);
            run_command(command, &config)
        }
    }
}

fn run_command(command: Commands, config: &UnibosConfig) -> anyhow::Result<()> {
    match command {
        Commands::Version { file, json } => {
            let path = version_file(file, config)?;
            let info = VersionInfo::load(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print!("{}", describe_version(&info));
            }
        }
        Commands::Release {
            version,
            summary,
            file,
            date,
        } => {
            let path = version_file(file, config)?;
            let mut info = VersionInfo::load(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let date = date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            info.record_release(&version, &summary, &date);
            info.save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", info.label());
        }
        Commands::Transcripts { name } => {
            let store = DataStore::open(config.storage_root()?)?;
            let files = store.list_transcripts()?;
            match name {
                None => {
                    for file in files {
                        println!("{}", file.name);
                    }
                }
                Some(name) => {
                    let Some(file) = files.iter().find(|file| file.name == name) else {
                        bail!("no transcript named {name}");
                    };
                    for entry in store.read_transcript(&file.path)? {
                        let mark = if entry.success { "ok" } else { "failed" };
                        println!(
                            "[{}] {} {} ({mark}, {} ms)",
                            entry.started_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.session_name,
                            entry.role.label(),
                            entry.duration_ms
                        );
                        println!("> {}", entry.prompt);
                        println!("{}", entry.output);
                        if let Some(error) = entry.error {
                            println!("error: {error}");
                        }
                        println!();
                    }
                }
            }
        }
        Commands::Ask {
            role,
            timeout,
            prompt,
        } => {
            let role = parse_role(&role)?;
            let store = DataStore::open(config.storage_root()?)?;
            let mut manager = cli_manager(config);
            let id = manager.create_session("", role)?;
            let target = open_transcript(&manager, &store, &id);
            manager.send_command(&id, &prompt)?;
            let response = manager.get_response(wait_limit(timeout, config))?;
            if let Some(target) = &target {
                target.persist(&store, &response);
            }
            print_response(&response);
            manager.shutdown();
            if !response.success {
                bail!("agent session {id} failed");
            }
        }
        Commands::Fanout {
            roles,
            timeout,
            prompt,
        } => {
            let roles = roles
                .iter()
                .map(|raw| parse_role(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let store = DataStore::open(config.storage_root()?)?;
            let mut manager = cli_manager(config);
            let mut targets = HashMap::new();
            for role in roles {
                let id = manager.create_session("", role)?;
                if let Some(target) = open_transcript(&manager, &store, &id) {
                    targets.insert(id, target);
                }
            }
            info!(sessions = manager.open_count(), "fanning out prompt");
            let responses = manager.broadcast_and_wait(&prompt, wait_limit(timeout, config));
            for response in &responses {
                if let Some(target) = targets.get(&response.session_id) {
                    target.persist(&store, response);
                }
                print_response(response);
            }
            manager.shutdown();
            let failed = responses.iter().filter(|response| !response.success).count();
            if failed > 0 {
                bail!("{failed} of {} agent sessions failed", responses.len());
            }
        }
        Commands::HashPassphrase { .. } | Commands::ConfigPath => {}
    }
    Ok(())
}

fn parse_role(raw: &str) -> anyhow::Result<AgentRole> {
    AgentRole::parse(raw).with_context(|| {
        let roles: Vec<&str> = AgentRole::ALL.iter().map(|role| role.label()).collect();
        format!("unknown role '{raw}' (expected one of: {})", roles.join(", "))
    })
}

fn cli_manager(config: &UnibosConfig) -> AgentSessionManager {
    let command = AgentCommandConfig::from_config(&config.agent);
    info!(
        program = command.program_name(),
        max_sessions = config.agent.max_sessions,
        "agent backend configured"
    );
    AgentSessionManager::new(
        Arc::new(ClaudeCliExecutor::new(command)),
        config.agent.max_sessions,
    )
}

/// Reply deadline for the blocking subcommands. A zero agent timeout means the
/// child is never killed, so the wait is capped at a day.
fn wait_limit(explicit: Option<u64>, config: &UnibosConfig) -> Duration {
    let secs = match explicit {
        Some(secs) => secs,
        None if config.agent.timeout_secs == 0 => 24 * 60 * 60,
        None => config.agent.timeout_secs + 5,
    };
    Duration::from_secs(secs)
}

fn print_response(response: &AgentResponse) {
    println!(
        "== {} #{} ({} ms) ==",
        response.session_id, response.command_id, response.duration_ms
    );
    if !response.output.is_empty() {
        println!("{}", response.output);
    }
    if let Some(error) = &response.error {
        eprintln!("{}: {error}", response.session_id);
    }
}

fn version_file(explicit: Option<PathBuf>, config: &UnibosConfig) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(config.version_path()?),
    }
}

fn describe_version(info: &VersionInfo) -> String {
    let mut out = format!("{}\n", info.label());
    if !info.codename.is_empty() {
        out.push_str(&format!("codename: {}\n", info.codename));
    }
    if !info.release_date.is_empty() {
        out.push_str(&format!("released: {}\n", info.release_date));
    }
    for entry in &info.changelog {
        out.push_str(&format!("  {} ({}) {}\n", entry.version, entry.date, entry.summary));
    }
    out
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
        default_hook(panic_info);
    }));
}

fn run_interactive(config_path: Option<&Path>, open: Option<Screen>) -> anyhow::Result<()> {
    let config = UnibosConfig::load(config_path).context("failed to load config")?;
    lock::check_passphrase_hash(&config.lock)
        .context("invalid lock.passphrase_hash; generate one with `unibos hash-passphrase`")?;
    let log_path = config.log_path()?;
    if !logging::init_file_logger(&log_path, &config.logging.level) {
        eprintln!("logging disabled: cannot open {}", log_path.display());
    }
    info!("unibos session starting");

    let store = DataStore::open(config.storage_root()?)?;
    info!(root = %store.root().display(), "data store opened");
    let user = config.user_name();
    let game = store
        .load_solitaire(&user)
        .unwrap_or_else(|| Game::new(rand::random()));
    let version = VersionInfo::load(&config.version_path()?).unwrap_or_else(|err| {
        warn!("cannot read version file: {err}");
        VersionInfo::default()
    });
    let theme = Theme::load_or_default(config.theme_path()?);
    let manager = cli_manager(&config);
    let forge = BackendForge::new(ForgeCommand::from_config(
        &config.forge,
        config.forge_working_dir()?,
    ));
    let mut shell = Shell::new(manager, forge, store, user.clone(), log_path);
    let mut app = App::new(user, game, version, ScreenLock::from_config(&config.lock));
    if let Some(screen) = open {
        let now = Instant::now();
        for action in app.open_screen(screen, now) {
            shell.perform(action, &mut app, now);
        }
    }
    let tick = Duration::from_millis(config.ui.tick_millis.max(1));

    install_panic_hook();
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, &mut app, &mut shell, &theme, tick);

    shell.perform(Action::SaveSolitaire, &mut app, Instant::now());
    shell.manager.shutdown();
    if shell.forge.status().is_running()
        && let Err(err) = shell.forge.stop()
    {
        warn!("failed to stop backend on exit: {err}");
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!("unibos session finished");
    result.map_err(Into::into)
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    shell: &mut Shell,
    theme: &Theme,
    tick: Duration,
) -> io::Result<()> {
    while app.running {
        shell.drain_responses(app);
        shell.forge.poll();
        let now = Instant::now();
        app.check_idle(now);
        app.on_tick(now);

        terminal.draw(|frame| ui::render(frame, app, &shell.forge, theme))?;

        let event = events::next_event(tick)?;
        for action in app.handle_event(event, Instant::now()) {
            shell.perform(action, app, Instant::now());
        }
    }
    Ok(())
}

struct TranscriptTarget {
    path: PathBuf,
    name: String,
    role: AgentRole,
}

impl TranscriptTarget {
    fn persist(&self, store: &DataStore, response: &AgentResponse) {
        let entry = TranscriptEntry::from_response(&self.name, self.role, response);
        if let Err(err) = store.append_transcript(&self.path, &entry) {
            warn!(path = %self.path.display(), "failed to persist transcript: {err}");
        }
    }
}

fn open_transcript(
    manager: &AgentSessionManager,
    store: &DataStore,
    id: &str,
) -> Option<TranscriptTarget> {
    let info = manager.session_info(id)?;
    Some(TranscriptTarget {
        path: store.transcript_file(&info.name, info.created_at),
        name: info.name,
        role: info.role,
    })
}

/// Owns the side-effecting services the `App` asks for through `Action`s.
struct Shell {
    manager: AgentSessionManager,
    forge: BackendForge,
    store: DataStore,
    user: String,
    log_path: PathBuf,
    transcripts: HashMap<SessionId, TranscriptTarget>,
}

impl Shell {
    fn new(
        manager: AgentSessionManager,
        forge: BackendForge,
        store: DataStore,
        user: String,
        log_path: PathBuf,
    ) -> Self {
        Self {
            manager,
            forge,
            store,
            user,
            log_path,
            transcripts: HashMap::new(),
        }
    }

    fn drain_responses(&mut self, app: &mut App) {
        let responses = self.manager.try_responses();
        if responses.is_empty() {
            app.set_sessions(self.manager.sessions());
            return;
        }
        for response in responses {
            app.record_response(&response);
            if let Some(target) = self.transcripts.get(&response.session_id) {
                target.persist(&self.store, &response);
            }
        }
        app.set_sessions(self.manager.sessions());
    }

    fn perform(&mut self, action: Action, app: &mut App, now: Instant) {
        match action {
            Action::CreateSession { role, name } => {
                match self.manager.create_session(&name, role) {
                    Ok(id) => {
                        if let Some(target) = open_transcript(&self.manager, &self.store, &id) {
                            app.set_status(
                                format!(
                                    "Created {id} ({}), {} open",
                                    target.name,
                                    self.manager.open_count()
                                ),
                                now,
                            );
                            self.transcripts.insert(id.clone(), target);
                        }
                        app.set_sessions(self.manager.sessions());
                        app.select_session_by_id(&id);
                    }
                    Err(err) => app.set_status(err.to_string(), now),
                }
            }
            Action::CloseSession(id) => match self.manager.close_session(&id) {
                Ok(()) => {
                    app.set_sessions(self.manager.sessions());
                    app.set_status(format!("Closed {id}"), now);
                }
                Err(err) => app.set_status(err.to_string(), now),
            },
            Action::SendPrompt { session, prompt } => {
                match self.manager.send_command(&session, &prompt) {
                    Ok(_) => app.record_prompt(&session, &prompt),
                    Err(err) => app.set_status(err.to_string(), now),
                }
            }
            Action::Broadcast(prompt) => {
                let targets = self.manager.broadcast(&prompt);
                if targets.is_empty() {
                    app.set_status("No open sessions to broadcast to", now);
                }
                for (session, _) in &targets {
                    app.record_prompt(session, &prompt);
                }
                if !targets.is_empty() {
                    app.set_status(format!("Broadcast to {} session(s)", targets.len()), now);
                }
            }
            Action::ForgeStart => match self.forge.start() {
                Ok(pid) => app.set_status(format!("Backend started (pid {pid})"), now),
                Err(err) => app.set_status(err.to_string(), now),
            },
            Action::ForgeStop => match self.forge.stop() {
                Ok(()) => app.set_status("Backend stopped", now),
                Err(err) => app.set_status(err.to_string(), now),
            },
            Action::ForgeRestart => match self.forge.restart() {
                Ok(pid) => app.set_status(format!("Backend restarted (pid {pid})"), now),
                Err(err) => app.set_status(err.to_string(), now),
            },
            Action::SaveSolitaire => {
                if let Err(err) = self.store.save_solitaire(&self.user, &app.game) {
                    warn!("failed to save solitaire: {err}");
                    app.set_status(format!("Could not save game: {err}"), now);
                }
            }
            Action::LoadLogs => app.set_log_lines(read_log_tail(&self.log_path, LOG_TAIL_LINES)),
        }
    }
}

/// Last `limit` lines of the log. Only the end of the file is read, and bytes
/// that are not UTF-8 (agent stderr ends up here) are replaced.
fn read_log_tail(path: &Path, limit: usize) -> Vec<String> {
    let max_bytes = u64::try_from(limit.saturating_mul(LOG_TAIL_LINE_BYTES)).unwrap_or(u64::MAX);
    match read_file_tail(path, max_bytes) {
        Ok((bytes, truncated)) => {
            let text = String::from_utf8_lossy(&bytes);
            let mut lines: Vec<&str> = text.lines().collect();
            if truncated && !lines.is_empty() {
                lines.remove(0);
            }
            let start = lines.len().saturating_sub(limit);
            lines[start..].iter().map(|line| line.to_string()).collect()
        }
        Err(err) => vec![format!("cannot read {}: {err}", path.display())],
    }
}

fn read_file_tail(path: &Path, max_bytes: u64) -> io::Result<(Vec<u8>, bool)> {
    let mut file = fs::File::open(path)?;
    let start = file.metadata()?.len().saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok((bytes, start > 0))
}

#[cfg(test)]
#[path = "../tests/unit/main_tests.rs"]
mod tests;
