use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{AgentConfig, OutputFormat};
use crate::error::{Result, UnibosError};

const STDERR_TAIL_LINES: usize = 8;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    General,
    CodeReview,
    Refactor,
    Test,
    Docs,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::General,
        AgentRole::CodeReview,
        AgentRole::Refactor,
        AgentRole::Test,
        AgentRole::Docs,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "general" | "gen" => Some(Self::General),
            "review" | "code-review" | "code_review" => Some(Self::CodeReview),
            "refactor" => Some(Self::Refactor),
            "test" | "tests" => Some(Self::Test),
            "docs" | "doc" => Some(Self::Docs),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::CodeReview => "review",
            Self::Refactor => "refactor",
            Self::Test => "test",
            Self::Docs => "docs",
        }
    }

    pub fn preamble(self) -> &'static str {
        match self {
            Self::General => "",
            Self::CodeReview => {
                "You are a code reviewer. Point out bugs, risky patterns and missing tests. \
                 Do not modify files; report findings as a short list."
            }
            Self::Refactor => {
                "You are a refactoring assistant. Keep behaviour identical, make the smallest \
                 change that improves structure, and summarise what you changed."
            }
            Self::Test => {
                "You write and run tests. Prefer focused tests over broad ones and report \
                 which tests you added and whether they pass."
            }
            Self::Docs => {
                "You write documentation. Keep it accurate to the code and concise; do not \
                 change code."
            }
        }
    }

    /// Prepends the role preamble on the first turn of a conversation.
    pub fn frame_prompt(self, prompt: &str, first_turn: bool) -> String {
        let preamble = self.preamble();
        if !first_turn || preamble.is_empty() {
            return prompt.to_string();
        }
        format!("{preamble}\n\n{prompt}")
    }
}

#[derive(Debug, Clone)]
pub struct AgentCommandConfig {
    pub program: String,
    pub args_prefix: Vec<String>,
    pub model: Option<String>,
    pub output_format: OutputFormat,
    pub timeout: Option<Duration>,
}

impl Default for AgentCommandConfig {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl AgentCommandConfig {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            program: config.program.clone(),
            args_prefix: config.args_prefix.clone(),
            model: Some(config.model.trim().to_string()).filter(|model| !model.is_empty()),
            output_format: config.output_format,
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
        }
    }

    pub fn program_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or(&self.program)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub role: AgentRole,
    pub prompt: String,
    pub resume_session: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub text: String,
    pub session_id: Option<String>,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome>;
}

pub struct ClaudeCliExecutor {
    config: AgentCommandConfig,
}

impl ClaudeCliExecutor {
    pub fn new(config: AgentCommandConfig) -> Self {
        Self { config }
    }
}

impl CommandExecutor for ClaudeCliExecutor {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let first_turn = request.resume_session.is_none();
        let prompt = request.role.frame_prompt(&request.prompt, first_turn);
        let args = match request.resume_session.as_deref() {
            Some(session) => build_resume_prompt_args(&self.config, session),
            None => build_new_session_args(&self.config),
        };
        debug!(
            program = %self.config.program,
            resume = request.resume_session.is_some(),
            "invoking agent cli"
        );

        let mut child = Command::new(&self.config.program)
            .args(args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| UnibosError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let (output_tx, output_rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_collector(stdout, Stream::Stdout, output_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_collector(stderr, Stream::Stderr, output_tx.clone());
        }
        drop(output_tx);

        let status = match wait_with_timeout(&mut child, self.config.timeout)? {
            Some(status) => status,
            None => {
                warn!(program = %self.config.program, "agent cli timed out; killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(UnibosError::Timeout);
            }
        };

        let (stdout_lines, stderr_lines) = collect_output(&output_rx);

        if !status.success() {
            return Err(UnibosError::AgentFailed {
                code: status.code().unwrap_or(-1),
                stderr: tail(&stderr_lines, STDERR_TAIL_LINES),
            });
        }

        let raw = stdout_lines.join("\n");
        match self.config.output_format {
            OutputFormat::Text => Ok(ExecutionOutcome {
                text: raw.trim_end().to_string(),
                session_id: None,
            }),
            OutputFormat::Json => interpret_json_output(&raw),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_collector<R: Read + Send + 'static>(reader: R, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(std::result::Result::ok) {
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    });
}

/// Gathers output after the child has exited. Background descendants can
/// inherit the pipes and hold them open, so the wait for EOF is capped.
fn collect_output(rx: &Receiver<(Stream, String)>) -> (Vec<String>, Vec<String>) {
    let deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Stream::Stdout, line)) => stdout.push(line),
            Ok((Stream::Stderr, line)) => stderr.push(line),
            Err(RecvTimeoutError::Timeout) => {
                debug!("agent output pipes still open after exit; not waiting further");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    (stdout, stderr)
}

fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return Ok(Some(child.wait()?));
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn tail(lines: &[String], count: usize) -> String {
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Interprets the single JSON object printed with `--output-format json`.
/// Falls back to the raw text when the output is not JSON.
pub fn interpret_json_output(raw: &str) -> Result<ExecutionOutcome> {
    let trimmed = raw.trim();
    let Some(value) = last_json_object(trimmed) else {
        return Ok(ExecutionOutcome {
            text: trimmed.to_string(),
            session_id: None,
        });
    };
    let session_id = parse_session_id(&value);
    let text = value
        .get("result")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if value.get("is_error").and_then(|v| v.as_bool()) == Some(true) {
        return Err(UnibosError::AgentFailed {
            code: 0,
            stderr: if text.is_empty() {
                "agent reported an error".to_string()
            } else {
                text
            },
        });
    }
    Ok(ExecutionOutcome { text, session_id })
}

fn last_json_object(raw: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw)
        && value.is_object()
    {
        return Some(value);
    }
    raw.lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line.trim()).ok())
        .find(|value| value.is_object())
}

fn parse_session_id(value: &serde_json::Value) -> Option<String> {
    let direct = value
        .get("session_id")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("conversation_id").and_then(|v| v.as_str()));
    if let Some(id) = direct
        && looks_like_session_id(id)
    {
        return Some(id.to_string());
    }
    value
        .get("session")
        .and_then(|session| session.get("id"))
        .and_then(|v| v.as_str())
        .filter(|id| looks_like_session_id(id))
        .map(ToString::to_string)
}

pub fn looks_like_session_id(id: &str) -> bool {
    let trimmed = id.trim();
    if trimmed.len() < 8 || trimmed.contains(char::is_whitespace) {
        return false;
    }
    trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

fn base_args(config: &AgentCommandConfig) -> Vec<String> {
    let mut args = config.args_prefix.clone();
    if let Some(model) = config
        .model
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    if matches!(config.output_format, OutputFormat::Json) {
        args.push("--output-format".to_string());
        args.push("json".to_string());
    }
    args
}

pub fn build_new_session_args(config: &AgentCommandConfig) -> Vec<String> {
    let mut args = base_args(config);
    args.push("-p".to_string());
    args
}

pub fn build_resume_prompt_args(config: &AgentCommandConfig, existing_session: &str) -> Vec<String> {
    let mut args = base_args(config);
    args.push("--resume".to_string());
    args.push(existing_session.to_string());
    args.push("-p".to_string());
    args
}

#[cfg(test)]
#[path = "../tests/unit/agent_tests.rs"]
mod tests;
