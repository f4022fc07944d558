use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{AgentRole, CommandExecutor, ExecutionRequest};
use crate::error::{Result, UnibosError};

pub type SessionId = String;
pub type CommandId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Busy,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub session_id: SessionId,
    pub command_id: CommandId,
    pub prompt: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AgentResponse {
    pub fn timed_out(session_id: &str, command_id: CommandId, prompt: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            command_id,
            prompt: prompt.to_string(),
            success: false,
            output: String::new(),
            error: Some(UnibosError::Timeout.to_string()),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub role: AgentRole,
    pub state: SessionState,
    pub processed: u64,
    pub failures: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
enum SessionCommand {
    Run { id: CommandId, prompt: String },
    Shutdown,
}

#[derive(Debug)]
struct SessionStats {
    state: SessionState,
    processed: u64,
    failures: u64,
    closing: bool,
}

struct SessionHandle {
    name: String,
    role: AgentRole,
    created_at: DateTime<Utc>,
    command_tx: Sender<SessionCommand>,
    stats: Arc<Mutex<SessionStats>>,
    closed: bool,
}

pub struct AgentSessionManager {
    executor: Arc<dyn CommandExecutor>,
    max_sessions: usize,
    sessions: HashMap<SessionId, SessionHandle>,
    order: Vec<SessionId>,
    next_session: u64,
    next_command: CommandId,
    response_tx: Sender<AgentResponse>,
    response_rx: Receiver<AgentResponse>,
    stashed: VecDeque<AgentResponse>,
}

impl AgentSessionManager {
    pub fn new(executor: Arc<dyn CommandExecutor>, max_sessions: usize) -> Self {
        let (response_tx, response_rx) = mpsc::channel();
        Self {
            executor,
            max_sessions: max_sessions.max(1),
            sessions: HashMap::new(),
            order: Vec::new(),
            next_session: 1,
            next_command: 1,
            response_tx,
            response_rx,
            stashed: VecDeque::new(),
        }
    }

    pub fn open_count(&self) -> usize {
        self.sessions.values().filter(|handle| !handle.closed).count()
    }

    pub fn create_session(&mut self, name: &str, role: AgentRole) -> Result<SessionId> {
        let open = self.open_count();
        if open >= self.max_sessions {
            return Err(UnibosError::SessionLimit(open));
        }
        let id = format!("s{}", self.next_session);
        self.next_session += 1;
        let name = Some(name.trim())
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("{}-{id}", role.label()));

        let (command_tx, command_rx) = mpsc::channel();
        let stats = Arc::new(Mutex::new(SessionStats {
            state: SessionState::Idle,
            processed: 0,
            failures: 0,
            closing: false,
        }));
        spawn_worker(
            id.clone(),
            role,
            command_rx,
            self.response_tx.clone(),
            stats.clone(),
            self.executor.clone(),
        );
        info!(session = %id, %name, role = role.label(), "agent session created");
        self.sessions.insert(
            id.clone(),
            SessionHandle {
                name,
                role,
                created_at: Utc::now(),
                command_tx,
                stats,
                closed: false,
            },
        );
        self.order.push(id.clone());
        Ok(id)
    }

    pub fn send_command(&mut self, session_id: &str, prompt: &str) -> Result<CommandId> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| UnibosError::SessionNotFound(session_id.to_string()))?;
        if handle.closed {
            return Err(UnibosError::SessionClosed(session_id.to_string()));
        }
        let id = self.next_command;
        self.next_command += 1;
        handle
            .command_tx
            .send(SessionCommand::Run {
                id,
                prompt: prompt.to_string(),
            })
            .map_err(|_| UnibosError::SessionClosed(session_id.to_string()))?;
        debug!(session = %session_id, command = id, "command queued");
        Ok(id)
    }

    /// Drains every response available right now.
    pub fn try_responses(&mut self) -> Vec<AgentResponse> {
        let mut out: Vec<AgentResponse> = self.stashed.drain(..).collect();
        while let Ok(response) = self.response_rx.try_recv() {
            out.push(response);
        }
        out
    }

    pub fn get_response(&mut self, timeout: Duration) -> Result<AgentResponse> {
        if let Some(response) = self.stashed.pop_front() {
            return Ok(response);
        }
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Err(UnibosError::Timeout)
            }
        }
    }

    pub fn broadcast(&mut self, prompt: &str) -> Vec<(SessionId, CommandId)> {
        let targets: Vec<SessionId> = self
            .order
            .iter()
            .filter(|id| self.sessions.get(*id).is_some_and(|handle| !handle.closed))
            .cloned()
            .collect();
        let mut sent = Vec::with_capacity(targets.len());
        for session_id in targets {
            match self.send_command(&session_id, prompt) {
                Ok(command_id) => sent.push((session_id, command_id)),
                Err(err) => warn!(session = %session_id, "broadcast skipped: {err}"),
            }
        }
        sent
    }

    /// Sends `prompt` to every open session and collects the replies. Sessions
    /// that miss the deadline get a timed-out response instead.
    pub fn broadcast_and_wait(&mut self, prompt: &str, timeout: Duration) -> Vec<AgentResponse> {
        let sent = self.broadcast(prompt);
        let mut pending: HashSet<CommandId> = sent.iter().map(|(_, id)| *id).collect();
        let mut collected: HashMap<CommandId, AgentResponse> = HashMap::new();
        let deadline = Instant::now() + timeout;

        let mut held_back = VecDeque::new();
        for response in self.stashed.drain(..) {
            if pending.remove(&response.command_id) {
                collected.insert(response.command_id, response);
            } else {
                held_back.push_back(response);
            }
        }
        self.stashed = held_back;

        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => {
                    if pending.remove(&response.command_id) {
                        collected.insert(response.command_id, response);
                    } else {
                        self.stashed.push_back(response);
                    }
                }
                Err(_) => break,
            }
        }

        sent.into_iter()
            .map(|(session_id, command_id)| {
                collected
                    .remove(&command_id)
                    .unwrap_or_else(|| AgentResponse::timed_out(&session_id, command_id, prompt))
            })
            .collect()
    }

    pub fn close_session(&mut self, session_id: &str) -> Result<()> {
        let handle = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| UnibosError::SessionNotFound(session_id.to_string()))?;
        if handle.closed {
            return Ok(());
        }
        handle.closed = true;
        // The worker checks `closing` before starting each queued command, so
        // it must be set before the shutdown marker is queued.
        if let Ok(mut stats) = handle.stats.lock() {
            stats.closing = true;
            if stats.state == SessionState::Idle {
                stats.state = SessionState::Closed;
            }
        }
        let _ = handle.command_tx.send(SessionCommand::Shutdown);
        info!(session = %session_id, "agent session closed");
        Ok(())
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.order
            .iter()
            .filter_map(|id| self.session_info(id))
            .collect()
    }

    pub fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let handle = self.sessions.get(session_id)?;
        let (state, processed, failures) = handle
            .stats
            .lock()
            .map(|stats| (stats.state, stats.processed, stats.failures))
            .unwrap_or((SessionState::Closed, 0, 0));
        Some(SessionInfo {
            id: session_id.to_string(),
            name: handle.name.clone(),
            role: handle.role,
            state: if handle.closed {
                SessionState::Closed
            } else {
                state
            },
            processed,
            failures,
            created_at: handle.created_at,
        })
    }

    pub fn shutdown(&mut self) {
        let ids: Vec<SessionId> = self.order.clone();
        for id in ids {
            let _ = self.close_session(&id);
        }
    }
}

impl Drop for AgentSessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    session_id: SessionId,
    role: AgentRole,
    command_rx: Receiver<SessionCommand>,
    response_tx: Sender<AgentResponse>,
    stats: Arc<Mutex<SessionStats>>,
    executor: Arc<dyn CommandExecutor>,
) {
    thread::spawn(move || {
        let mut conversation: Option<String> = None;
        while let Ok(command) = command_rx.recv() {
            let (command_id, prompt) = match command {
                SessionCommand::Run { id, prompt } => (id, prompt),
                SessionCommand::Shutdown => break,
            };
            if is_closing(&stats) {
                break;
            }
            set_state(&stats, SessionState::Busy);
            let started_at = Utc::now();
            let started = Instant::now();
            let request = ExecutionRequest {
                role,
                prompt: prompt.clone(),
                resume_session: conversation.clone(),
            };
            let result = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&request)))
                .unwrap_or_else(|_| {
                    Err(UnibosError::AgentFailed {
                        code: -1,
                        stderr: "executor panicked".to_string(),
                    })
                });
            let duration_ms = started.elapsed().as_millis() as u64;

            let response = match result {
                Ok(outcome) => {
                    if outcome.session_id.is_some() {
                        conversation = outcome.session_id;
                    }
                    AgentResponse {
                        session_id: session_id.clone(),
                        command_id,
                        prompt,
                        success: true,
                        output: outcome.text,
                        error: None,
                        started_at,
                        duration_ms,
                    }
                }
                Err(err) => {
                    warn!(session = %session_id, command = command_id, "agent command failed: {err}");
                    AgentResponse {
                        session_id: session_id.clone(),
                        command_id,
                        prompt,
                        success: false,
                        output: String::new(),
                        error: Some(err.to_string()),
                        started_at,
                        duration_ms,
                    }
                }
            };

            if let Ok(mut stats) = stats.lock() {
                stats.processed += 1;
                if !response.success {
                    stats.failures += 1;
                }
                stats.state = if stats.closing {
                    SessionState::Closed
                } else {
                    SessionState::Idle
                };
            }
            if response_tx.send(response).is_err() {
                break;
            }
        }
        set_state(&stats, SessionState::Closed);
        debug!(session = %session_id, "agent worker exited");
    });
}

fn is_closing(stats: &Mutex<SessionStats>) -> bool {
    stats.lock().map(|stats| stats.closing).unwrap_or(true)
}

fn set_state(stats: &Mutex<SessionStats>, state: SessionState) {
    if let Ok(mut stats) = stats.lock() {
        stats.state = state;
    }
}

#[cfg(test)]
#[path = "../tests/unit/agent_session_tests.rs"]
mod tests;
