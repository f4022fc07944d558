use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnibosError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown agent session: {0}")]
    SessionNotFound(String),

    #[error("Agent session {0} is closed")]
    SessionClosed(String),

    #[error("Agent session limit reached ({0} open)")]
    SessionLimit(usize),

    #[error("Timed out waiting for a response")]
    Timeout,

    #[error("Agent process exited with code {code}: {stderr}")]
    AgentFailed { code: i32, stderr: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend is already running (pid {0})")]
    ForgeAlreadyRunning(u32),

    #[error("Backend is not running")]
    ForgeNotRunning,

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Passphrase error: {0}")]
    Passphrase(String),
}

pub type Result<T> = std::result::Result<T, UnibosError>;
