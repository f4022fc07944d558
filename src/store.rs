use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::AgentRole;
use crate::agent_session::AgentResponse;
use crate::error::Result;
use crate::solitaire::Game;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub session_id: String,
    pub session_name: String,
    pub role: AgentRole,
    pub prompt: String,
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TranscriptEntry {
    pub fn from_response(name: &str, role: AgentRole, response: &AgentResponse) -> Self {
        Self {
            session_id: response.session_id.clone(),
            session_name: name.to_string(),
            role,
            prompt: response.prompt.clone(),
            success: response.success,
            output: response.output.clone(),
            error: response.error.clone(),
            started_at: response.started_at,
            duration_ms: response.duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFile {
    pub path: PathBuf,
    pub name: String,
    pub modified_epoch_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
    solitaire_dir: PathBuf,
    agents_dir: PathBuf,
}

impl DataStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let store = Self {
            solitaire_dir: root.join("solitaire"),
            agents_dir: root.join("agents"),
            root,
        };
        fs::create_dir_all(&store.solitaire_dir)?;
        fs::create_dir_all(&store.agents_dir)?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn solitaire_file(&self, user: &str) -> PathBuf {
        self.solitaire_dir
            .join(format!("{}.json", sanitize_file_stem(user)))
    }

    pub fn load_solitaire(&self, user: &str) -> Option<Game> {
        let path = self.solitaire_file(user);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Game>(&text) {
            Ok(game) => Some(game),
            Err(err) => {
                warn!(path = %path.display(), "ignoring corrupt solitaire save: {err}");
                None
            }
        }
    }

    pub fn save_solitaire(&self, user: &str, game: &Game) -> Result<()> {
        let text = serde_json::to_string_pretty(game)?;
        write_atomic(&self.solitaire_file(user), text.as_bytes())
    }

    pub fn transcript_file(&self, session_name: &str, created_at: DateTime<Utc>) -> PathBuf {
        self.agents_dir.join(format!(
            "{}-{}.jsonl",
            sanitize_file_stem(session_name),
            created_at.timestamp()
        ))
    }

    pub fn append_transcript(&self, path: &Path, entry: &TranscriptEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn read_transcript(&self, path: &Path) -> Result<Vec<TranscriptEntry>> {
        let text = fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<TranscriptEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(path = %path.display(), "skipping bad transcript line: {err}"),
            }
        }
        Ok(entries)
    }

    pub fn list_transcripts(&self) -> Result<Vec<TranscriptFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.agents_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let modified_epoch_secs = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
            files.push(TranscriptFile {
                path,
                name,
                modified_epoch_secs,
            });
        }
        files.sort_by(|a, b| {
            b.modified_epoch_secs
                .cmp(&a.modified_epoch_secs)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(files)
    }
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn sanitize_file_stem(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
#[path = "../tests/unit/store_tests.rs"]
mod tests;
