use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::store::write_atomic;

pub const MAX_CHANGELOG_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub version: String,
    pub date: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    pub version: String,
    pub build_number: u64,
    pub release_date: String,
    pub codename: String,
    pub changelog: Vec<ChangelogEntry>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            version: "v0.0.0".to_string(),
            build_number: 0,
            release_date: String::new(),
            codename: String::new(),
            changelog: Vec::new(),
        }
    }
}

impl VersionInfo {
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "version file missing; using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        write_atomic(path, text.as_bytes())
    }

    pub fn label(&self) -> String {
        format!("{} (build {})", display_version(&self.version), self.build_number)
    }

    pub fn record_release(&mut self, version: &str, summary: &str, date: &str) {
        self.version = display_version(version);
        self.release_date = date.to_string();
        self.build_number = self.build_number.saturating_add(1);
        self.changelog.insert(
            0,
            ChangelogEntry {
                version: self.version.clone(),
                date: date.to_string(),
                summary: summary.trim().to_string(),
            },
        );
        self.changelog.truncate(MAX_CHANGELOG_ENTRIES);
        info!(version = %self.version, build = self.build_number, "release recorded");
    }
}

fn display_version(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('v') || trimmed.is_empty() {
        trimmed.to_string()
    } else {
        format!("v{trimmed}")
    }
}
