use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, UnibosError};

pub const DEFAULT_CONFIG_TOML: &str = r#"[storage]
root_dir = "~/.unibos/data"

[user]
name = ""

[agent]
program = "claude"
args_prefix = ["--dangerously-skip-permissions"]
model = ""
output_format = "json"
timeout_secs = 300
max_sessions = 8

[forge]
program = "python3"
args = ["manage.py", "runserver", "127.0.0.1:8000"]
working_dir = "."
url = "http://127.0.0.1:8000"
log_lines = 500

[lock]
enabled = true
idle_timeout_secs = 0
passphrase_hash = ""

[ui]
tick_millis = 16
theme_file = "~/.unibos/theme.toml"

[logging]
level = "info"
file = "~/.unibos/unibos.log"

[version]
file = "VERSION.json"
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnibosConfig {
    pub storage: StorageConfig,
    pub user: UserConfig,
    pub agent: AgentConfig,
    pub forge: ForgeConfig,
    pub lock: LockConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
    pub version: VersionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: "~/.unibos/data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    #[default]
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub program: String,
    pub args_prefix: Vec<String>,
    pub model: String,
    pub output_format: OutputFormat,
    pub timeout_secs: u64,
    pub max_sessions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args_prefix: vec!["--dangerously-skip-permissions".to_string()],
            model: String::new(),
            output_format: OutputFormat::Json,
            timeout_secs: 300,
            max_sessions: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: String,
    pub url: String,
    pub log_lines: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec![
                "manage.py".to_string(),
                "runserver".to_string(),
                "127.0.0.1:8000".to_string(),
            ],
            working_dir: ".".to_string(),
            url: "http://127.0.0.1:8000".to_string(),
            log_lines: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub enabled: bool,
    pub idle_timeout_secs: u64,
    pub passphrase_hash: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_timeout_secs: 0,
            passphrase_hash: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub tick_millis: u64,
    pub theme_file: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_millis: 16,
            theme_file: "~/.unibos/theme.toml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: "~/.unibos/unibos.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
    pub file: String,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            file: "VERSION.json".to_string(),
        }
    }
}

impl UnibosConfig {
    /// Loads the config from `explicit` if given, otherwise from the default
    /// location, creating the default file on first run.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = default_config_path()?;
                if !path.exists() {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&path, DEFAULT_CONFIG_TOML)?;
                }
                path
            }
        };
        let text = fs::read_to_string(&path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str::<Self>(text)?)
    }

    pub fn user_name(&self) -> String {
        let configured = self.user.name.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
        env::var("USER")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "operator".to_string())
    }

    pub fn storage_root(&self) -> Result<PathBuf> {
        expand_home(&self.storage.root_dir)
    }

    pub fn theme_path(&self) -> Result<PathBuf> {
        expand_home(&self.ui.theme_file)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        expand_home(&self.logging.file)
    }

    pub fn version_path(&self) -> Result<PathBuf> {
        expand_home(&self.version.file)
    }

    pub fn forge_working_dir(&self) -> Result<PathBuf> {
        expand_home(&self.forge.working_dir)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".unibos").join("config.toml"))
}

pub fn expand_home(raw_path: &str) -> Result<PathBuf> {
    if raw_path == "~" {
        return home_dir();
    }
    if let Some(rest) = raw_path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(raw_path))
}

fn home_dir() -> Result<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| {
            UnibosError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME is not set",
            ))
        })
}
