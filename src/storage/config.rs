//! Configuration handling for the board
//!
//! Configuration is stored in `.board/config.toml` (project) and
//! `~/.config/taskboard/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::writer::PersistQueue;

/// Name of the per-project directory
pub const BOARD_DIR: &str = ".board";

/// Environment variable overriding `sync.remote_url`
pub const REMOTE_URL_ENV: &str = "BOARD_WS_URL";

/// Environment variable overriding the patch author
pub const AUTHOR_ENV: &str = "BOARD_AUTHOR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Patch dissemination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Channel name shared by every process on this device
    pub channel: String,

    /// Enable the intra-device channel
    pub local: bool,

    /// WebSocket endpoint of the remote peer (`ws://…`)
    pub remote_url: Option<String>,

    /// Ignore patches whose id was already applied in this session
    pub dedupe_patches: bool,

    /// Debounce for the journal watcher in milliseconds
    pub journal_debounce_ms: u64,

    /// Journal size at which the next append truncates it
    pub journal_max_bytes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: "taskmanager".to_string(),
            local: true,
            remote_url: None,
            dedupe_patches: false,
            journal_debounce_ms: 50,
            journal_max_bytes: 1024 * 1024,
        }
    }
}

impl SyncConfig {
    /// Remote endpoint from the environment, then from config
    pub fn effective_remote_url(&self) -> Option<String> {
        std::env::var(REMOTE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.remote_url.clone())
            .filter(|url| !url.trim().is_empty())
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Writes that may wait for the persistence worker before new ones drop
    pub write_queue: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_queue: PersistQueue::DEFAULT_CAPACITY,
        }
    }
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Author label stamped on local patches
    pub author: Option<String>,

    /// Columns created when the board is empty on first open
    pub seed_columns: Vec<String>,

    pub sync: SyncConfig,

    pub storage: StorageConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            author: None,
            seed_columns: vec![
                "Todo".to_string(),
                "In Progress".to_string(),
                "Done".to_string(),
            ],
            sync: SyncConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Gets the effective author from config, environment, or defaults
    pub fn effective_author(&self) -> Option<String> {
        self.author
            .clone()
            .or_else(|| std::env::var(AUTHOR_ENV).ok())
            .or_else(|| std::env::var("USER").ok())
            .filter(|a| !a.trim().is_empty())
    }

    /// Checks values serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.channel.trim().is_empty() {
            return Err(ConfigError::Invalid("sync.channel must not be empty".into()));
        }
        if self
            .sync
            .channel
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        {
            return Err(ConfigError::Invalid(format!(
                "sync.channel '{}' may only contain letters, digits, '-' and '_'",
                self.sync.channel
            )));
        }
        if self.sync.journal_max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "sync.journal_max_bytes must be at least 1".into(),
            ));
        }
        if self.storage.write_queue == 0 {
            return Err(ConfigError::Invalid(
                "storage.write_queue must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project_root = Self::find_project_root();
        let project = match &project_root {
            Some(root) => Self::load_project_config(root)?,
            None => ProjectConfig::default(),
        };

        Ok(Self {
            project,
            global,
            project_root,
        })
    }

    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "taskboard", "taskboard")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads project configuration from a specific root
    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(BOARD_DIR).join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")?;

        config
            .validate()
            .with_context(|| format!("Invalid project config: {}", config_path.display()))?;

        Ok(config)
    }

    /// Finds the project root by looking for a `.board/` directory
    pub fn find_project_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_root_from(&current)
    }

    /// Walks up from `start` looking for a `.board/` directory
    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(BOARD_DIR).is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns the project root, or an error if not in a project
    pub fn require_project_root(&self) -> Result<&Path> {
        self.project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in a board project. Run 'board init' first."))
    }
}
