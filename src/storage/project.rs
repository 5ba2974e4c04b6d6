//! Project management
//!
//! Handles board initialization and locates the files a board owns.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::{Config, BOARD_DIR};
use super::sqlite::SqliteRepository;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a board project. Run 'board init' first.")]
    NotInProject,
}

/// A board project rooted at the directory holding `.board/`
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let board_dir = root.join(BOARD_DIR);

        if !board_dir.is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// Running it again on an existing project keeps its config and data.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let board_dir = root.join(BOARD_DIR);

        fs::create_dir_all(&board_dir).with_context(|| {
            format!("Failed to create .board directory: {}", board_dir.display())
        })?;

        let channels_dir = board_dir.join("channels");
        fs::create_dir_all(&channels_dir).with_context(|| {
            format!(
                "Failed to create channels directory: {}",
                channels_dir.display()
            )
        })?;

        let config_path = board_dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# Task board configuration

# Label stamped on patches made here (defaults to $BOARD_AUTHOR or $USER)
# author = "me"

# Columns created when the board is empty
seed_columns = ["Todo", "In Progress", "Done"]

[sync]
# Processes on this device sharing a channel name see each other's changes
channel = "taskmanager"
local = true

# Remote peer; $BOARD_WS_URL overrides this
# remote_url = "ws://127.0.0.1:9000"

# Skip patches whose id was already applied in this session
dedupe_patches = false

# The channel journal is emptied once it grows past this many bytes
journal_max_bytes = 1048576

[storage]
write_queue = 256
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = board_dir.join(".gitignore");
        if !gitignore_path.exists() {
            let gitignore = r#"# Local database (WAL files included)
board.db*

# Channel journals are per-device
channels/
"#;
            fs::write(&gitignore_path, gitignore).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .board directory path
    pub fn board_dir(&self) -> PathBuf {
        self.root.join(BOARD_DIR)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the SQLite database path
    pub fn db_path(&self) -> PathBuf {
        self.board_dir().join("board.db")
    }

    /// Returns the directory holding channel journals
    pub fn channels_dir(&self) -> PathBuf {
        self.board_dir().join("channels")
    }

    /// Returns the journal file for the configured channel
    pub fn journal_path(&self) -> PathBuf {
        self.channels_dir()
            .join(format!("{}.jsonl", self.config.project.sync.channel))
    }

    /// Opens the board database
    pub fn repository(&self) -> Result<SqliteRepository> {
        let path = self.db_path();
        SqliteRepository::open(&path)
            .with_context(|| format!("Failed to open board database: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BoardRepository;
    use tempfile::TempDir;

    #[test]
    fn init_creates_structure() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        assert!(project.board_dir().is_dir());
        assert!(project.channels_dir().is_dir());
        assert!(project.board_dir().join("config.toml").is_file());
        assert!(project.board_dir().join(".gitignore").is_file());
    }

    #[test]
    fn default_config_file_parses() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        let sync = &project.config().project.sync;
        assert_eq!(sync.channel, "taskmanager");
        assert!(sync.local);
        assert_eq!(project.config().project.seed_columns.len(), 3);
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();

        Project::init(dir.path()).unwrap();
        fs::write(
            dir.path().join(BOARD_DIR).join("config.toml"),
            "[sync]\nchannel = \"kept\"\n",
        )
        .unwrap();
        let project = Project::init(dir.path()).unwrap();

        assert_eq!(project.config().project.sync.channel, "kept");
    }

    #[test]
    fn open_non_project_fails() {
        let dir = TempDir::new().unwrap();
        let result = Project::open(dir.path());

        assert!(result.is_err());
    }

    #[test]
    fn paths_follow_channel_name() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        assert!(project.db_path().ends_with(".board/board.db"));
        assert!(project
            .journal_path()
            .ends_with(".board/channels/taskmanager.jsonl"));
    }

    #[test]
    fn repository_opens_database() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        let repo = project.repository().unwrap();
        assert!(repo.load().unwrap().is_empty());
        assert!(project.db_path().is_file());
    }
}
