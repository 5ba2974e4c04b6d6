//! # Storage Layer
//!
//! Durable copy of the board plus project configuration.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Columns and tasks | SQLite (WAL) | `.board/board.db` |
//! | Channel journal | JSONL (one patch per line) | `.board/channels/{channel}.jsonl` |
//! | Config | TOML | `.board/config.toml` |
//!
//! ## Write Path
//!
//! The board never waits for storage. Mutations are handed to a
//! [`PersistQueue`], whose worker thread owns the [`BoardRepository`] and
//! applies writes in order. Failures are logged and not retried.
//!
//! ## Project Structure
//!
//! ```text
//! .board/
//! ├── board.db              # Columns and tasks
//! ├── channels/
//! │   └── taskmanager.jsonl # Intra-device patch journal
//! ├── config.toml           # Project configuration
//! └── .gitignore            # Ignores database and journals
//! ```
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for a board directory
//! - [`BoardRepository`] - Keyed store for columns and tasks
//! - [`SqliteRepository`] / [`MemoryRepository`] - Its implementations
//! - [`Config`] - Project and global configuration

mod config;
mod project;
mod repository;
mod sqlite;
mod writer;

pub use config::{
    Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig, StorageConfig, SyncConfig,
    AUTHOR_ENV, BOARD_DIR, REMOTE_URL_ENV,
};
pub use project::{Project, ProjectError};
pub use repository::{BoardRepository, MemoryRepository, Snapshot, StorageError};
pub use sqlite::SqliteRepository;
pub use writer::PersistQueue;
