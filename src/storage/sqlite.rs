//! SQLite persistence
//!
//! The board lives in `.board/board.db`. Unlike a cache this database is the
//! durable copy of the board, so schema upgrades never drop tables.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use super::repository::{BoardRepository, Snapshot, StorageError};
use crate::domain::{Column, ColumnId, Priority, Task, TaskId};

/// SQLite-backed board repository
pub struct SqliteRepository {
    /// Path to the database file (`None` for in-memory databases)
    path: Option<PathBuf>,

    conn: Connection,
}

impl SqliteRepository {
    /// Schema version - bump when the schema changes
    const SCHEMA_VERSION: i32 = 1;

    /// Opens or creates the database at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        // WAL lets several board processes read while one writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let repo = Self {
            path: Some(path),
            conn,
        };
        repo.ensure_schema()?;
        Ok(repo)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let repo = Self {
            path: None,
            conn: Connection::open_in_memory()?,
        };
        repo.ensure_schema()?;
        Ok(repo)
    }

    /// Returns the database path, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Ensures the schema is up to date
    fn ensure_schema(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;

        if current > Self::SCHEMA_VERSION {
            return Err(StorageError::NewerSchema {
                found: current,
                supported: Self::SCHEMA_VERSION,
            });
        }

        if current < Self::SCHEMA_VERSION {
            self.create_schema()?;
        }

        Ok(())
    }

    fn schema_version(&self) -> Result<i32, StorageError> {
        let version: Option<i32> = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .optional()?;

        Ok(version.unwrap_or(0))
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS columns (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                idx INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                column_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                priority TEXT NOT NULL DEFAULT 'medium'
            );

            CREATE INDEX IF NOT EXISTS idx_columns_idx ON columns(idx);
            CREATE INDEX IF NOT EXISTS idx_tasks_column ON tasks(column_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_updated ON tasks(updated_at);
            ",
        )?;

        self.conn.execute_batch(&format!(
            "PRAGMA user_version = {}",
            Self::SCHEMA_VERSION
        ))?;

        Ok(())
    }

    fn load_columns(&self) -> Result<Vec<Column>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, idx FROM columns ORDER BY idx, rowid")?;

        let columns = stmt
            .query_map([], |row| {
                Ok(Column {
                    id: ColumnId::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    index: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(columns)
    }

    fn load_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, column_id, idx, created_at, updated_at, tags, priority
             FROM tasks ORDER BY updated_at DESC, rowid",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    Task {
                        id: TaskId::new(row.get::<_, String>(0)?),
                        title: row.get(1)?,
                        description: row.get(2)?,
                        column_id: ColumnId::new(row.get::<_, String>(3)?),
                        index: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                        tags: Vec::new(),
                        priority: Priority::default(),
                    },
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut task, tags, priority)| {
                task.tags = serde_json::from_str(&tags).map_err(|e| StorageError::Decode {
                    what: "task tags",
                    message: format!("{}: {}", task.id, e),
                })?;
                task.priority = priority.parse::<Priority>().map_err(|message| StorageError::Decode {
                    what: "task priority",
                    message,
                })?;
                Ok(task)
            })
            .collect()
    }
}

impl BoardRepository for SqliteRepository {
    fn load(&self) -> Result<Snapshot, StorageError> {
        Ok(Snapshot {
            columns: self.load_columns()?,
            tasks: self.load_tasks()?,
        })
    }

    fn save_columns(&self, columns: &[Column]) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO columns (id, name, idx) VALUES (?1, ?2, ?3)")?;
            for column in columns {
                stmt.execute(params![column.id.as_str(), column.name, column.index])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO tasks
                 (id, title, description, column_id, idx, created_at, updated_at, tags, priority)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for task in tasks {
                let tags = serde_json::to_string(&task.tags).map_err(|e| StorageError::Decode {
                    what: "task tags",
                    message: e.to_string(),
                })?;
                stmt.execute(params![
                    task.id.as_str(),
                    task.title,
                    task.description,
                    task.column_id.as_str(),
                    task.index,
                    task.created_at,
                    task.updated_at,
                    tags,
                    task.priority.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_task(&self, id: &TaskId) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }

    fn delete_column(&self, id: &ColumnId) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM columns WHERE id = ?1", params![id.as_str()])?;
        tx.execute("DELETE FROM tasks WHERE column_id = ?1", params![id.as_str()])?;
        tx.commit()?;
        Ok(())
    }
}
