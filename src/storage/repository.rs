//! Persistence gateway
//!
//! The board keeps its authoritative state in memory and mirrors it to a
//! [`BoardRepository`]. The repository is read once at startup and written
//! after every mutation.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::domain::{Column, ColumnId, Task, TaskId};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode stored {what}: {message}")]
    Decode { what: &'static str, message: String },

    #[error("Storage schema version {found} is newer than supported version {supported}")]
    NewerSchema { found: i32, supported: i32 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Columns and tasks as loaded from storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Ordered by `index`
    pub columns: Vec<Column>,

    /// Ordered by `updated_at`, newest first
    pub tasks: Vec<Task>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.tasks.is_empty()
    }
}

/// Keyed store for the two board collections
pub trait BoardRepository: Send {
    /// Reads everything
    fn load(&self) -> Result<Snapshot, StorageError>;

    /// Upserts every given column by id
    fn save_columns(&self, columns: &[Column]) -> Result<(), StorageError>;

    /// Upserts every given task by id
    fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError>;

    fn delete_task(&self, id: &TaskId) -> Result<(), StorageError>;

    /// Removes the column and every task referencing it, atomically
    fn delete_column(&self, id: &ColumnId) -> Result<(), StorageError>;
}

impl<R: BoardRepository + ?Sized> BoardRepository for Box<R> {
    fn load(&self) -> Result<Snapshot, StorageError> {
        (**self).load()
    }

    fn save_columns(&self, columns: &[Column]) -> Result<(), StorageError> {
        (**self).save_columns(columns)
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        (**self).save_tasks(tasks)
    }

    fn delete_task(&self, id: &TaskId) -> Result<(), StorageError> {
        (**self).delete_task(id)
    }

    fn delete_column(&self, id: &ColumnId) -> Result<(), StorageError> {
        (**self).delete_column(id)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    columns: Vec<Column>,
    tasks: Vec<Task>,
    fail_writes: bool,
    writes: usize,
}

/// Shared in-memory repository
///
/// Clones share the same data, so a test can hand one clone to a store and
/// inspect what was persisted through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-filled with the given collections
    pub fn with_data(columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        {
            let mut inner = repo.lock();
            inner.columns = columns;
            inner.tasks = tasks;
        }
        repo
    }

    /// Makes every subsequent write fail (loads still succeed)
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of successful write calls so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut MemoryInner),
    {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        f(&mut inner);
        inner.writes += 1;
        Ok(())
    }
}

fn upsert<T, K, F>(items: &mut Vec<T>, incoming: &[T], key: F)
where
    T: Clone,
    K: PartialEq,
    F: Fn(&T) -> &K,
{
    for item in incoming {
        match items.iter_mut().find(|existing| key(existing) == key(item)) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
    }
}

impl BoardRepository for MemoryRepository {
    fn load(&self) -> Result<Snapshot, StorageError> {
        let inner = self.lock();
        let mut columns = inner.columns.clone();
        let mut tasks = inner.tasks.clone();
        columns.sort_by_key(|c| c.index);
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(Snapshot { columns, tasks })
    }

    fn save_columns(&self, columns: &[Column]) -> Result<(), StorageError> {
        self.write(|inner| upsert(&mut inner.columns, columns, |c| &c.id))
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        self.write(|inner| upsert(&mut inner.tasks, tasks, |t| &t.id))
    }

    fn delete_task(&self, id: &TaskId) -> Result<(), StorageError> {
        self.write(|inner| inner.tasks.retain(|t| &t.id != id))
    }

    fn delete_column(&self, id: &ColumnId) -> Result<(), StorageError> {
        self.write(|inner| {
            inner.columns.retain(|c| &c.id != id);
            inner.tasks.retain(|t| &t.column_id != id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_orders_columns_and_tasks() {
        let repo = MemoryRepository::with_data(
            vec![Column::new("b", "B", 1), Column::new("a", "A", 0)],
            vec![
                Task::new("old", "Old", "a", 0, 1),
                Task::new("new", "New", "a", 1, 9),
            ],
        );

        let snapshot = repo.load().unwrap();
        assert_eq!(snapshot.columns[0].id, "a");
        assert_eq!(snapshot.tasks[0].id, "new");
    }

    #[test]
    fn save_upserts_by_id() {
        let repo = MemoryRepository::new();
        repo.save_columns(&[Column::new("a", "A", 0)]).unwrap();
        repo.save_columns(&[Column::new("a", "Renamed", 0), Column::new("b", "B", 1)])
            .unwrap();

        let snapshot = repo.load().unwrap();
        assert_eq!(snapshot.columns.len(), 2);
        assert_eq!(snapshot.columns[0].name, "Renamed");
        assert_eq!(repo.write_count(), 2);
    }

    #[test]
    fn delete_column_removes_its_tasks() {
        let repo = MemoryRepository::with_data(
            vec![Column::new("a", "A", 0), Column::new("b", "B", 1)],
            vec![
                Task::new("t1", "One", "a", 0, 1),
                Task::new("t2", "Two", "b", 0, 1),
            ],
        );

        repo.delete_column(&ColumnId::new("a")).unwrap();

        let snapshot = repo.load().unwrap();
        assert_eq!(snapshot.columns.len(), 1);
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].id, "t2");
    }

    #[test]
    fn failing_writes_leave_data_untouched() {
        let repo = MemoryRepository::new();
        repo.fail_writes(true);

        assert!(repo.save_tasks(&[Task::new("t1", "One", "a", 0, 1)]).is_err());
        repo.fail_writes(false);
        assert!(repo.load().unwrap().is_empty());
    }
}
