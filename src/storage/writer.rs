//! Write-behind persistence queue
//!
//! Best-effort durability: the board hands writes to a bounded queue and
//! returns immediately. A worker thread drains the queue into the
//! repository. Failed writes are logged and not retried; when the queue is
//! full the write is dropped with a warning. Memory may therefore run ahead
//! of storage until the next successful write of the same collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::repository::{BoardRepository, StorageError};
use crate::domain::{Column, ColumnId, Task, TaskId};

/// Pending write for the worker
enum Write {
    SaveColumns(Vec<Column>),
    SaveTasks(Vec<Task>),
    DeleteTask(TaskId),
    DeleteColumn(ColumnId),
    Flush(mpsc::Sender<()>),
}

impl Write {
    fn label(&self) -> &'static str {
        match self {
            Write::SaveColumns(_) => "save columns",
            Write::SaveTasks(_) => "save tasks",
            Write::DeleteTask(_) => "delete task",
            Write::DeleteColumn(_) => "delete column",
            Write::Flush(_) => "flush",
        }
    }
}

/// Bounded queue in front of a [`BoardRepository`]
pub struct PersistQueue {
    tx: Option<SyncSender<Write>>,
    worker: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl PersistQueue {
    /// Default number of writes that may wait for the worker
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Starts the worker thread that owns `repo`
    pub fn spawn(repo: Box<dyn BoardRepository>, capacity: usize) -> Result<Self, StorageError> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let failed = Arc::new(AtomicU64::new(0));
        let worker_failed = Arc::clone(&failed);

        let worker = thread::Builder::new()
            .name("board-persist".to_string())
            .spawn(move || drain(repo, rx, worker_failed))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            dropped: Arc::new(AtomicU64::new(0)),
            failed,
        })
    }

    pub fn save_columns(&self, columns: Vec<Column>) {
        self.submit(Write::SaveColumns(columns));
    }

    pub fn save_tasks(&self, tasks: Vec<Task>) {
        self.submit(Write::SaveTasks(tasks));
    }

    pub fn delete_task(&self, id: TaskId) {
        self.submit(Write::DeleteTask(id));
    }

    pub fn delete_column(&self, id: ColumnId) {
        self.submit(Write::DeleteColumn(id));
    }

    /// Blocks until every write queued so far has been attempted
    ///
    /// Returns false if the worker is gone.
    pub fn flush(&self) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(Write::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv().is_ok()
    }

    /// Writes discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Writes the repository rejected
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn submit(&self, write: Write) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send(write) {
            Ok(()) => {}
            Err(TrySendError::Full(write)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(write = write.label(), "persistence queue full; write dropped");
            }
            Err(TrySendError::Disconnected(write)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(write = write.label(), "persistence worker stopped; write dropped");
            }
        }
    }
}

impl Drop for PersistQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish what is queued and exit
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("persistence worker panicked");
            }
        }
    }
}

fn drain(repo: Box<dyn BoardRepository>, rx: Receiver<Write>, failed: Arc<AtomicU64>) {
    for write in rx {
        let label = write.label();
        let result = match write {
            Write::SaveColumns(columns) => repo.save_columns(&columns),
            Write::SaveTasks(tasks) => repo.save_tasks(&tasks),
            Write::DeleteTask(id) => repo.delete_task(&id),
            Write::DeleteColumn(id) => repo.delete_column(&id),
            Write::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
        };

        match result {
            Ok(()) => debug!(write = label, "persisted"),
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                warn!(write = label, error = %e, "persistence write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::{MemoryRepository, Snapshot};
    use std::sync::Mutex;

    #[test]
    fn writes_reach_the_repository() {
        let repo = MemoryRepository::new();
        let queue = PersistQueue::spawn(Box::new(repo.clone()), 8).unwrap();

        queue.save_columns(vec![Column::new("c1", "Todo", 0)]);
        queue.save_tasks(vec![Task::new("t1", "One", "c1", 0, 1)]);
        assert!(queue.flush());

        let snapshot = repo.load().unwrap();
        assert_eq!(snapshot.columns.len(), 1);
        assert_eq!(snapshot.tasks.len(), 1);
    }

    #[test]
    fn writes_apply_in_submission_order() {
        let repo = MemoryRepository::new();
        let queue = PersistQueue::spawn(Box::new(repo.clone()), 8).unwrap();

        queue.save_tasks(vec![Task::new("t1", "One", "c1", 0, 1)]);
        queue.delete_column(ColumnId::new("c1"));
        queue.save_columns(vec![Column::new("c2", "Done", 1)]);
        queue.flush();

        let snapshot = repo.load().unwrap();
        assert!(snapshot.tasks.is_empty());
        assert_eq!(snapshot.columns[0].id, "c2");
    }

    #[test]
    fn failures_are_counted_not_retried() {
        let repo = MemoryRepository::new();
        repo.fail_writes(true);
        let queue = PersistQueue::spawn(Box::new(repo.clone()), 8).unwrap();

        queue.delete_task(TaskId::new("t1"));
        queue.save_columns(vec![Column::new("c1", "Todo", 0)]);
        queue.flush();

        assert_eq!(queue.failed(), 2);
        assert_eq!(repo.write_count(), 0);
    }

    #[test]
    fn drop_drains_pending_writes() {
        let repo = MemoryRepository::new();
        {
            let queue = PersistQueue::spawn(Box::new(repo.clone()), 8).unwrap();
            queue.save_columns(vec![Column::new("c1", "Todo", 0)]);
        }
        assert_eq!(repo.load().unwrap().columns.len(), 1);
    }

    /// Repository whose writes wait on a shared gate
    struct GatedRepository {
        gate: Arc<Mutex<()>>,
        inner: MemoryRepository,
    }

    impl BoardRepository for GatedRepository {
        fn load(&self) -> Result<Snapshot, StorageError> {
            self.inner.load()
        }

        fn save_columns(&self, columns: &[Column]) -> Result<(), StorageError> {
            let _open = self.gate.lock().unwrap_or_else(|p| p.into_inner());
            self.inner.save_columns(columns)
        }

        fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
            self.inner.save_tasks(tasks)
        }

        fn delete_task(&self, id: &TaskId) -> Result<(), StorageError> {
            self.inner.delete_task(id)
        }

        fn delete_column(&self, id: &ColumnId) -> Result<(), StorageError> {
            self.inner.delete_column(id)
        }
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let gate = Arc::new(Mutex::new(()));
        let closed = gate.lock().unwrap();

        let repo = GatedRepository {
            gate: Arc::clone(&gate),
            inner: MemoryRepository::new(),
        };
        let queue = PersistQueue::spawn(Box::new(repo), 1).unwrap();

        for n in 0..10 {
            queue.save_columns(vec![Column::new(format!("c{}", n), "Col", n)]);
        }

        // At most one write is held by the worker and one sits in the queue
        assert!(queue.dropped() >= 8);

        drop(closed);
        assert!(queue.flush());
    }
}
