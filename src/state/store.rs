use std::collections::{HashMap, HashSet};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{
    BoardState, Column, ColumnId, Effect, IdKind, IdSource, Lane, Operation, Task, TaskId,
    TaskInput,
};
use crate::protocol::Patch;
use crate::storage::{BoardRepository, PersistQueue, ProjectConfig, StorageError};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to load board: {0}")]
    Load(#[source] StorageError),

    #[error("Failed to seed default columns: {0}")]
    Seed(#[source] StorageError),

    #[error("Failed to start persistence: {0}")]
    Persist(#[source] StorageError),
}

/// Construction-time settings for a [`BoardStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Label stamped on locally-made patches
    pub author: Option<String>,

    /// Column names created when storage is empty
    pub seed_columns: Vec<String>,

    /// Apply each patch id at most once per session
    pub dedupe_patches: bool,

    /// Capacity of the write-behind queue
    pub write_queue: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        ProjectConfig::default().into()
    }
}

impl From<ProjectConfig> for StoreOptions {
    fn from(config: ProjectConfig) -> Self {
        Self::from(&config)
    }
}

impl From<&ProjectConfig> for StoreOptions {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            author: config.effective_author(),
            seed_columns: config.seed_columns.clone(),
            dedupe_patches: config.sync.dedupe_patches,
            write_queue: config.storage.write_queue,
        }
    }
}

/// Handle returned by [`BoardStore::on_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&BoardState, &Patch)>;

/// Owner of the board state and its collaborators
pub struct BoardStore {
    state: BoardState,
    persist: PersistQueue,
    transport: Transport,
    ids: Box<dyn IdSource>,
    author: Option<String>,
    seen: Option<HashSet<String>>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl BoardStore {
    /// Loads the board from `repo`, seeding default columns if it has none
    pub fn open(
        repo: Box<dyn BoardRepository>,
        transport: Transport,
        ids: Box<dyn IdSource>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let mut snapshot = repo.load().map_err(StoreError::Load)?;

        if snapshot.columns.is_empty() && !options.seed_columns.is_empty() {
            snapshot.columns = options
                .seed_columns
                .iter()
                .enumerate()
                .map(|(n, name)| {
                    Column::new(
                        ColumnId::new(ids.next_id(IdKind::Column)),
                        name.clone(),
                        n as i64,
                    )
                })
                .collect();
            repo.save_columns(&snapshot.columns)
                .map_err(StoreError::Seed)?;
            info!(columns = snapshot.columns.len(), "seeded empty board");
        }

        debug!(
            columns = snapshot.columns.len(),
            tasks = snapshot.tasks.len(),
            "board loaded"
        );

        let persist =
            PersistQueue::spawn(repo, options.write_queue).map_err(StoreError::Persist)?;

        Ok(Self {
            state: BoardState::new(snapshot.columns, snapshot.tasks),
            persist,
            transport,
            ids,
            author: options.author,
            seen: options.dedupe_patches.then(HashSet::new),
            observers: Vec::new(),
            next_observer: 0,
        })
    }

    // =========================================================================
    // Applying patches
    // =========================================================================

    /// Applies every op of `patch` in order, persists what changed and, if
    /// `disseminate` is set, hands the patch to the transport
    ///
    /// Returns `None` when the patch was skipped as already applied.
    pub fn apply_patch(&mut self, patch: &Patch, disseminate: bool) -> Option<Effect> {
        if let Some(seen) = &mut self.seen {
            if !seen.insert(patch.id.clone()) {
                debug!(patch = %patch.id, "patch already applied; skipping");
                return None;
            }
        }

        let mut effect = Effect::default();
        for op in &patch.ops {
            match op.operation() {
                Some(operation) => effect.merge(self.state.apply(operation, patch.ts)),
                None => debug!(patch = %patch.id, op = op.kind(), "ignoring unrecognized operation"),
            }
        }

        for id in &effect.removed_columns {
            self.persist.delete_column(id.clone());
        }
        for id in &effect.removed_tasks {
            self.persist.delete_task(id.clone());
        }
        if effect.columns_changed {
            self.persist.save_columns(self.state.columns().to_vec());
        }
        if effect.tasks_changed {
            self.persist.save_tasks(self.state.tasks().to_vec());
        }

        debug!(
            patch = %patch.id,
            ops = patch.ops.len(),
            columns_changed = effect.columns_changed,
            tasks_changed = effect.tasks_changed,
            "patch applied"
        );

        if disseminate {
            self.transport.broadcast(patch);
        }

        for (_, observer) in &mut self.observers {
            observer(&self.state, patch);
        }

        Some(effect)
    }

    /// Applies every patch waiting in the transport; returns those applied
    pub fn sync(&mut self) -> Vec<Patch> {
        let inbound = self.transport.poll();
        self.apply_inbound(inbound)
    }

    /// Like [`BoardStore::sync`] but waits up to `timeout` for the first patch
    pub fn sync_wait(&mut self, timeout: Duration) -> Vec<Patch> {
        let inbound = self.transport.wait(timeout);
        self.apply_inbound(inbound)
    }

    fn apply_inbound(&mut self, inbound: Vec<Patch>) -> Vec<Patch> {
        inbound
            .into_iter()
            .filter(|patch| self.apply_patch(patch, false).is_some())
            .collect()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Builds a patch from `ops` and applies it with dissemination
    fn commit(&mut self, ops: Vec<Operation>) -> Patch {
        let mut patch = Patch::new(self.ids.next_id(IdKind::Patch), self.ids.now(), ops);
        if let Some(author) = &self.author {
            patch = patch.with_author(author.clone());
        }
        self.apply_patch(&patch, true);
        patch
    }

    /// Appends a column after the last one
    pub fn add_column(&mut self, name: impl Into<String>) -> ColumnId {
        let id = ColumnId::new(self.ids.next_id(IdKind::Column));
        let index = self
            .state
            .columns()
            .iter()
            .map(|c| c.index)
            .max()
            .map_or(0, |max| max + 1);

        self.commit(vec![Operation::AddColumn {
            column: Column::new(id.clone(), name, index),
        }]);
        id
    }

    pub fn rename_column(&mut self, id: &ColumnId, name: impl Into<String>) -> Patch {
        self.commit(vec![Operation::RenameColumn {
            id: id.clone(),
            name: name.into(),
        }])
    }

    /// Removes a column and every task in it
    pub fn remove_column(&mut self, id: &ColumnId) -> Patch {
        self.commit(vec![Operation::RemoveColumn { id: id.clone() }])
    }

    /// Assigns ranks 0..n-1 to `ids` in the given order, as one patch
    ///
    /// Returns `None` for an empty list.
    pub fn reorder_columns(&mut self, ids: &[ColumnId]) -> Option<Patch> {
        if ids.is_empty() {
            return None;
        }

        let ops = ids
            .iter()
            .enumerate()
            .map(|(n, id)| Operation::ReindexColumn {
                id: id.clone(),
                index: n as i64,
            })
            .collect();
        Some(self.commit(ops))
    }

    /// Adds a task at the bottom of `column_id`
    pub fn add_task(&mut self, column_id: &ColumnId, input: TaskInput) -> TaskId {
        let id = TaskId::new(self.ids.next_id(IdKind::Task));
        let index = self.state.next_task_index(column_id);

        let mut task = Task::new(id.clone(), input.title, column_id.clone(), index, self.ids.now());
        task.description = input.description.unwrap_or_default();
        task.tags = input.tags;
        task.priority = input.priority.unwrap_or_default();

        self.commit(vec![Operation::AddTask { task }]);
        id
    }

    /// Replaces a task wholesale; `updated_at` is refreshed
    pub fn edit_task(&mut self, mut task: Task) -> Patch {
        task.updated_at = self.ids.now().max(task.updated_at.saturating_add(1));
        self.commit(vec![Operation::EditTask { task }])
    }

    pub fn remove_task(&mut self, id: &TaskId) -> Patch {
        self.commit(vec![Operation::RemoveTask { id: id.clone() }])
    }

    /// Moves a task; sibling ranks are left as they are
    pub fn move_task(&mut self, id: &TaskId, to_column_id: &ColumnId, to_index: i64) -> Patch {
        self.commit(vec![Operation::MoveTask {
            id: id.clone(),
            to_column_id: to_column_id.clone(),
            to_index,
        }])
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn columns(&self) -> &[Column] {
        self.state.columns()
    }

    pub fn tasks(&self) -> &[Task] {
        self.state.tasks()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.state.task(id)
    }

    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.state.column(id)
    }

    /// Tasks grouped by column, each group ordered by rank
    pub fn tasks_by_column(&self) -> HashMap<ColumnId, Vec<&Task>> {
        self.state.tasks_by_column()
    }

    pub fn lanes(&self) -> Vec<Lane<'_>> {
        self.state.lanes()
    }

    /// Finds a column by exact id, then by case-insensitive name
    pub fn resolve_column(&self, key: &str) -> Option<&Column> {
        let key = key.trim();
        self.state
            .columns()
            .iter()
            .find(|c| c.id == key)
            .or_else(|| {
                self.state
                    .columns()
                    .iter()
                    .find(|c| c.name.trim().eq_ignore_ascii_case(key))
            })
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Registers a callback run after every applied patch
    pub fn on_change(&mut self, observer: impl FnMut(&BoardState, &Patch) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Waits until every queued write has been attempted
    pub fn flush(&self) -> bool {
        self.persist.flush()
    }

    /// Writes dropped because the queue was full
    pub fn dropped_writes(&self) -> u64 {
        self.persist.dropped()
    }

    /// Writes the repository rejected
    pub fn failed_writes(&self) -> u64 {
        self.persist.failed()
    }
}
