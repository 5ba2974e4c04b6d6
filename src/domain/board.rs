//! In-memory board state and the operation reducer
//!
//! [`BoardState`] owns the column and task collections and knows how to
//! apply one [`Operation`]. It performs no I/O: what the caller must persist
//! is reported back as an [`Effect`].
//!
//! Known limitation: moving a task rewrites only that task's `index`.
//! Siblings in the source and destination columns keep their ranks, so two
//! tasks in one column can share an index until some client renumbers them.

use std::collections::HashMap;

use super::id::{ColumnId, TaskId, Timestamp};
use super::operation::Operation;
use super::task::{Column, Task};

/// What applying one or more operations changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effect {
    /// The column collection differs from before
    pub columns_changed: bool,

    /// The task collection differs from before
    pub tasks_changed: bool,

    /// Columns removed by `removeColumn` (tasks cascade with them)
    pub removed_columns: Vec<ColumnId>,

    /// Tasks removed by `removeTask`
    pub removed_tasks: Vec<TaskId>,
}

impl Effect {
    /// Returns true if nothing changed
    pub fn is_empty(&self) -> bool {
        !self.columns_changed && !self.tasks_changed
    }

    /// Folds another effect into this one, keeping order of removals
    pub fn merge(&mut self, other: Effect) {
        self.columns_changed |= other.columns_changed;
        self.tasks_changed |= other.tasks_changed;
        self.removed_columns.extend(other.removed_columns);
        self.removed_tasks.extend(other.removed_tasks);
    }
}

/// One column with its tasks, ordered by rank
#[derive(Debug, Clone, PartialEq)]
pub struct Lane<'a> {
    pub column: &'a Column,
    pub tasks: Vec<&'a Task>,
}

/// The authoritative column and task collections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardState {
    columns: Vec<Column>,
    tasks: Vec<Task>,
}

impl BoardState {
    /// Creates a state from loaded collections; columns are ranked by index
    pub fn new(mut columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        sort_columns(&mut columns);
        Self { columns, tasks }
    }

    /// Columns ordered by `index`
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Tasks in internal order (moved tasks sit at the end)
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Rank for a task appended to `column_id`: one past the highest, or 0
    pub fn next_task_index(&self, column_id: &ColumnId) -> i64 {
        self.tasks
            .iter()
            .filter(|t| &t.column_id == column_id)
            .map(|t| t.index)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Applies one operation stamped with the patch time `ts`
    pub fn apply(&mut self, op: &Operation, ts: Timestamp) -> Effect {
        let mut effect = Effect::default();

        match op {
            Operation::AddColumn { column } => {
                self.columns.push(column.clone());
                sort_columns(&mut self.columns);
                effect.columns_changed = true;
            }

            Operation::RenameColumn { id, name } => {
                for column in self.columns.iter_mut().filter(|c| &c.id == id) {
                    column.name = name.clone();
                    effect.columns_changed = true;
                }
            }

            Operation::RemoveColumn { id } => {
                let columns_before = self.columns.len();
                self.columns.retain(|c| &c.id != id);
                effect.columns_changed = self.columns.len() != columns_before;

                // Cascade even when the column itself is unknown here
                let tasks_before = self.tasks.len();
                self.tasks.retain(|t| &t.column_id != id);
                effect.tasks_changed = self.tasks.len() != tasks_before;

                if !effect.is_empty() {
                    effect.removed_columns.push(id.clone());
                }
            }

            Operation::AddTask { task } => {
                self.tasks.push(task.clone());
                effect.tasks_changed = true;
            }

            Operation::EditTask { task } => {
                for existing in self.tasks.iter_mut().filter(|t| t.id == task.id) {
                    *existing = task.clone();
                    effect.tasks_changed = true;
                }
            }

            Operation::RemoveTask { id } => {
                let before = self.tasks.len();
                self.tasks.retain(|t| &t.id != id);
                if self.tasks.len() != before {
                    effect.tasks_changed = true;
                    effect.removed_tasks.push(id.clone());
                }
            }

            Operation::MoveTask {
                id,
                to_column_id,
                to_index,
            } => {
                if let Some(task) = self.task(id) {
                    let moved = task.moved(to_column_id.clone(), *to_index, ts);
                    self.tasks.retain(|t| &t.id != id);
                    self.tasks.push(moved);
                    effect.tasks_changed = true;
                }
            }

            Operation::ReindexColumn { id, index } => {
                for column in self.columns.iter_mut().filter(|c| &c.id == id) {
                    column.index = *index;
                    effect.columns_changed = true;
                }
                if effect.columns_changed {
                    sort_columns(&mut self.columns);
                }
            }
        }

        effect
    }

    /// Tasks grouped by `column_id`, each group ascending by `index`
    ///
    /// Every known column has an entry (possibly empty); tasks pointing at an
    /// unknown column get a group of their own.
    pub fn tasks_by_column(&self) -> HashMap<ColumnId, Vec<&Task>> {
        let mut by: HashMap<ColumnId, Vec<&Task>> = self
            .columns
            .iter()
            .map(|c| (c.id.clone(), Vec::new()))
            .collect();

        for task in &self.tasks {
            by.entry(task.column_id.clone()).or_default().push(task);
        }

        for group in by.values_mut() {
            group.sort_by_key(|t| t.index);
        }

        by
    }

    /// Columns in rank order, each with its ranked tasks
    pub fn lanes(&self) -> Vec<Lane<'_>> {
        let mut by = self.tasks_by_column();
        self.columns
            .iter()
            .map(|column| Lane {
                column,
                tasks: by.remove(&column.id).unwrap_or_default(),
            })
            .collect()
    }

    /// Tasks whose column does not exist
    pub fn orphaned_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| self.column(&t.column_id).is_none())
            .collect()
    }
}

/// Stable sort so equal ranks keep arrival order
fn sort_columns(columns: &mut [Column]) {
    columns.sort_by_key(|c| c.index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn board_with_todo() -> BoardState {
        BoardState::new(vec![Column::new("c1", "Todo", 0)], vec![])
    }

    fn add_task(state: &mut BoardState, id: &str, column: &str, index: i64) -> Effect {
        state.apply(
            &Operation::AddTask {
                task: Task::new(id, format!("Task {}", id), column, index, 1),
            },
            1,
        )
    }

    #[test]
    fn new_state_sorts_columns() {
        let state = BoardState::new(
            vec![Column::new("b", "B", 1), Column::new("a", "A", 0)],
            vec![],
        );
        let ids: Vec<_> = state.columns().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn add_column_resorts() {
        let mut state = board_with_todo();
        state.apply(
            &Operation::AddColumn {
                column: Column::new("c0", "Inbox", -1),
            },
            1,
        );

        assert_eq!(state.columns()[0].id, "c0");
        assert_eq!(state.columns()[1].id, "c1");
    }

    #[test]
    fn duplicate_add_column_keeps_both_entries() {
        let mut state = board_with_todo();
        let op = Operation::AddColumn {
            column: Column::new("c2", "Doing", 1),
        };
        state.apply(&op, 1);
        state.apply(&op, 2);

        let dupes = state.columns().iter().filter(|c| c.id == "c2").count();
        assert_eq!(dupes, 2);
    }

    #[test]
    fn rename_unknown_column_is_noop() {
        let mut state = board_with_todo();
        let effect = state.apply(
            &Operation::RenameColumn {
                id: ColumnId::new("nope"),
                name: "X".into(),
            },
            1,
        );

        assert!(effect.is_empty());
        assert_eq!(state, board_with_todo());
    }

    #[test]
    fn rename_column() {
        let mut state = board_with_todo();
        let effect = state.apply(
            &Operation::RenameColumn {
                id: ColumnId::new("c1"),
                name: "Backlog".into(),
            },
            1,
        );

        assert!(effect.columns_changed);
        assert_eq!(state.columns()[0].name, "Backlog");
    }

    #[test]
    fn remove_column_cascades_to_tasks() {
        let mut state = BoardState::new(
            vec![Column::new("c1", "Todo", 0), Column::new("c2", "Done", 1)],
            vec![],
        );
        add_task(&mut state, "t1", "c1", 0);
        add_task(&mut state, "t2", "c1", 1);
        add_task(&mut state, "t3", "c2", 0);

        let effect = state.apply(
            &Operation::RemoveColumn {
                id: ColumnId::new("c1"),
            },
            2,
        );

        assert!(effect.columns_changed);
        assert!(effect.tasks_changed);
        assert_eq!(effect.removed_columns, vec![ColumnId::new("c1")]);
        assert_eq!(state.columns().len(), 1);
        assert_eq!(state.tasks().len(), 1);
        assert_eq!(state.tasks()[0].id, "t3");
    }

    #[test]
    fn remove_unknown_column_is_noop() {
        let mut state = board_with_todo();
        let effect = state.apply(
            &Operation::RemoveColumn {
                id: ColumnId::new("ghost"),
            },
            1,
        );

        assert!(effect.is_empty());
        assert!(effect.removed_columns.is_empty());
    }

    #[test]
    fn edit_replaces_whole_task() {
        let mut state = board_with_todo();
        add_task(&mut state, "t1", "c1", 0);

        let mut edited = Task::new("t1", "Renamed", "c1", 0, 5);
        edited.tags = vec!["ui".into()];
        let effect = state.apply(&Operation::EditTask { task: edited.clone() }, 5);

        assert!(effect.tasks_changed);
        assert_eq!(state.tasks(), &[edited]);
    }

    #[test]
    fn edit_unknown_task_leaves_collection_unchanged() {
        let mut state = board_with_todo();
        add_task(&mut state, "t1", "c1", 0);
        let before = state.clone();

        let effect = state.apply(
            &Operation::EditTask {
                task: Task::new("t404", "Ghost", "c1", 0, 5),
            },
            5,
        );

        assert!(effect.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn remove_task_reports_deletion() {
        let mut state = board_with_todo();
        add_task(&mut state, "t1", "c1", 0);

        let effect = state.apply(
            &Operation::RemoveTask {
                id: TaskId::new("t1"),
            },
            2,
        );

        assert!(state.tasks().is_empty());
        assert_eq!(effect.removed_tasks, vec![TaskId::new("t1")]);

        let again = state.apply(
            &Operation::RemoveTask {
                id: TaskId::new("t1"),
            },
            3,
        );
        assert!(again.is_empty());
    }

    #[test]
    fn move_task_appends_and_leaves_siblings_alone() {
        let mut state = BoardState::new(
            vec![Column::new("c1", "Todo", 0), Column::new("c2", "Done", 1)],
            vec![],
        );
        add_task(&mut state, "t1", "c1", 0);
        add_task(&mut state, "t2", "c1", 1);
        add_task(&mut state, "t3", "c2", 0);

        state.apply(
            &Operation::MoveTask {
                id: TaskId::new("t1"),
                to_column_id: ColumnId::new("c2"),
                to_index: 0,
            },
            7,
        );

        assert_eq!(state.tasks().last().unwrap().id, "t1");
        assert_eq!(state.tasks().iter().filter(|t| t.id == "t1").count(), 1);

        let moved = state.task(&TaskId::new("t1")).unwrap();
        assert_eq!(moved.column_id, "c2");
        assert_eq!(moved.updated_at, 7);

        // t2 keeps rank 1 in c1; t3 still shares rank 0 with t1 in c2
        assert_eq!(state.task(&TaskId::new("t2")).unwrap().index, 1);
        assert_eq!(state.task(&TaskId::new("t3")).unwrap().index, 0);
    }

    #[test]
    fn move_unknown_task_is_noop() {
        let mut state = board_with_todo();
        let effect = state.apply(
            &Operation::MoveTask {
                id: TaskId::new("ghost"),
                to_column_id: ColumnId::new("c1"),
                to_index: 0,
            },
            1,
        );
        assert!(effect.is_empty());
    }

    #[test]
    fn reindex_column_resorts() {
        let mut state = BoardState::new(
            vec![Column::new("a", "A", 0), Column::new("b", "B", 1)],
            vec![],
        );
        state.apply(
            &Operation::ReindexColumn {
                id: ColumnId::new("a"),
                index: 5,
            },
            1,
        );

        assert_eq!(state.columns()[0].id, "b");
        assert_eq!(state.columns()[1].index, 5);
    }

    #[test]
    fn grouping_sorts_by_rank_and_covers_empty_columns() {
        let mut state = BoardState::new(
            vec![Column::new("c1", "Todo", 0), Column::new("c2", "Done", 1)],
            vec![],
        );
        add_task(&mut state, "t2", "c1", 3);
        add_task(&mut state, "t1", "c1", 1);
        add_task(&mut state, "tx", "gone", 0);

        let by = state.tasks_by_column();
        let c1: Vec<_> = by[&ColumnId::new("c1")].iter().map(|t| t.id.as_str()).collect();
        assert_eq!(c1, vec!["t1", "t2"]);
        assert!(by[&ColumnId::new("c2")].is_empty());
        assert_eq!(by[&ColumnId::new("gone")].len(), 1);

        let lanes = state.lanes();
        assert_eq!(lanes.len(), 2);
        assert_eq!(lanes[0].tasks.len(), 2);
        assert_eq!(state.orphaned_tasks().len(), 1);
    }

    #[test]
    fn next_task_index_is_one_past_max() {
        let mut state = board_with_todo();
        assert_eq!(state.next_task_index(&ColumnId::new("c1")), 0);

        add_task(&mut state, "t1", "c1", 4);
        add_task(&mut state, "t2", "c1", 2);
        assert_eq!(state.next_task_index(&ColumnId::new("c1")), 5);
    }

    proptest! {
        #[test]
        fn add_column_keeps_columns_sorted(indices in proptest::collection::vec(-50i64..50, 0..30)) {
            let mut state = BoardState::default();
            for (n, index) in indices.iter().enumerate() {
                state.apply(
                    &Operation::AddColumn { column: Column::new(format!("c{}", n), "Col", *index) },
                    n as i64,
                );
            }

            prop_assert_eq!(state.columns().len(), indices.len());
            prop_assert!(state.columns().windows(2).all(|w| w[0].index <= w[1].index));

            let mut expected: Vec<String> = (0..indices.len()).map(|n| format!("c{}", n)).collect();
            let mut actual: Vec<String> = state.columns().iter().map(|c| c.id.to_string()).collect();
            expected.sort();
            actual.sort();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn remove_column_leaves_no_tasks_behind(n in 0usize..20, others in 0usize..5) {
            let mut state = BoardState::new(
                vec![Column::new("c1", "Todo", 0), Column::new("c2", "Done", 1)],
                vec![],
            );
            for i in 0..n {
                add_task(&mut state, &format!("a{}", i), "c1", i as i64);
            }
            for i in 0..others {
                add_task(&mut state, &format!("b{}", i), "c2", i as i64);
            }

            state.apply(&Operation::RemoveColumn { id: ColumnId::new("c1") }, 9);

            prop_assert_eq!(state.tasks().iter().filter(|t| t.column_id == "c1").count(), 0);
            prop_assert_eq!(state.tasks().len(), others);
        }
    }
}
