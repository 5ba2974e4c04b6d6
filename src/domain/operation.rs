//! Board operations
//!
//! One tagged state transition. The discriminator is the `t` field on the
//! wire, e.g. `{"t": "moveTask", "id": "t1", "toColumnId": "c2", "toIndex": 0}`.

use serde::{Deserialize, Serialize};

use super::id::{ColumnId, TaskId};
use super::task::{Column, Task};

/// A single state transition inside a patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum Operation {
    AddColumn {
        column: Column,
    },
    RenameColumn {
        id: ColumnId,
        name: String,
    },
    RemoveColumn {
        id: ColumnId,
    },
    AddTask {
        task: Task,
    },
    /// Full replacement of the task with the same id
    EditTask {
        task: Task,
    },
    RemoveTask {
        id: TaskId,
    },
    #[serde(rename_all = "camelCase")]
    MoveTask {
        id: TaskId,
        to_column_id: ColumnId,
        to_index: i64,
    },
    ReindexColumn {
        id: ColumnId,
        index: i64,
    },
}

impl Operation {
    /// All discriminators this build understands
    pub const KINDS: [&'static str; 8] = [
        "addColumn",
        "renameColumn",
        "removeColumn",
        "addTask",
        "editTask",
        "removeTask",
        "moveTask",
        "reindexColumn",
    ];

    /// Returns the wire discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::AddColumn { .. } => "addColumn",
            Operation::RenameColumn { .. } => "renameColumn",
            Operation::RemoveColumn { .. } => "removeColumn",
            Operation::AddTask { .. } => "addTask",
            Operation::EditTask { .. } => "editTask",
            Operation::RemoveTask { .. } => "removeTask",
            Operation::MoveTask { .. } => "moveTask",
            Operation::ReindexColumn { .. } => "reindexColumn",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn move_task_wire_shape() {
        let op = Operation::MoveTask {
            id: TaskId::new("t1"),
            to_column_id: ColumnId::new("c1"),
            to_index: 5,
        };

        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"t": "moveTask", "id": "t1", "toColumnId": "c1", "toIndex": 5})
        );
    }

    #[test]
    fn parses_add_column() {
        let op: Operation = serde_json::from_value(json!({
            "t": "addColumn",
            "column": {"id": "c1", "name": "Todo", "index": 0}
        }))
        .unwrap();

        assert_eq!(
            op,
            Operation::AddColumn {
                column: Column::new("c1", "Todo", 0)
            }
        );
    }

    #[test]
    fn extra_fields_do_not_block_parsing() {
        let op: Operation = serde_json::from_value(json!({
            "t": "removeTask",
            "id": "t9",
            "origin": "tab-2"
        }))
        .unwrap();

        assert_eq!(op.kind(), "removeTask");
    }

    #[test]
    fn kinds_match_discriminators() {
        let op = Operation::ReindexColumn {
            id: ColumnId::new("c1"),
            index: 2,
        };
        let value = serde_json::to_value(&op).unwrap();
        assert!(Operation::KINDS.contains(&value["t"].as_str().unwrap()));
        assert_eq!(value["t"], op.kind());
    }
}
