//! Domain models for the task board
//!
//! Contains the board data model and the operation reducer, without any
//! I/O concerns.

mod board;
mod id;
mod operation;
mod task;

pub use board::{BoardState, Effect, Lane};
pub use id::{
    current_timestamp, ColumnId, IdError, IdKind, IdSource, SequentialIds, SystemIds, TaskId,
    Timestamp,
};
pub use operation::Operation;
pub use task::{parse_tags, Column, Priority, Task, TaskInput};
