//! taskboard - a local-first task board that replicates through patches
//!
//! Every change to the board is an ordered batch of operations (a
//! [`Patch`]). A [`BoardStore`] applies patches to its in-memory state,
//! mirrors the result to SQLite, and exchanges patches with other processes
//! and peers through a [`Transport`].

pub mod cli;
pub mod domain;
pub mod protocol;
pub mod state;
pub mod storage;
pub mod transport;

pub use domain::{Column, ColumnId, Operation, Priority, Task, TaskId};
pub use protocol::{validate, Patch, ValidationError};
pub use state::BoardStore;
pub use transport::Transport;
