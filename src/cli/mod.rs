//! # Command-Line Interface
//!
//! The `board` binary is the intent layer: each command opens the board,
//! turns the request into one store command, and prints the result.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project and view | `init`, `show`, `watch` |
//! | Column | Column lifecycle | `column add`, `column reorder` |
//! | Task | Task lifecycle | `task add`, `task move`, `task edit` |
//! | Patch | Raw replication input | `patch validate`, `patch apply` |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. `--verbose` enables debug
//! output for this crate; `BOARD_LOG` accepts any filter directive:
//! ```bash
//! BOARD_LOG=taskboard=trace board watch
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod board;
mod column;
mod output;
mod patch_cmd;
mod task;

pub use app::{run, Cli, Commands, LOG_ENV};
pub use output::{Output, OutputFormat};
