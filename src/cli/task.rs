//! Task CLI commands

use anyhow::{bail, Result};
use clap::Subcommand;
use serde_json::json;

use super::app::open_store;
use super::board::task_line;
use super::column::require_column;
use super::output::Output;
use crate::domain::{parse_tags, Priority, Task, TaskId, TaskInput};
use crate::state::BoardStore;
use crate::storage::Project;

/// Shortest accepted task title, in characters
const MIN_TITLE_CHARS: usize = 2;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task at the bottom of a column
    ///
    /// Examples:
    ///   board task add Todo "Fix typo"
    ///   board task add c-1a2b3c4d5e6f "Build API" --priority high --tags api,backend
    Add {
        /// Column id or name
        column: String,

        /// Task title
        title: String,

        /// Longer description
        #[arg(long, short)]
        description: Option<String>,

        /// low, medium or high (default: medium)
        #[arg(long, short)]
        priority: Option<Priority>,

        /// Comma-separated tags
        #[arg(long, short)]
        tags: Option<String>,
    },

    /// Change fields of a task
    Edit {
        /// Task ID
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short)]
        description: Option<String>,

        #[arg(long, short)]
        priority: Option<Priority>,

        /// Comma-separated tags (replaces the current ones)
        #[arg(long, short)]
        tags: Option<String>,
    },

    /// Move a task to a column and rank
    Move {
        /// Task ID
        id: String,

        /// Target column id or name
        column: String,

        /// Target rank within the column
        index: i64,
    },

    /// Remove a task
    Remove {
        /// Task ID
        id: String,
    },

    /// Show task details
    Show {
        /// Task ID
        id: String,
    },
}

pub fn run(cmd: TaskCommands, output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let mut store = open_store(&project)?;

    match cmd {
        TaskCommands::Add {
            column,
            title,
            description,
            priority,
            tags,
        } => {
            let mut input = TaskInput::new(check_title(&title)?);
            input.description = description;
            input.priority = priority;
            input.tags = tags.as_deref().map(parse_tags).unwrap_or_default();
            add_task(output, &mut store, &column, input)?
        }
        TaskCommands::Edit {
            id,
            title,
            description,
            priority,
            tags,
        } => {
            let changes = TaskChanges {
                title: title.as_deref().map(check_title).transpose()?,
                description,
                priority,
                tags: tags.as_deref().map(parse_tags),
            };
            edit_task(output, &mut store, &id, changes)?
        }
        TaskCommands::Move { id, column, index } => {
            move_task(output, &mut store, &id, &column, index)?
        }
        TaskCommands::Remove { id } => remove_task(output, &mut store, &id)?,
        TaskCommands::Show { id } => show_task(output, &store, &id)?,
    }

    store.flush();
    Ok(())
}

/// Trims a title and enforces the minimum length
fn check_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.chars().count() < MIN_TITLE_CHARS {
        bail!(
            "Task title must be at least {} characters",
            MIN_TITLE_CHARS
        );
    }
    Ok(title.to_string())
}

fn require_task(store: &BoardStore, id: &str) -> Result<Task> {
    let id: TaskId = id.parse()?;
    match store.task(&id) {
        Some(task) => Ok(task.clone()),
        None => bail!("Task not found: {}", id),
    }
}

fn add_task(output: &Output, store: &mut BoardStore, column: &str, input: TaskInput) -> Result<()> {
    let column = require_column(store, column)?.clone();
    let id = store.add_task(&column.id, input);

    if output.is_json() {
        output.data(&json!({ "task": store.task(&id) }));
    } else if let Some(task) = store.task(&id) {
        output.success(&format!("Created task: {} - {} in {}", task.id, task.title, column.name));
    }
    Ok(())
}

/// Fields a `task edit` may replace
#[derive(Debug, Default)]
struct TaskChanges {
    title: Option<String>,
    description: Option<String>,
    priority: Option<Priority>,
    tags: Option<Vec<String>>,
}

impl TaskChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
    }

    fn apply_to(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(tags) = self.tags {
            task.tags = tags;
        }
    }
}

fn edit_task(output: &Output, store: &mut BoardStore, id: &str, changes: TaskChanges) -> Result<()> {
    if changes.is_empty() {
        bail!("Nothing to change: pass --title, --description, --priority or --tags");
    }

    let mut task = require_task(store, id)?;
    changes.apply_to(&mut task);
    let patch = store.edit_task(task);

    if output.is_json() {
        output.data(&json!({ "patch": patch.id, "task": store.task(&TaskId::new(id.trim())) }));
    } else {
        output.success(&format!("Updated task: {}", id.trim()));
    }
    Ok(())
}

fn move_task(output: &Output, store: &mut BoardStore, id: &str, column: &str, index: i64) -> Result<()> {
    let task = require_task(store, id)?;
    let column = require_column(store, column)?.clone();

    let patch = store.move_task(&task.id, &column.id, index);

    if output.is_json() {
        output.data(&json!({ "patch": patch.id, "task": store.task(&task.id) }));
    } else {
        output.success(&format!(
            "Moved task: {} -> {} at {}",
            task.id, column.name, index
        ));
    }
    Ok(())
}

fn remove_task(output: &Output, store: &mut BoardStore, id: &str) -> Result<()> {
    let task = require_task(store, id)?;
    let patch = store.remove_task(&task.id);

    if output.is_json() {
        output.data(&json!({ "patch": patch.id, "removed": task.id }));
    } else {
        output.success(&format!("Removed task: {} - {}", task.id, task.title));
    }
    Ok(())
}

fn show_task(output: &Output, store: &BoardStore, id: &str) -> Result<()> {
    let task = require_task(store, id)?;

    if output.is_json() {
        output.data(&task);
        return Ok(());
    }

    let column = store
        .column(&task.column_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("{} (missing)", task.column_id));

    output.row(&[&task_line(&task)]);
    output.row(&["Column:", &column]);
    output.row(&["Priority:", task.priority.as_str()]);
    if !task.tags.is_empty() {
        output.row(&["Tags:", &task.tags.join(", ")]);
    }
    output.row(&["Created:", &format_time(task.created_at)]);
    output.row(&["Updated:", &format_time(task.updated_at)]);
    if !task.description.is_empty() {
        output.blank();
        output.row(&[&task.description]);
    }
    Ok(())
}

fn format_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}
