//! Board-wide commands: the derived view and the event loop

use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::json;

use super::app::open_store;
use super::output::Output;
use crate::domain::{Lane, Task};
use crate::protocol::Patch;
use crate::state::BoardStore;
use crate::storage::Project;

/// How long one loop turn waits for inbound patches
const TICK: Duration = Duration::from_millis(250);

pub(crate) fn task_line(task: &Task) -> String {
    let mut line = format!("[{}] {}  {}  ({})", task.index, task.id, task.title, task.priority);
    if !task.tags.is_empty() {
        let tags: Vec<_> = task.tags.iter().map(|t| format!("#{}", t)).collect();
        line.push_str("  ");
        line.push_str(&tags.join(" "));
    }
    line
}

fn lane_json(lane: &Lane<'_>) -> serde_json::Value {
    json!({
        "id": lane.column.id,
        "name": lane.column.name,
        "index": lane.column.index,
        "tasks": lane.tasks,
    })
}

/// Prints every column in rank order with its ranked tasks
pub fn show(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let store = open_store(&project)?;
    print_board(output, &store);
    Ok(())
}

fn print_board(output: &Output, store: &BoardStore) {
    let lanes = store.lanes();
    let orphaned = store.state().orphaned_tasks();

    if output.is_json() {
        output.data(&json!({
            "columns": lanes.iter().map(lane_json).collect::<Vec<_>>(),
            "orphaned": orphaned,
        }));
        return;
    }

    for (n, lane) in lanes.iter().enumerate() {
        if n > 0 {
            output.blank();
        }
        output.row(&[&format!(
            "{} ({}) - {} task(s)",
            lane.column.name,
            lane.column.id,
            lane.tasks.len()
        )]);
        for task in &lane.tasks {
            output.row(&["", &task_line(task)]);
        }
    }

    if !orphaned.is_empty() {
        output.blank();
        output.row(&["Tasks in missing columns:"]);
        for task in orphaned {
            output.row(&["", &format!("{} -> {}", task_line(task), task.column_id)]);
        }
    }
}

fn patch_line(patch: &Patch) -> String {
    format!(
        "{}  {}  {}",
        patch.id,
        patch.author.as_deref().unwrap_or("-"),
        patch.summary()
    )
}

/// Runs the event loop: drain channels, apply, report
pub fn watch(output: &Output, seconds: Option<u64>) -> Result<()> {
    let project = Project::open_current()?;
    let mut store = open_store(&project)?;

    let kinds = store.transport().channel_kinds();
    if kinds.is_empty() {
        output.warn("No channels configured; nothing will arrive");
    } else if !output.is_json() {
        output.success(&format!("Watching {} (Ctrl-C to stop)", kinds.join(", ")));
    }

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));

    loop {
        let tick = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    break;
                }
                left.min(TICK)
            }
            None => TICK,
        };

        for patch in store.sync_wait(tick) {
            if output.is_json() {
                output.data(&patch);
            } else {
                output.row(&[&patch_line(&patch)]);
            }
        }
    }

    store.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Operation, Priority, TaskId};

    #[test]
    fn task_line_shows_rank_priority_and_tags() {
        let mut task = Task::new("t1", "Ship it", "c1", 3, 1);
        task.priority = Priority::High;
        task.tags = vec!["release".into(), "ui".into()];

        assert_eq!(task_line(&task), "[3] t1  Ship it  (high)  #release #ui");
    }

    #[test]
    fn patch_line_without_author() {
        let patch = Patch::new("p1", 1, [Operation::RemoveTask { id: TaskId::new("t1") }]);
        assert_eq!(patch_line(&patch), "p1  -  removeTask");
    }
}
