//! Column CLI commands

use anyhow::{bail, Result};
use clap::Subcommand;
use serde_json::json;

use super::app::open_store;
use super::output::Output;
use crate::domain::{Column, ColumnId};
use crate::state::BoardStore;
use crate::storage::Project;

#[derive(Subcommand)]
pub enum ColumnCommands {
    /// Add a column after the last one
    Add {
        /// Column name
        name: String,
    },

    /// Rename a column
    Rename {
        /// Column id or name
        column: String,

        /// New name
        name: String,
    },

    /// Remove a column and every task in it
    Remove {
        /// Column id or name
        column: String,
    },

    /// Put columns in the given order
    ///
    /// Columns not named keep their relative order after the named ones.
    Reorder {
        /// Column ids or names, first to last
        #[arg(required = true)]
        columns: Vec<String>,
    },
}

pub fn run(cmd: ColumnCommands, output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let mut store = open_store(&project)?;

    match cmd {
        ColumnCommands::Add { name } => add_column(output, &mut store, &name)?,
        ColumnCommands::Rename { column, name } => rename_column(output, &mut store, &column, &name)?,
        ColumnCommands::Remove { column } => remove_column(output, &mut store, &column)?,
        ColumnCommands::Reorder { columns } => reorder_columns(output, &mut store, &columns)?,
    }

    store.flush();
    Ok(())
}

/// Looks a column up by id or case-insensitive name
pub(crate) fn require_column<'a>(store: &'a BoardStore, key: &str) -> Result<&'a Column> {
    match store.resolve_column(key) {
        Some(column) => Ok(column),
        None => bail!("Column not found: {}", key),
    }
}

fn add_column(output: &Output, store: &mut BoardStore, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Column name must not be empty");
    }

    let id = store.add_column(name);

    if output.is_json() {
        output.data(&json!({ "column": store.column(&id) }));
    } else {
        output.success(&format!("Created column: {} - {}", id, name));
    }
    Ok(())
}

fn rename_column(output: &Output, store: &mut BoardStore, key: &str, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Column name must not be empty");
    }

    let column = require_column(store, key)?.clone();
    if column.name == name {
        output.success(&format!("Column {} is already named {}", column.id, name));
        return Ok(());
    }

    let patch = store.rename_column(&column.id, name);

    if output.is_json() {
        output.data(&json!({ "patch": patch.id, "column": store.column(&column.id) }));
    } else {
        output.success(&format!("Renamed column: {} -> {}", column.name, name));
    }
    Ok(())
}

fn remove_column(output: &Output, store: &mut BoardStore, key: &str) -> Result<()> {
    let column = require_column(store, key)?.clone();
    let task_count = store
        .tasks()
        .iter()
        .filter(|t| t.column_id == column.id)
        .count();

    let patch = store.remove_column(&column.id);

    if output.is_json() {
        output.data(&json!({
            "patch": patch.id,
            "removed": column.id,
            "tasks_removed": task_count,
        }));
    } else {
        output.success(&format!(
            "Removed column: {} ({} task(s) removed)",
            column.name, task_count
        ));
    }
    Ok(())
}

/// Named columns first, then the rest in their current order
fn full_order(store: &BoardStore, keys: &[String]) -> Result<Vec<ColumnId>> {
    let mut order: Vec<ColumnId> = Vec::with_capacity(store.columns().len());

    for key in keys {
        let id = require_column(store, key)?.id.clone();
        if order.contains(&id) {
            bail!("Column listed twice: {}", key);
        }
        order.push(id);
    }

    for column in store.columns() {
        if !order.contains(&column.id) {
            order.push(column.id.clone());
        }
    }

    Ok(order)
}

fn reorder_columns(output: &Output, store: &mut BoardStore, keys: &[String]) -> Result<()> {
    let order = full_order(store, keys)?;
    let patch = store.reorder_columns(&order);

    if output.is_json() {
        output.data(&json!({
            "patch": patch.map(|p| p.id),
            "columns": store.columns(),
        }));
    } else {
        let names: Vec<_> = store.columns().iter().map(|c| c.name.as_str()).collect();
        output.success(&format!("Column order: {}", names.join(", ")));
    }
    Ok(())
}
