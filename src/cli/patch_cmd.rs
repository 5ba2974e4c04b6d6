//! Patch CLI commands
//!
//! Feed a raw patch (as another peer would send it) through the validator,
//! and optionally into the board as an inbound patch.

use std::fs;
use std::io::Read;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;

use super::app::open_store;
use super::output::Output;
use crate::protocol::{validate, Operation, Patch};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum PatchCommands {
    /// Check that a payload is an acceptable patch
    Validate {
        /// File holding the JSON patch, or '-' for stdin
        source: String,
    },

    /// Apply a patch to the board as if it arrived from a peer
    Apply {
        /// File holding the JSON patch, or '-' for stdin
        source: String,

        /// Also send the patch on the configured channels
        #[arg(long)]
        broadcast: bool,
    },
}

pub fn run(cmd: PatchCommands, output: &Output) -> Result<()> {
    match cmd {
        PatchCommands::Validate { source } => validate_patch(output, &source),
        PatchCommands::Apply { source, broadcast } => apply_patch(output, &source, broadcast),
    }
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read patch from stdin")?;
        Ok(raw)
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read patch file: {}", source))
    }
}

fn load_patch(source: &str) -> Result<Patch> {
    let raw = read_source(source)?;
    validate(raw).context("Invalid patch")
}

fn validate_patch(output: &Output, source: &str) -> Result<()> {
    let patch = load_patch(source)?;
    let unknown: Vec<_> = patch
        .ops
        .iter()
        .filter(|op| op.operation().is_none())
        .map(|op| {
            if Operation::KINDS.contains(&op.kind()) {
                format!("{} (malformed)", op.kind())
            } else {
                op.kind().to_string()
            }
        })
        .collect();

    if output.is_json() {
        output.data(&json!({
            "valid": true,
            "id": patch.id,
            "ops": patch.ops.len(),
            "ignored": unknown,
        }));
        return Ok(());
    }

    output.success(&format!(
        "Valid patch {}: {} op(s) ({})",
        patch.id,
        patch.ops.len(),
        patch.summary()
    ));
    if !unknown.is_empty() {
        output.warn(&format!(
            "These ops will be ignored when applied: {}",
            unknown.join(", ")
        ));
    }
    Ok(())
}

fn apply_patch(output: &Output, source: &str, broadcast: bool) -> Result<()> {
    let patch = load_patch(source)?;

    let project = Project::open_current()?;
    let mut store = open_store(&project)?;
    let effect = store.apply_patch(&patch, broadcast);
    store.flush();

    let lost = store.dropped_writes() + store.failed_writes();
    if lost > 0 {
        output.warn(&format!("{} storage write(s) did not reach the database", lost));
    }

    if output.is_json() {
        output.data(&json!({
            "id": patch.id,
            "applied": effect.is_some(),
            "columns_changed": effect.as_ref().is_some_and(|e| e.columns_changed),
            "tasks_changed": effect.as_ref().is_some_and(|e| e.tasks_changed),
            "broadcast": broadcast,
        }));
        return Ok(());
    }

    match effect {
        Some(effect) if effect.is_empty() => {
            output.success(&format!("Applied patch {}: nothing changed", patch.id))
        }
        Some(_) => output.success(&format!("Applied patch {} ({})", patch.id, patch.summary())),
        None => output.success(&format!("Skipped patch {}: already applied", patch.id)),
    }
    Ok(())
}
