//! Main CLI application structure

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{board, column, patch_cmd, task};
use crate::domain::SystemIds;
use crate::state::{BoardStore, StoreOptions};
use crate::storage::{Config, Project};
use crate::transport::{process_origin, Transport};

/// Environment variable holding a tracing filter (e.g. `taskboard=trace`)
pub const LOG_ENV: &str = "BOARD_LOG";

#[derive(Parser)]
#[command(name = "board")]
#[command(author, version, about = "Local-first task board that replicates through patches")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new board
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Show columns and their tasks
    Show,

    /// Manage columns
    #[command(subcommand)]
    Column(column::ColumnCommands),

    /// Manage tasks
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Validate or apply raw patches
    #[command(subcommand)]
    Patch(patch_cmd::PatchCommands),

    /// Apply patches from other processes and peers as they arrive
    Watch {
        /// Stop after this many seconds (runs until interrupted otherwise)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

/// Installs the stderr subscriber; `BOARD_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "taskboard=debug"
        } else {
            "taskboard=warn"
        })
    });

    // A second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Opens the board of the current project with its configured channels
pub(crate) fn open_store(project: &Project) -> Result<BoardStore> {
    let config = &project.config().project;
    let repo = project.repository()?;
    let transport = Transport::from_config(&config.sync, &project.journal_path(), &process_origin());

    debug!(channels = ?transport.channel_kinds(), "transport ready");

    BoardStore::open(
        Box::new(repo),
        transport,
        Box::new(SystemIds::new()),
        StoreOptions::from(config),
    )
    .context("Failed to open board")
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => Config::load()
            .map(|config| OutputFormat::from(config.global.default_format))
            .unwrap_or_default(),
    };
    let output = Output::new(format);

    match cli.command {
        Commands::Init { path } => {
            debug!(path = %path, "initializing board");
            let project = Project::init(&path)?;
            let store = open_store(&project)?;
            store.flush();

            if output.is_json() {
                output.data(&serde_json::json!({
                    "root": project.root().display().to_string(),
                    "columns": store.columns(),
                }));
            } else {
                output.success(&format!(
                    "Initialized board at {}",
                    project.root().display()
                ));
            }
        }

        Commands::Show => board::show(&output)?,
        Commands::Column(cmd) => column::run(cmd, &output)?,
        Commands::Task(cmd) => task::run(cmd, &output)?,
        Commands::Patch(cmd) => patch_cmd::run(cmd, &output)?,
        Commands::Watch { seconds } => board::watch(&output, seconds)?,
    }

    Ok(())
}
