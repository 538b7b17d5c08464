//! CLI for the MDM model download manager.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdm_core::config;
use std::path::PathBuf;

use commands::{run_active, run_cancel, run_clean, run_dir, run_download, run_list};

/// Top-level CLI for the MDM model download manager.
#[derive(Debug, Parser)]
#[command(name = "mdm")]
#[command(about = "MDM: download and install model artifacts from the catalog", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List catalog artifacts and whether they are installed.
    List,

    /// Download one or more artifacts by id. Ctrl-C cancels.
    Download {
        /// Artifact ids from the catalog.
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
        /// Print events as JSON lines instead of progress text.
        #[arg(long)]
        json: bool,
    },

    /// Show downloads in progress in a running `mdm download`.
    Active,

    /// Cancel a running download by task id.
    Cancel {
        /// Task id as shown by `mdm active`.
        task_id: String,
    },

    /// Show the models directory, or set it when PATH is given.
    Dir {
        path: Option<PathBuf>,
    },

    /// Remove leftover `.part` files from interrupted downloads.
    Clean,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::List => run_list(&cfg)?,
            CliCommand::Download { ids, json } => run_download(&cfg, &ids, json).await?,
            CliCommand::Active => run_active().await?,
            CliCommand::Cancel { task_id } => run_cancel(&task_id).await?,
            CliCommand::Dir { path } => run_dir(cfg, path)?,
            CliCommand::Clean => run_clean(&cfg).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
