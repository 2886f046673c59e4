//! CLI for the rfetch resilient fetcher.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use rfetch_core::config;
use std::path::PathBuf;

use commands::{run_completions, run_config, run_fetch, run_search, run_summary};

/// Top-level CLI for rfetch.
#[derive(Debug, Parser)]
#[command(name = "rfetch")]
#[command(about = "rfetch: fetch pages from rate-limiting sources with retries, backoff and identity rotation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options shared by the commands that run a fetch session.
#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
    /// Override the configured maximum attempts per item.
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,
    /// Write each fetched body into this directory.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
    /// Skip the randomized pause between items.
    #[arg(long)]
    pub no_pacing: bool,
    /// Override the per-request timeout.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch one or more URLs, one logical operation per URL.
    Fetch {
        /// HTTP/HTTPS URLs to fetch.
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Query the configured search feed once per keyword.
    Search {
        /// Keywords (quote multi-word phrases).
        #[arg(required = true)]
        keywords: Vec<String>,
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Summarize a session log written by a previous run.
    Summary {
        /// Path to a `*_retry_log.json` file.
        path: PathBuf,
    },

    /// Show the config file location and effective configuration.
    Config,

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Fetch { urls, session } => run_fetch(&load_config()?, &urls, &session).await,
            CliCommand::Search { keywords, session } => {
                run_search(&load_config()?, &keywords, &session).await
            }
            CliCommand::Summary { path } => run_summary(&path),
            CliCommand::Config => run_config(&load_config()?),
            CliCommand::Completions { shell } => run_completions(shell),
        }
    }
}

fn load_config() -> Result<config::RfetchConfig> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests;
