//! repodoc: index a parsed repository and answer questions about it.
//!
//! ```bash
//! repodoc index analyses.json --summaries summaries.json
//! repodoc search "config loader" --top-k 3
//! repodoc ask "Where are retries configured?" --json
//! repodoc config --validate
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repodoc", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "repodoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build chunks from parser output, embed them and save the index
    Index {
        /// JSON array of file analyses
        analyses: PathBuf,
        /// JSON array of file summaries, paired to analyses by file path
        #[arg(long)]
        summaries: Option<PathBuf>,
        /// Index directory (default: `index.path` from the config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rank indexed chunks against a query
    Search {
        query: String,
        #[command(flatten)]
        opts: QueryOpts,
    },
    /// Answer a question from the indexed repository
    Ask {
        question: String,
        #[command(flatten)]
        opts: QueryOpts,
    },
    /// Show statistics for a saved index
    Stats {
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Print the effective configuration with secrets redacted
    Config {
        /// List configuration problems and exit non-zero if there are any
        #[arg(long)]
        validate: bool,
    },
}

#[derive(clap::Args)]
struct QueryOpts {
    /// Index directory (default: `index.path` from the config)
    #[arg(long)]
    index: Option<PathBuf>,
    /// Number of chunks to retrieve
    #[arg(long)]
    top_k: Option<usize>,
    /// Semantic weight in [0, 1]
    #[arg(long)]
    alpha: Option<f32>,
    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

fn init_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config = repodoc_core::bootstrap::load_config(&cli.config).await?;

    match cli.command {
        Command::Index {
            analyses,
            summaries,
            output,
        } => commands::index(&config, &analyses, summaries.as_deref(), output).await,
        Command::Search { query, opts } => commands::search(&config, &query, &opts).await,
        Command::Ask { question, opts } => commands::ask(&config, &question, &opts).await,
        Command::Stats { index } => commands::stats(&config, index),
        Command::Config { validate } => commands::show_config(&config, validate),
    }
}
