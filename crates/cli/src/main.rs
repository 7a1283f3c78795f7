//! LexRAG CLI: the main entry point.
//!
//! Commands:
//! - `classify`: Show how a query is classified
//! - `retrieve`: Retrieve evidence and assemble a context window
//! - `config`  : Show, validate or initialize configuration
//! - `doctor`  : Diagnose configuration and service health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod services;

#[derive(Parser)]
#[command(
    name = "lexrag",
    about = "LexRAG — retrieval and context assembly for a legal assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.lexrag/config.toml
    #[arg(short, long, global = true, env = "LEXRAG_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a query and show the extracted entities
    Classify {
        query: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Retrieve evidence for a query and assemble the context window
    Retrieve {
        query: String,

        /// Token budget (defaults to context.default_budget)
        #[arg(short, long)]
        budget: Option<usize>,

        /// JSON file with the prior conversation
        #[arg(long)]
        history: Option<PathBuf>,

        /// Override retrieval.top_n
        #[arg(long)]
        top_n: Option<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and service health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Validate the configuration
    Validate,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Classify { query, json } => commands::classify::run(&query, json)?,
        Commands::Retrieve {
            query,
            budget,
            history,
            top_n,
            json,
        } => {
            let args = commands::retrieve::RetrieveArgs {
                query,
                budget,
                history,
                top_n,
                json,
            };
            commands::retrieve::run(config_path, args).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Init { force } => commands::config_cmd::init(config_path, force)?,
        },
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
