//! FieldAgent CLI: the main entry point.
//!
//! Commands:
//! - `run`:    Ask the mapping agent one question and stream the answer
//! - `tools`:  List the tools the agent can call
//! - `config`: Show, validate, or initialise configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "fieldagent",
    about = "FieldAgent, a tool-calling mapping assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the agent a question and stream the answer
    Run {
        /// The question or instruction
        #[arg(short, long)]
        message: String,

        /// Drawn shape as "lat,lng;lat,lng;..."
        #[arg(short, long)]
        coords: Option<String>,

        /// Map screenshot to make available to the agent (PNG, JPEG, GIF, WebP)
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Account plan passed in the execution context (e.g. "premium")
        #[arg(long)]
        plan: Option<String>,

        /// Print every chunk as one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// List the tools the agent can call
    Tools {
        /// Print full tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Load and validate the configuration
    Validate,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so streamed answers and --json output stay clean
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            message,
            coords,
            image,
            plan,
            json,
        } => {
            commands::run::run(commands::run::RunArgs {
                message,
                coords,
                image,
                plan,
                json,
            })
            .await?
        }
        Commands::Tools { json } => commands::tools::run(json).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
