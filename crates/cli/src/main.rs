//! ctxloom CLI: the main entry point.
//!
//! Commands:
//! - `assemble`: Assemble a prompt from a request file
//! - `inspect`: Show full per-layer content (debug callers only)
//! - `budget`: Print the active budget profile
//! - `config`: Show, validate, or locate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ctxloom_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "ctxloom",
    about = "ctxloom: layered prompt assembly for writing assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.ctxloom/config.toml)
    #[arg(short, long, global = true, env = "CTXLOOM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a prompt from an AssembleRequest JSON file
    Assemble {
        /// Request JSON file
        request: PathBuf,

        /// Static layer content JSON file
        #[arg(short, long)]
        layers: Option<PathBuf>,
    },

    /// Inspect per-layer content from an InspectRequest JSON file
    Inspect {
        /// Request JSON file
        request: PathBuf,

        /// Static layer content JSON file
        #[arg(short, long)]
        layers: Option<PathBuf>,
    },

    /// Print the active budget profile
    Budget,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the default configuration path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Config {
        action: ConfigAction::Path,
    } = cli.command
    {
        return commands::config_cmd::path();
    }

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);
    match cli.config.as_deref() {
        Some(path) => tracing::debug!(path = %path.display(), "Loaded config"),
        None => tracing::debug!(dir = %AppConfig::config_dir().display(), "Loaded default config"),
    }

    match cli.command {
        Commands::Assemble { request, layers } => {
            commands::assemble::run(&config, &request, layers.as_deref()).await?
        }
        Commands::Inspect { request, layers } => {
            commands::assemble::inspect(&config, &request, layers.as_deref()).await?
        }
        Commands::Budget => commands::budget::run(&config).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config)?,
            ConfigAction::Validate => commands::config_cmd::validate(&config)?,
            ConfigAction::Path => commands::config_cmd::path()?,
        },
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // stdout carries the JSON envelope; logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
