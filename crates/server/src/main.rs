//! Waypost answering service
//!
//! Main entry point for the waypost binary.
//! Serves retrieval-grounded answers for the travel platform's help surface.

mod auth;
mod bootstrap;
mod commands;
mod error;
mod limiter;
mod metrics;
mod routes;
mod state;

use clap::{Parser, Subcommand};
use commands::{BuildIndexCommand, ServeCommand};
use std::path::PathBuf;
use waypost_core::{config::AppConfig, logging, AppResult};

/// Waypost answering service - retrieval-grounded answers for travelers
#[derive(Parser, Debug)]
#[command(name = "waypost")]
#[command(about = "Retrieval-grounded answering service for the travel platform", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "WAYPOST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the answering service (default)
    Serve(ServeCommand),

    /// Build the retrieval index without starting the server
    BuildIndex(BuildIndexCommand),
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve(ServeCommand::default())
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Bare `waypost` runs the server
    let command = cli.command.unwrap_or_default();

    // Load base configuration from file and environment
    let config = AppConfig::load(cli.config.as_deref())?;

    // Apply CLI overrides
    let config = config.with_overrides(None, cli.log_level, cli.verbose, cli.no_color);

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    // Log startup
    tracing::info!("Waypost answering service starting");
    tracing::debug!("Bind address: {}", config.bind);
    tracing::debug!(
        "Model: {} (enabled: {})",
        config.model.name,
        config.model.enabled
    );
    tracing::debug!("Data dir: {:?}", config.data_dir);

    // Emit command.start span
    let command_name = match &command {
        Commands::Serve(_) => "serve",
        Commands::BuildIndex(_) => "build-index",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match command {
        Commands::Serve(cmd) => cmd.execute(&config).await,
        Commands::BuildIndex(cmd) => cmd.execute(&config).await,
    };

    // Log completion
    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
