use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{
    BranchCommand, BundleCommand, ConfigCommand, FileCommand, InfoCommand, RemoteCommand,
};
use config::Config;
use quire_core::{Backend, StorageError};

#[derive(Parser)]
#[command(name = "quire")]
#[command(version)]
#[command(
    about = "Versioned document storage on GitHub, git or a local database",
    long_about = None
)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read, write and inspect files
    File(FileCommand),

    /// Manage branches (local-git mode)
    Branch(BranchCommand),

    /// Export or import the whole store
    Bundle(BundleCommand),

    /// Check connectivity, push and pull
    Remote(RemoteCommand),

    /// Manage configuration
    Config(ConfigCommand),

    /// Describe the configured storage mode
    Info(InfoCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quire=info,quire_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        if let Some(hint) = e
            .downcast_ref::<StorageError>()
            .and_then(|e| e.kind().hint())
        {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::File(cmd)) => cmd.run(&connect(&config).await?).await?,
        Some(Commands::Branch(cmd)) => cmd.run(&connect(&config).await?).await?,
        Some(Commands::Bundle(cmd)) => cmd.run(&connect(&config).await?).await?,
        Some(Commands::Remote(cmd)) => cmd.run(&connect(&config).await?).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        Some(Commands::Info(cmd)) => cmd.run(config.mode.value)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Builds the one backend the configuration selects.
async fn connect(config: &Config) -> Result<Backend, StorageError> {
    tracing::debug!("Using {} storage", config.mode.value);
    Backend::connect(config.backend_settings()).await
}
