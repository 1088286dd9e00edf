//! Connectivity and push/pull commands.

use clap::{Args, Subcommand};

use quire_core::{Backend, StorageAdapter};

use super::require_git;

#[derive(Args)]
pub struct RemoteCommand {
    #[command(subcommand)]
    pub command: RemoteSubcommand,
}

#[derive(Subcommand)]
pub enum RemoteSubcommand {
    /// Check that the storage backend is reachable
    Check,

    /// Push the current branch (local-git mode)
    Push,

    /// Pull the current branch, fast-forward only (local-git mode)
    Pull,
}

impl RemoteCommand {
    pub async fn run(&self, backend: &Backend) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            RemoteSubcommand::Check => {
                print!("{} storage: ", backend.mode());
                if backend.check_connection().await {
                    println!("✓ reachable");
                    Ok(())
                } else {
                    println!("✗ unreachable");
                    Err("storage backend is unreachable".into())
                }
            }

            RemoteSubcommand::Push => {
                let git = require_git(backend, "remote push")?;
                git.push().await?;
                println!("Pushed {}", git.current_branch().await?);
                Ok(())
            }

            RemoteSubcommand::Pull => {
                let git = require_git(backend, "remote pull")?;
                let outcome = git.pull().await?;
                println!("Pull: {}", outcome);
                Ok(())
            }
        }
    }
}
