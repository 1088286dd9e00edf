use clap::{Args, Subcommand};

use quire_core::Backend;

use super::{require_git, OutputFormat};

#[derive(Args)]
pub struct BranchCommand {
    #[command(subcommand)]
    pub command: BranchSubcommand,
}

#[derive(Subcommand)]
pub enum BranchSubcommand {
    /// List branches
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a branch at the current commit
    Create {
        name: String,

        /// Switch to the new branch
        #[arg(long)]
        checkout: bool,
    },

    /// Switch branches
    Checkout { name: String },

    /// Files changed between two commits or branches
    Diff {
        from: String,
        to: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl BranchCommand {
    pub async fn run(&self, backend: &Backend) -> Result<(), Box<dyn std::error::Error>> {
        let git = require_git(backend, "branch")?;

        match &self.command {
            BranchSubcommand::List { format } => {
                let branches = git.list_branches().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&branches)?);
                    }
                    OutputFormat::Text => {
                        for branch in &branches {
                            let marker = if branch.current { "*" } else { " " };
                            println!("{} {:<24} {}", marker, branch.name, &branch.head[..7]);
                        }
                    }
                }
                Ok(())
            }

            BranchSubcommand::Create { name, checkout } => {
                git.create_branch(name, *checkout).await?;
                if *checkout {
                    println!("Created and switched to branch {}", name);
                } else {
                    println!("Created branch {}", name);
                }
                Ok(())
            }

            BranchSubcommand::Checkout { name } => {
                git.checkout(name).await?;
                println!("Switched to branch {}", name);
                Ok(())
            }

            BranchSubcommand::Diff { from, to, format } => {
                let changes = git.diff(from, to).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&changes)?);
                    }
                    OutputFormat::Text => {
                        if changes.is_empty() {
                            println!("No changes");
                        }
                        for change in &changes {
                            println!("{:<9} {}", change.status, change.path);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
