use clap::{Args, Subcommand};
use std::path::PathBuf;

use quire_core::{Backend, Bundle};

#[derive(Args)]
pub struct BundleCommand {
    #[command(subcommand)]
    pub command: BundleSubcommand,
}

#[derive(Subcommand)]
pub enum BundleSubcommand {
    /// Export every file with its history
    Export {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace the store's contents with a bundle
    Import {
        /// Bundle file produced by `bundle export`
        input: PathBuf,
    },
}

impl BundleCommand {
    pub async fn run(&self, backend: &Backend) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            BundleSubcommand::Export { output } => {
                let bundle = match backend {
                    Backend::Git(git) => git.export_bundle().await?,
                    Backend::Local(local) => local.export().await?,
                    Backend::Remote(_) => {
                        return Err("github mode has no bundle export".into());
                    }
                };
                let json = bundle.to_json()?;

                match output {
                    Some(path) => {
                        std::fs::write(path, json)?;
                        eprintln!(
                            "Exported {} files to {}",
                            bundle.files.len(),
                            path.display()
                        );
                    }
                    None => println!("{}", json),
                }
                Ok(())
            }

            BundleSubcommand::Import { input } => {
                let json = std::fs::read_to_string(input)?;
                let bundle = Bundle::from_json(&json)?;

                let imported = match backend {
                    Backend::Git(git) => git.import_bundle(&bundle).await?,
                    Backend::Local(local) => local.import(&bundle).await?,
                    Backend::Remote(_) => {
                        return Err("github mode has no bundle import".into());
                    }
                };
                println!(
                    "Imported {} files (exported {})",
                    imported,
                    bundle.export_date.format("%Y-%m-%d %H:%M")
                );
                Ok(())
            }
        }
    }
}
