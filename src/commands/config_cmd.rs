use clap::{Args, Subcommand};

use crate::config::Config;

use super::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn show<T: std::fmt::Display>(name: &str, value: T, source: &crate::config::ConfigSource) {
    println!("{}: {}", name, value);
    println!("  source: {}", source);
}

fn set_or_unset(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(not set)")
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        show("mode", config.mode.value, &config.mode.source);
                        show("author.name", &config.author_name.value, &config.author_name.source);
                        show(
                            "author.email",
                            &config.author_email.value,
                            &config.author_email.source,
                        );
                        show(
                            "local.database_path",
                            config.database_path.value.display(),
                            &config.database_path.source,
                        );
                        show(
                            "local_git.repo_dir",
                            config.repo_dir.value.display(),
                            &config.repo_dir.source,
                        );
                        println!();

                        println!("github.owner: {}", set_or_unset(&config.github.owner));
                        println!("github.repo: {}", set_or_unset(&config.github.repo));
                        println!("github.branch: {}", set_or_unset(&config.github.branch));
                        println!("github.api_url: {}", set_or_unset(&config.github.api_url));
                        println!();

                        let git = &config.local_git;
                        println!("local_git.branch: {}", set_or_unset(&git.branch));
                        println!("local_git.remote_url: {}", set_or_unset(&git.remote_url));
                        println!("local_git.remote_name: {}", set_or_unset(&git.remote_name));
                        println!("local_git.auto_push: {}", git.auto_push);
                        println!();

                        // Presence only, never the values.
                        let creds = &config.credentials;
                        println!(
                            "credentials: github token {}, git token {}",
                            if creds.github_token.is_some() { "set" } else { "not set" },
                            if creds.git_token.is_some() { "set" } else { "not set" }
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
