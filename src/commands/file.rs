use clap::{Args, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use quire_core::{Backend, EntryType, StorageAdapter, WriteRequest};

use super::OutputFormat;

#[derive(Args)]
pub struct FileCommand {
    #[command(subcommand)]
    pub command: FileSubcommand,
}

#[derive(Subcommand)]
pub enum FileSubcommand {
    /// Print a file's content
    Get {
        path: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create or update a file
    Put {
        path: String,

        /// New content (read from --from-file or stdin when omitted)
        content: Option<String>,

        /// Read content from this file
        #[arg(long, value_name = "FILE", conflicts_with = "content")]
        from_file: Option<PathBuf>,

        /// Change description
        #[arg(long, short)]
        message: Option<String>,

        /// Version token the edit was based on
        #[arg(long, value_name = "TOKEN")]
        expect: Option<String>,

        /// Overwrite even if the file changed since it was read
        #[arg(long)]
        force: bool,
    },

    /// Delete a file
    Delete {
        path: String,

        /// Change description
        #[arg(long, short)]
        message: Option<String>,
    },

    /// List a directory
    List {
        #[arg(default_value = "")]
        path: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a file's change history, newest first
    History {
        path: String,

        /// Maximum number of entries
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print a file as of a commit (github mode)
    ShowAt {
        path: String,
        commit: String,

        /// Print only the size in bytes
        #[arg(long)]
        size: bool,
    },

    /// Check whether a file changed on the remote since TOKEN (github mode)
    Changed {
        path: String,

        /// Version token last seen for the file
        #[arg(long, value_name = "TOKEN")]
        since: String,
    },
}

impl FileCommand {
    pub async fn run(&self, backend: &Backend) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            FileSubcommand::Get { path, format } => {
                let file = backend
                    .get_file(path)
                    .await?
                    .ok_or_else(|| format!("File not found: {}", path))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&file)?);
                    }
                    OutputFormat::Text => {
                        print!("{}", file.content);
                        if !file.content.ends_with('\n') {
                            println!();
                        }
                        eprintln!("version: {}", file.version_token);
                    }
                }
                Ok(())
            }

            FileSubcommand::Put {
                path,
                content,
                from_file,
                message,
                expect,
                force,
            } => {
                let content = match (content, from_file) {
                    (Some(content), _) => content.clone(),
                    (None, Some(source)) => std::fs::read_to_string(source)?,
                    (None, None) => {
                        let mut buf = String::new();
                        std::io::stdin().read_to_string(&mut buf)?;
                        buf
                    }
                };
                let message = message.clone().unwrap_or_else(|| format!("Update {}", path));

                let mut request = WriteRequest::new(path, content, message);
                if let Some(token) = expect {
                    request = request.expecting(token);
                }
                if *force {
                    request = request.forced();
                }

                let result = backend.put_file(request).await?;
                println!("Saved {}", path);
                println!("version: {}", result.version_token);
                Ok(())
            }

            FileSubcommand::Delete { path, message } => {
                let message = message.clone().unwrap_or_else(|| format!("Delete {}", path));
                backend.delete_file(path, &message).await?;
                println!("Deleted {}", path);
                Ok(())
            }

            FileSubcommand::List { path, format } => {
                let entries = backend.list_files(path).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&entries)?);
                    }
                    OutputFormat::Text => {
                        if entries.is_empty() {
                            println!("No files found");
                            return Ok(());
                        }
                        for entry in &entries {
                            match entry.entry_type {
                                EntryType::Dir => println!("{}/", entry.path),
                                EntryType::File => println!("{}", entry.path),
                            }
                        }
                    }
                }
                Ok(())
            }

            FileSubcommand::History {
                path,
                limit,
                format,
            } => {
                let history = backend.get_history(path, *limit).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&history)?);
                    }
                    OutputFormat::Text => {
                        if history.is_empty() {
                            println!("No history for {}", path);
                            return Ok(());
                        }
                        println!("{:<20}  {:<16}  {:<16}  MESSAGE", "VERSION", "DATE", "AUTHOR");
                        println!("{}", "-".repeat(80));
                        for entry in &history {
                            let id: String = entry.id.chars().take(20).collect();
                            println!(
                                "{:<20}  {:<16}  {:<16}  {}",
                                id,
                                entry.timestamp.format("%Y-%m-%d %H:%M"),
                                entry.author,
                                entry.message.lines().next().unwrap_or_default()
                            );
                        }
                    }
                }
                Ok(())
            }

            FileSubcommand::ShowAt { path, commit, size } => {
                let remote = backend
                    .as_remote()
                    .ok_or("'file show-at' needs github mode")?;

                if *size {
                    let size = remote
                        .get_file_size_at_commit(path, commit)
                        .await?
                        .ok_or_else(|| format!("{} does not exist at {}", path, commit))?;
                    println!("{}", size);
                } else {
                    let content = remote
                        .get_file_at_commit(path, commit)
                        .await?
                        .ok_or_else(|| format!("{} does not exist at {}", path, commit))?;
                    print!("{}", content);
                }
                Ok(())
            }

            FileSubcommand::Changed { path, since } => {
                let remote = backend
                    .as_remote()
                    .ok_or("'file changed' needs github mode")?;

                if remote.has_changed_since(path, since).await? {
                    println!("{} changed on the remote", path);
                } else {
                    println!("{} is unchanged", path);
                }
                Ok(())
            }
        }
    }
}
