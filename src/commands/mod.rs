mod branch;
mod bundle;
mod config_cmd;
mod file;
mod info;
mod remote_cmd;

pub use branch::BranchCommand;
pub use bundle::BundleCommand;
pub use config_cmd::ConfigCommand;
pub use file::FileCommand;
pub use info::InfoCommand;
pub use remote_cmd::RemoteCommand;

use clap::ValueEnum;
use quire_core::{Backend, EmbeddedGitAdapter};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// The embedded repository behind `backend`, or an error naming the command.
fn require_git<'a>(
    backend: &'a Backend,
    command: &str,
) -> Result<&'a EmbeddedGitAdapter, Box<dyn std::error::Error>> {
    backend.as_git().ok_or_else(|| {
        format!(
            "'{}' needs local-git mode (current mode: {})",
            command,
            backend.mode()
        )
        .into()
    })
}
