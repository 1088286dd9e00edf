use clap::Args;

use quire_core::{Backend, StorageAdapter, StorageMode};

use super::OutputFormat;

/// Describe the configured storage mode
#[derive(Args)]
pub struct InfoCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl InfoCommand {
    pub fn run(&self, mode: StorageMode) -> Result<(), Box<dyn std::error::Error>> {
        let info = Backend::for_mode(mode).mode_info();

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
            OutputFormat::Text => {
                let yes_no = |b: bool| if b { "yes" } else { "no" };

                println!("{} ({})", info.name, info.mode);
                println!("{}", info.description);
                println!();
                println!("Requires network: {}", yes_no(info.requires_network));
                println!("History:          {}", yes_no(info.supports_history));
                println!("Branches:         {}", yes_no(info.supports_branches));
                println!("Export/import:    {}", yes_no(info.supports_export));
                println!();
                println!("Capabilities:");
                for item in info.capabilities {
                    println!("  + {}", item);
                }
                println!("Limitations:");
                for item in info.limitations {
                    println!("  - {}", item);
                }
                println!();
                println!("quire-core {}", quire_core::version());
            }
        }
        Ok(())
    }
}
