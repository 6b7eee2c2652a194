// CLI subcommand dispatch.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use spc_client::ConsoleConfig;

pub mod complete;
pub mod console;

#[derive(Subcommand)]
pub enum Command {
    /// Print completions for a prefix from the saved index
    Complete(complete::CompleteArgs),
}

/// Flags shared by every subcommand.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub no_autocomplete: bool,
}

impl GlobalOptions {
    pub fn load_config(&self) -> anyhow::Result<ConsoleConfig> {
        let mut config = ConsoleConfig::load(self.config.as_deref())
            .context("failed to load console configuration")?;
        if self.no_autocomplete {
            config.autocomplete.enabled = false;
        }
        Ok(config)
    }
}

pub fn run(cmd: Option<Command>, options: GlobalOptions) -> anyhow::Result<()> {
    match cmd {
        None => console::run(options),
        Some(Command::Complete(args)) => complete::run(args, options),
    }
}
