// spc CLI entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "spc", about = "Console client for the Screeps game API")]
struct Cli {
    /// Config file (defaults to ./console.toml, then ~/.spc/console.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Skip loading or building the completion index
    #[arg(long)]
    no_autocomplete: bool,
    #[command(subcommand)]
    command: Option<commands::Command>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = commands::GlobalOptions { config: cli.config, no_autocomplete: cli.no_autocomplete };
    commands::run(cli.command, options)
}
