// `spc complete <prefix>`: query the saved completion index offline.

use std::io::{self, Write};

use anyhow::Context;
use clap::Args;
use spc_client::autocomplete::cache;

use super::GlobalOptions;

#[derive(Debug, Args)]
pub struct CompleteArgs {
    /// Text to complete, e.g. `Game.ro`
    pub prefix: String,
}

pub fn run(args: CompleteArgs, options: GlobalOptions) -> anyhow::Result<()> {
    let config = options.load_config()?;
    let path = &config.autocomplete.cache_path;
    let snapshot = cache::read(path)
        .with_context(|| format!("failed to read completion index at {}", path.display()))?
        .with_context(|| format!("no completion index at {}; run `spc` once to build it", path.display()))?;

    let mut out = io::stdout().lock();
    for completion in snapshot.index.completions_for(&args.prefix) {
        writeln!(out, "{completion}")?;
    }
    Ok(())
}
