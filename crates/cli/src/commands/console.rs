// Interactive session: stdin lines in, console output on stdout.

use std::sync::Arc;

use anyhow::Context;
use spc_client::Console;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::GlobalOptions;
use crate::output::TerminalSink;

pub fn run(options: GlobalOptions) -> anyhow::Result<()> {
    let config = options.load_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async move {
        let console = Console::from_config(&config, Arc::new(TerminalSink::stdout()))?;
        console.start();
        read_input(&console).await;
        console.close().await;
        Ok::<_, anyhow::Error>(())
    })
}

/// Forward input lines until end-of-input or Ctrl-C.
async fn read_input(console: &Console) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let console = console.clone();
                    let command = line.to_string();
                    tokio::spawn(async move { console.send(command).await });
                }
                Ok(None) => {
                    debug!("end of input");
                    return;
                }
                Err(error) => {
                    warn!(%error, "failed to read input");
                    return;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                return;
            }
        }
    }
}
