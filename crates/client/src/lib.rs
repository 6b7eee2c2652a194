// spc-client library: a resilient console client for the Screeps game API.
//
// A front end builds a `runtime::Console` from a `config::ConsoleConfig`,
// forwards input lines to `Console::send`, and renders `output::ConsoleLine`s
// through its own `OutputSink`.

pub mod auth;
pub mod autocomplete;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod router;
pub mod runtime;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::ConsoleConfig;
pub use output::{ConsoleLine, LineKind, OutputSink};
pub use runtime::Console;
