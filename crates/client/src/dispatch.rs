// Command Dispatcher: queues commands until the session is ready, sends them
// over the console API (or raw over the push socket), and re-authenticates
// on unauthorized replies a bounded number of times.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use spc_common::protocol::frame::OutboundFrame;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::autocomplete::CommandSink;
use crate::error::CommandError;
use crate::output::OutputSink;
use crate::session::{Admission, Session};
use crate::transport::ConsoleApi;

/// Commands starting with this are written verbatim (minus the marker) to
/// the push socket.
pub const RAW_MARKER: char = '.';
pub const DEFAULT_REAUTH_RETRIES: u32 = 1;
/// At most three attempts per command.
pub const MAX_REAUTH_RETRIES: u32 = 2;

#[derive(Clone)]
pub struct CommandDispatcher {
    session: Arc<Session>,
    api: Arc<dyn ConsoleApi>,
    authenticator: Authenticator,
    output: Arc<dyn OutputSink>,
    reauth_retries: u32,
}

impl CommandDispatcher {
    pub fn new(
        session: Arc<Session>,
        api: Arc<dyn ConsoleApi>,
        authenticator: Authenticator,
        output: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            session,
            api,
            authenticator,
            output,
            reauth_retries: DEFAULT_REAUTH_RETRIES,
        }
    }

    pub fn with_reauth_retries(mut self, retries: u32) -> Self {
        self.reauth_retries = retries.min(MAX_REAUTH_RETRIES);
        self
    }

    /// Send `text` now if the session is ready, otherwise queue it.
    ///
    /// Failures are reported on the output sink.
    pub async fn send(&self, text: String) {
        if self.session.is_shutting_down() {
            debug!("session closed, dropping command");
            return;
        }
        match self.session.admit(text) {
            Admission::Queued => debug!("session not ready, command queued"),
            Admission::Ready(text) => self.dispatch(text).await,
        }
    }

    /// Dispatch commands queued before readiness. Issued in queue order,
    /// completed concurrently.
    pub async fn flush(&self, pending: Vec<String>) {
        if pending.is_empty() {
            return;
        }
        debug!(count = pending.len(), "flushing queued commands");
        join_all(pending.into_iter().map(|text| self.dispatch(text))).await;
    }

    async fn dispatch(&self, text: String) {
        let result = match text.strip_prefix(RAW_MARKER) {
            Some(raw) => self
                .session
                .send_frame(&OutboundFrame::Raw(raw.to_string()))
                .await
                .map_err(CommandError::from),
            None => self.call(&text).await,
        };
        if let Err(error) = result {
            warn!(%error, "command failed");
            self.output.failure(&format!("Failed to send command: {error}"));
        }
    }

    /// Evaluate `expression` through the console API.
    pub async fn call(&self, expression: &str) -> Result<(), CommandError> {
        let attempts = self.reauth_retries + 1;
        for attempt in 1..=attempts {
            let token = match self.session.token() {
                Some(token) => token,
                None => self.authenticator.login(&self.session).await.map_err(CommandError::Reauth)?,
            };

            let response = self.api.console(&token, expression).await?;
            if let Some(token) = response.refreshed_token() {
                self.session.set_token(token);
            }

            if response.status == 401 || response.body.is_unauthorized() {
                if attempt == attempts {
                    break;
                }
                warn!(attempt, "console call unauthorized, signing in again");
                self.authenticator.login(&self.session).await.map_err(CommandError::Reauth)?;
                continue;
            }
            if !response.is_success() {
                return Err(CommandError::Status { status: response.status, body: response.raw });
            }
            if !response.body.ok {
                return Err(CommandError::NotOk { body: response.raw });
            }
            return Ok(());
        }
        Err(CommandError::Unauthorized { attempts })
    }
}

#[async_trait]
impl CommandSink for CommandDispatcher {
    async fn submit(&self, command: String) {
        self.send(command).await;
    }
}
