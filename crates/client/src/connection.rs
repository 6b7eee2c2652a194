// Connection Manager: push socket lifecycle.
//
// connect():  open socket (bounded retries) -> sign in if no token held ->
//             send `auth <token>` -> spawn the receive loop
// receive:    `auth ok`     -> subscribe, mark ready, flush queued commands
//             `auth failed` -> sign in again and reconnect; a second
//                              consecutive rejection is surfaced and stops
//             closure       -> reconnect after a delay unless shutting down
// close():    idempotent; sets the shutdown flag and closes the socket
//
// Transport is abstracted via `PushConnector` for testability.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use spc_common::protocol::frame::{InboundFrame, OutboundFrame};
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::dispatch::CommandDispatcher;
use crate::error::{ConnectError, TransportError};
use crate::output::OutputSink;
use crate::router::MessageRouter;
use crate::session::{ConnectionState, Session};
use crate::transport::{PushConnector, PushSink, PushStream};

// ── Configuration ───────────────────────────────────────────────────

/// Retry parameters for the push socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts per `connect()` call.
    pub connect_attempts: u32,
    /// Delay between failed attempts.
    pub retry_delay: Duration,
    /// Delay before reconnecting after the socket closed unexpectedly.
    pub reconnect_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            retry_delay: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

// ── Connection manager ──────────────────────────────────────────────

#[derive(Clone)]
pub struct ConnectionManager {
    session: Arc<Session>,
    connector: Arc<dyn PushConnector>,
    authenticator: Authenticator,
    dispatcher: CommandDispatcher,
    router: Arc<MessageRouter>,
    output: Arc<dyn OutputSink>,
    policy: ReconnectPolicy,
    ws_url: Arc<str>,
}

impl ConnectionManager {
    pub fn new(
        session: Arc<Session>,
        connector: Arc<dyn PushConnector>,
        authenticator: Authenticator,
        dispatcher: CommandDispatcher,
        router: Arc<MessageRouter>,
        output: Arc<dyn OutputSink>,
        ws_url: &str,
    ) -> Self {
        Self {
            session,
            connector,
            authenticator,
            dispatcher,
            router,
            output,
            policy: ReconnectPolicy::default(),
            ws_url: Arc::from(ws_url),
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Open the push socket and start the session handshake.
    ///
    /// Resolves once the `auth` frame is sent and the receive loop is
    /// running; readiness follows when the server accepts the token.
    pub fn connect(&self) -> BoxFuture<'static, Result<(), ConnectError>> {
        let this = self.clone();
        async move { this.run_connect().await }.boxed()
    }

    async fn run_connect(self) -> Result<(), ConnectError> {
        let attempts = self.policy.connect_attempts.max(1);
        let mut last_error = TransportError::Closed;

        for attempt in 1..=attempts {
            if self.session.is_shutting_down() {
                debug!("shutdown requested, abandoning connect");
                return Ok(());
            }
            self.session.set_state(ConnectionState::Connecting);
            debug!(attempt, url = %self.ws_url, "opening push socket");

            match self.connector.connect(&self.ws_url).await {
                Ok((sink, stream)) => return self.start_session(sink, stream).await,
                Err(error) => {
                    warn!(attempt, %error, "push socket connect failed");
                    last_error = error;
                }
            }
            if attempt < attempts {
                self.output.status("Failed to connect, retrying.");
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }

        self.session.set_state(ConnectionState::Disconnected);
        let error = ConnectError::Exhausted { attempts, last_error };
        self.output.failure(&error.to_string());
        Err(error)
    }

    async fn start_session(
        self,
        mut sink: Box<dyn PushSink>,
        stream: Box<dyn PushStream>,
    ) -> Result<(), ConnectError> {
        if self.session.is_shutting_down() {
            let _ = sink.close().await;
            return Ok(());
        }
        self.session.install_push(sink).await;

        let token = match self.session.token() {
            Some(token) => token,
            None => {
                self.session.set_state(ConnectionState::Authenticating);
                match self.authenticator.login(&self.session).await {
                    Ok(token) => token,
                    Err(error) => {
                        self.output.failure(&format!("Authentication failed: {error}"));
                        self.drop_transport().await;
                        self.session.set_state(ConnectionState::Disconnected);
                        return Err(error.into());
                    }
                }
            }
        };

        self.session.set_state(ConnectionState::Authenticating);
        if let Err(error) = self.session.send_frame(&OutboundFrame::Auth { token }).await {
            // The receive loop observes the broken socket and reconnects.
            warn!(%error, "failed to send auth frame");
        }
        tokio::spawn(self.receive_loop(stream));
        Ok(())
    }

    async fn receive_loop(self, mut stream: Box<dyn PushStream>) {
        loop {
            let text = match stream.recv().await {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "push socket read failed");
                    break;
                }
            };
            match InboundFrame::parse(&text) {
                InboundFrame::AuthOk(_) => self.on_authenticated().await,
                InboundFrame::AuthFailed => {
                    self.on_auth_rejected().await;
                    return;
                }
                frame => self.router.route(frame),
            }
        }
        self.on_closed().await;
    }

    async fn on_authenticated(&self) {
        self.session.clear_auth_rejections();
        self.session.set_state(ConnectionState::Subscribing);
        let user_id = match self.session.user_id() {
            Some(user_id) => user_id,
            // The topic needs the user id, which only sign-in provides.
            None => match self.authenticator.login(&self.session).await {
                Ok(_) => self.session.user_id().unwrap_or_default(),
                Err(error) => {
                    self.output.failure(&format!("Authentication failed: {error}"));
                    return;
                }
            },
        };

        let subscribe = OutboundFrame::console_subscription(&user_id);
        if let Err(error) = self.session.send_frame(&subscribe).await {
            warn!(%error, "failed to subscribe");
            return;
        }
        self.output.status("Connected.");

        let pending = self.session.mark_ready();
        info!(user_id = %user_id, queued = pending.len(), "console session ready");
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.flush(pending).await });
    }

    async fn on_auth_rejected(&self) {
        let rejections = self.session.record_auth_rejection();
        self.session.set_state(ConnectionState::Reconnecting);
        self.drop_transport().await;

        if rejections > 1 {
            warn!(rejections, "push socket rejected the token again");
            self.session.set_state(ConnectionState::Disconnected);
            self.output.failure("Authentication rejected by the server.");
            return;
        }

        warn!("push socket rejected the token, signing in again");
        if let Err(error) = self.authenticator.login(&self.session).await {
            self.session.set_state(ConnectionState::Disconnected);
            self.output.failure(&format!("Authentication failed: {error}"));
            return;
        }
        if let Err(error) = self.connect().await {
            warn!(%error, "reconnect after auth rejection failed");
        }
    }

    async fn on_closed(&self) {
        if self.session.is_shutting_down() {
            debug!("push socket closed after shutdown");
            self.session.set_state(ConnectionState::Disconnected);
            return;
        }

        info!(delay = ?self.policy.reconnect_delay, "push socket closed, reconnecting");
        self.session.set_state(ConnectionState::Reconnecting);
        self.output.status("Reconnecting.");
        let this = self.clone();
        tokio::spawn(async move {
            this.drop_transport().await;
            tokio::time::sleep(this.policy.reconnect_delay).await;
            if let Err(error) = this.connect().await {
                warn!(%error, "reconnect failed");
            }
        });
    }

    /// Close the socket without touching the shutdown flag.
    async fn drop_transport(&self) {
        if let Some(mut sink) = self.session.take_push().await {
            if let Err(error) = sink.close().await {
                debug!(%error, "push socket already closed");
            }
        }
    }

    /// Stop the session. Safe to call at any time and more than once.
    pub async fn close(&self) {
        if !self.session.request_shutdown() {
            return;
        }
        self.session.set_state(ConnectionState::Closing);
        self.drop_transport().await;
        self.output.status("Connection closed.");
        info!("console session closed");
    }
}
