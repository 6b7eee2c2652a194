// Console facade: wires the session, authenticator, dispatcher, router,
// index builder and connection manager together for a front end.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::autocomplete::{CommandSink, IndexBuilder};
use crate::config::{ConfigError, ConsoleConfig};
use crate::connection::ConnectionManager;
use crate::dispatch::CommandDispatcher;
use crate::output::OutputSink;
use crate::router::MessageRouter;
use crate::session::{ConnectionState, Session};
use crate::transport::{ConsoleApi, HttpApi, PushConnector, WsConnector};

#[derive(Clone)]
pub struct Console {
    session: Arc<Session>,
    dispatcher: CommandDispatcher,
    connection: ConnectionManager,
    index: Option<Arc<IndexBuilder>>,
}

impl Console {
    /// Build a console over the production HTTP and WebSocket transports.
    pub fn from_config(config: &ConsoleConfig, output: Arc<dyn OutputSink>) -> Result<Self> {
        config.validate().context("invalid console configuration")?;
        let api = HttpApi::new(&config.api_url).context("failed to build HTTP client")?;
        Ok(Self::new(config, Arc::new(api), Arc::new(WsConnector), output)?)
    }

    pub fn new(
        config: &ConsoleConfig,
        api: Arc<dyn ConsoleApi>,
        connector: Arc<dyn PushConnector>,
        output: Arc<dyn OutputSink>,
    ) -> Result<Self, ConfigError> {
        let session = Arc::new(Session::new());
        let authenticator = Authenticator::new(api.clone(), config.credentials()?);
        let dispatcher =
            CommandDispatcher::new(session.clone(), api, authenticator.clone(), output.clone())
                .with_reauth_retries(config.connection.reauth_retries());

        let mut router = MessageRouter::new(output.clone());
        let index = config.autocomplete.enabled.then(|| {
            let commands: Arc<dyn CommandSink> = Arc::new(dispatcher.clone());
            Arc::new(IndexBuilder::new(
                commands,
                output.clone(),
                config.autocomplete.cache_settings(),
            ))
        });
        if let Some(builder) = &index {
            router = router.with_definitions(builder.clone());
        }

        let connection = ConnectionManager::new(
            session.clone(),
            connector,
            authenticator,
            dispatcher.clone(),
            Arc::new(router),
            output,
            &config.ws_url,
        )
        .with_reconnect_policy(config.connection.policy());

        Ok(Self { session, dispatcher, connection, index })
    }

    /// Adopt a fresh cached index, connect in the background and, when the
    /// cache was missing or stale, rebuild the index once the session is
    /// first ready.
    pub fn start(&self) {
        let rebuild = self.index.clone().filter(|builder| !builder.load_cache());

        let connection = self.connection.clone();
        tokio::spawn(async move {
            if let Err(error) = connection.connect().await {
                debug!(%error, "initial connect failed");
            }
        });

        if let Some(builder) = rebuild {
            let session = self.session.clone();
            tokio::spawn(async move {
                if session.wait_ready().await {
                    builder.rebuild().await;
                }
            });
        }
        info!("console started");
    }

    /// Send a command, queueing it until the session is ready.
    pub async fn send(&self, text: String) {
        self.dispatcher.send(text).await;
    }

    /// Candidate completions for `text`; empty when autocompletion is off.
    pub fn completions_for(&self, text: &str) -> Vec<String> {
        self.index.as_ref().map_or_else(Vec::new, |builder| builder.completions_for(text))
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }
}
