// Scripted transport doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use spc_common::protocol::api::{ApiResponse, ConsoleReply, MeReply, SignInReply};
use tokio::sync::mpsc;

use crate::error::{ApiError, TransportError};
use crate::transport::{ConsoleApi, PushConnector, PushSink, PushStream};

pub(crate) fn reply<T>(status: u16, header_token: Option<&str>, raw: &str) -> ApiResponse<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    ApiResponse::decode(status, header_token.map(str::to_owned), raw.to_string())
}

/// Poll `condition` with short sleeps until it holds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition was not reached");
}

// ── API ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiCall {
    SignIn { email: String },
    Me { token: String },
    Console { token: String, expression: String },
}

type Scripted<T> = Mutex<VecDeque<Result<ApiResponse<T>, ApiError>>>;

/// API double. Unscripted calls succeed: sign-in returns `tok-N`, `me`
/// returns user `u1`, console calls return `{"ok":1}`.
#[derive(Default)]
pub(crate) struct MockApi {
    sign_ins: Scripted<SignInReply>,
    mes: Scripted<MeReply>,
    consoles: Scripted<ConsoleReply>,
    calls: Mutex<Vec<ApiCall>>,
    sign_in_count: AtomicUsize,
}

impl MockApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script_sign_in(&self, result: Result<ApiResponse<SignInReply>, ApiError>) {
        self.sign_ins.lock().unwrap().push_back(result);
    }

    pub(crate) fn script_me(&self, result: Result<ApiResponse<MeReply>, ApiError>) {
        self.mes.lock().unwrap().push_back(result);
    }

    pub(crate) fn script_console(&self, result: Result<ApiResponse<ConsoleReply>, ApiError>) {
        self.consoles.lock().unwrap().push_back(result);
    }

    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn sign_in_count(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, ApiCall::SignIn { .. })).count()
    }

    pub(crate) fn console_expressions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Console { expression, .. } => Some(expression),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ConsoleApi for MockApi {
    async fn sign_in(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<ApiResponse<SignInReply>, ApiError> {
        self.calls.lock().unwrap().push(ApiCall::SignIn { email: email.to_string() });
        let n = self.sign_in_count.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.sign_ins.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(reply(200, None, &format!(r#"{{"ok":1,"token":"tok-{n}"}}"#))))
    }

    async fn me(&self, token: &str) -> Result<ApiResponse<MeReply>, ApiError> {
        self.calls.lock().unwrap().push(ApiCall::Me { token: token.to_string() });
        let scripted = self.mes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(reply(200, None, r#"{"ok":1,"_id":"u1"}"#)))
    }

    async fn console(
        &self,
        token: &str,
        expression: &str,
    ) -> Result<ApiResponse<ConsoleReply>, ApiError> {
        self.calls.lock().unwrap().push(ApiCall::Console {
            token: token.to_string(),
            expression: expression.to_string(),
        });
        let scripted = self.consoles.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(reply(200, None, r#"{"ok":1}"#)))
    }
}

// ── Push socket ─────────────────────────────────────────────────────

enum Inbound {
    Frame(String),
    Close,
}

/// Server side of one mock push socket.
#[derive(Clone)]
pub(crate) struct MockLink {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockLink {
    pub(crate) fn push(&self, frame: &str) {
        let _ = self.inbound.send(Inbound::Frame(frame.to_string()));
    }

    /// Close the socket from the server side.
    pub(crate) fn drop_connection(&self) {
        let _ = self.inbound.send(Inbound::Close);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connector double. Scripted failures are consumed first; afterwards
/// every attempt opens a fresh [`MockLink`].
#[derive(Default)]
pub(crate) struct MockConnector {
    failures: Mutex<VecDeque<TransportError>>,
    attempts: AtomicUsize,
    links: Mutex<Vec<MockLink>>,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_next(&self, error: TransportError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub(crate) async fn link(&self, index: usize) -> MockLink {
        wait_until(|| self.link_count() > index).await;
        self.links.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl PushConnector for MockConnector {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Box<dyn PushSink>, Box<dyn PushStream>), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let link = MockLink {
            inbound: tx.clone(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.links.lock().unwrap().push(link.clone());

        let sink = MockSink { sent: link.sent.clone(), closed: link.closed.clone(), inbound: tx };
        Ok((Box::new(sink), Box::new(MockStream { inbound: rx })))
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

#[async_trait]
impl PushSink for MockSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.inbound.send(Inbound::Close);
        Ok(())
    }
}

struct MockStream {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl PushStream for MockStream {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv().await {
            Some(Inbound::Frame(text)) => Ok(Some(text)),
            Some(Inbound::Close) | None => Ok(None),
        }
    }
}
