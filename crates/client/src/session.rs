// Session context shared by the connection manager and command dispatcher.
//
// Holds the identity (token, user id), connection state, the pending command
// queue, the push socket's write half, and the terminal shutdown flag.
// Readiness and the pending queue sit behind one lock so a command is either
// queued before the flush takes the queue or sent directly after it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use spc_common::protocol::frame::OutboundFrame;
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::error::TransportError;
use crate::transport::PushSink;

/// Connection lifecycle.
///
/// `Disconnected → Connecting → Authenticating → Subscribing → Ready`, then
/// `Closing` on shutdown or `Reconnecting` after an unexpected closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribing,
    Ready,
    Closing,
    Reconnecting,
}

/// Sign-in credentials for the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Outcome of offering a command to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Not ready; the command was appended to the pending queue.
    Queued,
    /// Ready; the caller should send the command now.
    Ready(String),
}

#[derive(Debug, Default)]
struct Identity {
    token: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug)]
struct Link {
    state: ConnectionState,
    pending: Option<Vec<String>>,
}

pub struct Session {
    identity: Mutex<Identity>,
    link: Mutex<Link>,
    push: AsyncMutex<Option<Box<dyn PushSink>>>,
    shutdown: AtomicBool,
    auth_rejections: AtomicU32,
    /// Signalled on readiness and on shutdown.
    changed: Notify,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            identity: Mutex::new(Identity::default()),
            link: Mutex::new(Link { state: ConnectionState::Disconnected, pending: None }),
            push: AsyncMutex::new(None),
            shutdown: AtomicBool::new(false),
            auth_rejections: AtomicU32::new(0),
            changed: Notify::new(),
        }
    }

    // ── Identity ────────────────────────────────────────────────────

    pub fn token(&self) -> Option<String> {
        lock(&self.identity).token.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        lock(&self.identity).user_id.clone()
    }

    pub fn set_identity(&self, token: String, user_id: String) {
        let mut identity = lock(&self.identity);
        identity.token = Some(token);
        identity.user_id = Some(user_id);
    }

    pub fn set_token(&self, token: &str) {
        lock(&self.identity).token = Some(token.to_string());
    }

    // ── Readiness and pending queue ─────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        lock(&self.link).state
    }

    pub fn set_state(&self, state: ConnectionState) {
        lock(&self.link).state = state;
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Queue `text` unless the session is ready.
    pub fn admit(&self, text: String) -> Admission {
        let mut link = lock(&self.link);
        if link.state == ConnectionState::Ready {
            return Admission::Ready(text);
        }
        link.pending.get_or_insert_with(Vec::new).push(text);
        Admission::Queued
    }

    /// Flip to `Ready` and take the pending queue, leaving the slot empty.
    pub fn mark_ready(&self) -> Vec<String> {
        let pending = {
            let mut link = lock(&self.link);
            link.state = ConnectionState::Ready;
            link.pending.take().unwrap_or_default()
        };
        self.changed.notify_waiters();
        pending
    }

    /// Wait until the session is ready. Returns `false` if shutdown comes
    /// first.
    pub async fn wait_ready(&self) -> bool {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_shutting_down() {
                return false;
            }
            if self.is_ready() {
                return true;
            }
            notified.await;
        }
    }

    /// Commands waiting for readiness, oldest first.
    pub fn pending(&self) -> Vec<String> {
        lock(&self.link).pending.clone().unwrap_or_default()
    }

    // ── Shutdown ────────────────────────────────────────────────────

    /// Set the shutdown flag. It is never cleared.
    ///
    /// Returns `true` only for the call that set it.
    pub fn request_shutdown(&self) -> bool {
        let first = !self.shutdown.swap(true, Ordering::SeqCst);
        self.changed.notify_waiters();
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // ── Socket authentication rejections ────────────────────────────

    /// Count an `auth failed` frame. Returns the number of consecutive rejections.
    pub fn record_auth_rejection(&self) -> u32 {
        self.auth_rejections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn clear_auth_rejections(&self) {
        self.auth_rejections.store(0, Ordering::SeqCst);
    }

    // ── Push socket ─────────────────────────────────────────────────

    pub async fn install_push(&self, sink: Box<dyn PushSink>) {
        *self.push.lock().await = Some(sink);
    }

    pub async fn take_push(&self) -> Option<Box<dyn PushSink>> {
        self.push.lock().await.take()
    }

    pub async fn send_frame(&self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let mut push = self.push.lock().await;
        let sink = push.as_mut().ok_or(TransportError::Closed)?;
        sink.send(frame.to_string()).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
