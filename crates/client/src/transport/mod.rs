// Transport seams: the push socket and the request/response API.
//
// Production implementations use tokio-tungstenite (`ws`) and reqwest
// (`http`). Tests substitute scripted doubles.

pub mod http;
pub mod ws;

use async_trait::async_trait;
use spc_common::protocol::api::{ApiResponse, ConsoleReply, MeReply, SignInReply};

use crate::error::{ApiError, TransportError};

pub use http::HttpApi;
pub use ws::WsConnector;

/// Opens push sockets.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn PushSink>, Box<dyn PushStream>), TransportError>;
}

/// Write half of an open push socket.
#[async_trait]
pub trait PushSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the socket. The matching stream then reports closure.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an open push socket.
#[async_trait]
pub trait PushStream: Send {
    /// Next text frame, `None` once the socket is closed.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// The console's HTTP API.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str)
        -> Result<ApiResponse<SignInReply>, ApiError>;

    async fn me(&self, token: &str) -> Result<ApiResponse<MeReply>, ApiError>;

    async fn console(
        &self,
        token: &str,
        expression: &str,
    ) -> Result<ApiResponse<ConsoleReply>, ApiError>;
}
