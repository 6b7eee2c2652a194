// Error taxonomy for the console client.
//
// transient connectivity -> TransportError / ConnectError::Exhausted
// authorization          -> AuthError, CommandError::Unauthorized
// protocol drift         -> DefinitionError (frames are surfaced by the router)
// local persistence      -> CacheError

use thiserror::Error;

/// Push channel failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The socket could not be opened or the upgrade was refused.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The socket broke while in use.
    #[error("socket error: {0}")]
    Io(String),

    /// There is no open socket to write to.
    #[error("push channel is closed")]
    Closed,
}

/// Request/response channel failures below the HTTP status level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Connection refused, reset, timed out.
    #[error("request failed: {0}")]
    Transport(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{step} returned HTTP {status}: {body}")]
    Status { step: &'static str, status: u16, body: String },

    #[error("{step} returned a non-OK result: {body}")]
    Rejected { step: &'static str, body: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("could not connect after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: TransportError },

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("still unauthorized after {attempts} attempts")]
    Unauthorized { attempts: u32 },

    #[error("re-authentication failed: {0}")]
    Reauth(AuthError),

    #[error("HTTP Error {status}:\n{body}")]
    Status { status: u16, body: String },

    #[error("non-OK result:\n{body}")]
    NotOk { body: String },

    #[error("raw command not sent: {0}")]
    Push(#[from] TransportError),
}

/// A sentinel line that could not be turned into an index entry.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("missing `=` in definition line")]
    MissingSeparator,

    #[error("failed to decode autocomplete data (data: `{data}`): {source}")]
    Decode {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected autocomplete data shape: `{0}`")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache format error: {0}")]
    Format(#[from] serde_json::Error),
}
