// Push channel frames for the console socket.
//
// Outbound frames are plain text commands (`auth`, `subscribe`, raw passthrough).
// Inbound frames are either handshake control lines, heartbeat/metadata lines,
// or two-element JSON arrays `[subscription, {category: payload}]`.

use std::fmt;

use serde_json::{Map, Value};

/// Line prefixes the server uses for heartbeat and metadata frames.
pub const METADATA_PREFIXES: [&str; 3] = ["time ", "protocol ", "package "];

const AUTH_OK_PREFIX: &str = "auth ok";
const AUTH_FAILED_PREFIX: &str = "auth failed";

// ── Outbound ────────────────────────────────────────────────────────

/// Client -> server text frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Authenticate the socket with a bearer token.
    Auth { token: String },
    /// Subscribe to a push topic.
    Subscribe { topic: String },
    /// Low-level command written verbatim.
    Raw(String),
}

impl OutboundFrame {
    /// Subscribe frame for a user's console topic.
    pub fn console_subscription(user_id: &str) -> Self {
        Self::Subscribe { topic: console_topic(user_id) }
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { token } => write!(f, "auth {token}"),
            Self::Subscribe { topic } => write!(f, "subscribe {topic}"),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

/// Push topic carrying a user's console output.
pub fn console_topic(user_id: &str) -> String {
    format!("user:{user_id}/console")
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Server -> client frames, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `auth ok ...`: the socket token was accepted.
    AuthOk(String),
    /// `auth failed`: the socket token was rejected.
    AuthFailed,
    /// Heartbeat or metadata line (`time `, `protocol `, `package `).
    Metadata(String),
    /// A structured push message.
    Envelope(Envelope),
    /// Valid JSON that does not have the envelope shape.
    Malformed(String),
    /// Anything else.
    Unknown(String),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix(AUTH_OK_PREFIX) {
            return Self::AuthOk(rest.trim().to_string());
        }
        if text.starts_with(AUTH_FAILED_PREFIX) {
            return Self::AuthFailed;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(value) => match Envelope::from_value(value) {
                Some(envelope) => Self::Envelope(envelope),
                None => Self::Malformed(text.to_string()),
            },
            Err(_) if is_metadata(text) => Self::Metadata(text.to_string()),
            Err(_) => Self::Unknown(text.to_string()),
        }
    }
}

fn is_metadata(text: &str) -> bool {
    METADATA_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
}

/// A `[subscription, {category: payload, ...}]` push message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub subscription: String,
    pub sections: Vec<(String, Payload)>,
}

impl Envelope {
    /// Decode the envelope shape from a JSON value. Returns `None` when the
    /// value is not a two-element array whose second element is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Array(mut items) = value else {
            return None;
        };
        if items.len() != 2 {
            return None;
        }
        let body = items.pop()?;
        let subscription = match items.pop()? {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let Value::Object(map) = body else {
            return None;
        };

        let sections =
            map.into_iter().map(|(category, value)| (category, Payload::from_value(value))).collect();
        Some(Self { subscription, sections })
    }
}

/// The value stored under a top-level category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A plain string.
    Text(String),
    /// A mapping of sub-category to entries.
    Grouped(Vec<(String, Entries)>),
    /// Any other scalar or list, rendered as JSON text.
    Scalar(String),
    /// `null`.
    Empty,
}

impl Payload {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(map) => Self::Grouped(grouped_entries(map)),
            Value::Null => Self::Empty,
            other => Self::Scalar(other.to_string()),
        }
    }
}

fn grouped_entries(map: Map<String, Value>) -> Vec<(String, Entries)> {
    map.into_iter().map(|(category, value)| (category, Entries::from_value(value))).collect()
}

/// The value stored under a sub-category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entries {
    /// A list of lines. Non-string items are rendered as JSON text.
    Lines(Vec<String>),
    /// A single value.
    Single(String),
}

impl Entries {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Lines(items.into_iter().map(value_text).collect()),
            other => Self::Single(value_text(other)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Lines(lines) => lines.is_empty(),
            Self::Single(text) => text.is_empty(),
        }
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

// ── Categories ──────────────────────────────────────────────────────

/// Routing category for a piece of pushed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Log,
    Result,
    Error,
    Unknown(String),
}

impl Category {
    /// Category named directly by a key (`log`, `results`, `error`).
    pub fn from_name(name: &str) -> Self {
        match name {
            "log" => Self::Log,
            "results" => Self::Result,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Category of an entry nested under `general.specific`.
    pub fn for_pair(general: &str, specific: &str) -> Self {
        match (general, specific) {
            ("messages", "results") => Self::Result,
            ("messages", "log") => Self::Log,
            (_, specific) => Self::from_name(specific),
        }
    }
}
