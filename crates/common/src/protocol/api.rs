// Request/response bodies for the console HTTP API.
//
//   POST /auth/signin   {email, password}  -> {ok, token}
//   GET  /auth/me       (token headers)    -> {ok, _id, token?}
//   POST /user/console  {expression}       -> {ok, error?, token?}
//
// A refreshed token may come back in the `X-Token` response header or in the
// body; the header wins when both are present.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Header carrying the bearer token on requests and refreshed tokens on responses.
pub const TOKEN_HEADER: &str = "X-Token";
/// Header the API expects alongside `X-Token` on authenticated requests.
pub const USERNAME_HEADER: &str = "X-Username";
/// `error` value the API returns when the token is no longer valid.
pub const UNAUTHORIZED_ERROR: &str = "unauthorized";

pub const SIGNIN_PATH: &str = "/auth/signin";
pub const ME_PATH: &str = "/auth/me";
pub const CONSOLE_PATH: &str = "/user/console";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SignInReply {
    #[serde(deserialize_with = "truthy")]
    pub ok: bool,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MeReply {
    #[serde(deserialize_with = "truthy")]
    pub ok: bool,
    #[serde(rename = "_id")]
    pub user_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleRequest {
    pub expression: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleReply {
    #[serde(deserialize_with = "truthy")]
    pub ok: bool,
    pub error: Option<String>,
    pub token: Option<String>,
}

/// The API reports `ok` as `1`/`0` as often as `true`/`false`.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

impl ConsoleReply {
    pub fn is_unauthorized(&self) -> bool {
        self.error.as_deref() == Some(UNAUTHORIZED_ERROR)
    }
}

/// Bodies that may carry a refreshed token.
pub trait TokenCarrier {
    fn body_token(&self) -> Option<&str>;
}

impl TokenCarrier for SignInReply {
    fn body_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl TokenCarrier for MeReply {
    fn body_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl TokenCarrier for ConsoleReply {
    fn body_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// A decoded API response.
///
/// `body` falls back to its default when the response text is not valid JSON
/// for `T`; `raw` keeps the original text for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub header_token: Option<String>,
    pub body: T,
    pub raw: String,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl<T: TokenCarrier> ApiResponse<T> {
    /// Token to adopt after this response, header first.
    pub fn refreshed_token(&self) -> Option<&str> {
        self.header_token
            .as_deref()
            .or_else(|| self.body.body_token())
            .filter(|token| !token.is_empty())
    }
}

impl<T: Default + for<'de> Deserialize<'de>> ApiResponse<T> {
    /// Build a response from raw parts, decoding the body leniently.
    pub fn decode(status: u16, header_token: Option<String>, raw: String) -> Self {
        let body = serde_json::from_str(&raw).unwrap_or_default();
        Self { status, header_token, body, raw }
    }
}
