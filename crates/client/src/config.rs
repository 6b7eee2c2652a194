// Console configuration file.
//
// Lookup order: explicit `--config` path, `./console.toml`, then
// `~/.spc/console.toml`.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::autocomplete::CacheSettings;
use crate::connection::ReconnectPolicy;
use crate::dispatch::{DEFAULT_REAUTH_RETRIES, MAX_REAUTH_RETRIES};
use crate::session::Credentials;

pub const CONFIG_FILE_NAME: &str = "console.toml";
pub const DEFAULT_WS_URL: &str = "wss://screeps.com/socket/websocket";
pub const DEFAULT_API_URL: &str = "https://screeps.com/api";

/// Root directory for per-user state: `~/.spc/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".spc"))
}

/// Path to the per-user config file: `~/.spc/console.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no config file found (looked for ./{CONFIG_FILE_NAME} and ~/.spc/{CONFIG_FILE_NAME})")]
    NotFound,
    #[error("missing credentials: `user` and `password` must both be set")]
    MissingCredentials,
    #[error("invalid {field} `{value}`: {reason}")]
    InvalidUrl { field: &'static str, value: String, reason: String },
}

// ── Console config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Account email or user name used for sign-in.
    pub user: Option<String>,
    pub password: Option<String>,
    /// Push socket endpoint.
    pub ws_url: String,
    /// Base URL of the request/response API.
    pub api_url: String,
    pub connection: ConnectionConfig,
    pub autocomplete: AutocompleteConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            ws_url: DEFAULT_WS_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            connection: ConnectionConfig::default(),
            autocomplete: AutocompleteConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// Load from `explicit` if given, otherwise from the first config file
    /// found in the working directory or the home directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        let candidates = std::iter::once(local).chain(global_config_path());
        for path in candidates {
            if path.is_file() {
                return Self::load_from(&path);
            }
        }
        Err(ConfigError::NotFound)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Check credentials and endpoint URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials()?;
        validate_url("ws_url", &self.ws_url, "wss", "ws")?;
        validate_url("api_url", &self.api_url, "https", "http")?;
        Ok(())
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Ok(Credentials { email: email.to_string(), password: password.to_string() })
            }
            _ => Err(ConfigError::MissingCredentials),
        }
    }
}

/// Push socket retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_attempts: u32,
    pub retry_delay_secs: u64,
    pub reconnect_delay_secs: u64,
    /// Re-authentications per console call; capped at 2.
    pub reauth_retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            retry_delay_secs: 3,
            reconnect_delay_secs: 3,
            reauth_retries: DEFAULT_REAUTH_RETRIES,
        }
    }
}

impl ConnectionConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            connect_attempts: self.connect_attempts.max(1),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        }
    }

    pub fn reauth_retries(&self) -> u32 {
        self.reauth_retries.min(MAX_REAUTH_RETRIES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutocompleteConfig {
    pub enabled: bool,
    /// Persisted index location, relative to the working directory unless
    /// absolute.
    pub cache_path: PathBuf,
    /// A persisted index older than this is rebuilt on startup.
    pub max_age_days: u32,
}

impl Default for AutocompleteConfig {
    fn default() -> Self {
        Self { enabled: true, cache_path: PathBuf::from(".autocomplete_data.json"), max_age_days: 5 }
    }
}

impl AutocompleteConfig {
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            path: self.cache_path.clone(),
            max_age: TimeDelta::days(i64::from(self.max_age_days)),
        }
    }
}

// ── URL rules ───────────────────────────────────────────────────────

fn validate_url(
    field: &'static str,
    value: &str,
    secure: &str,
    loopback_only: &str,
) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl { field, value: value.to_string(), reason };
    let parsed = Url::parse(value).map_err(|error| invalid(error.to_string()))?;
    let scheme = parsed.scheme();
    if scheme == secure || (scheme == loopback_only && is_loopback_host(parsed.host_str())) {
        return Ok(());
    }
    Err(invalid(format!(
        "must use {secure} ({loopback_only} is allowed only for localhost testing)"
    )))
}

fn is_loopback_host(host: Option<&str>) -> bool {
    let Some(host) = host else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>().is_ok_and(|addr| addr.is_loopback())
}
