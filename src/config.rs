//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api/v1";
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STORAGE_PATH: &str = ".terra/session.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid TERRA_API_URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraConfig {
    /// Base URL of the internal API, e.g. `http://localhost:3000/api/v1`.
    pub api_url: Url,
    /// Idle time after which an authenticated session is closed.
    pub session_timeout: Duration,
    pub request_timeout: Duration,
    /// JSON file backing the token store for the CLI.
    pub storage_path: PathBuf,
}

impl TerraConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `TERRA_API_URL`: default `http://localhost:3000/api/v1`
    /// - `TERRA_SESSION_TIMEOUT_SECS`: default 1800
    /// - `TERRA_REQUEST_TIMEOUT_SECS`: default 30
    /// - `TERRA_STORAGE_PATH`: default `.terra/session.json`
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = std::env::var("TERRA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let api_url = parse_api_url(&raw_url)?;
        let storage_path = std::env::var("TERRA_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH));

        Ok(Self {
            api_url,
            session_timeout: Duration::from_secs(env_parse_u64("TERRA_SESSION_TIMEOUT_SECS", DEFAULT_SESSION_TIMEOUT_SECS)),
            request_timeout: Duration::from_secs(env_parse_u64("TERRA_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)),
            storage_path,
        })
    }

    /// Config pointing at `api_url` with default timeouts.
    pub fn with_api_url(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
        })
    }

    /// Resolve an API path (`"/pagos"`, `"auth/login"`) against the base URL.
    ///
    /// Absolute URLs are returned unchanged so callers can reach third-party hosts.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path)
                .map_err(|e| ConfigError::InvalidApiUrl { url: path.to_owned(), reason: e.to_string() });
        }
        self.api_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidApiUrl { url: path.to_owned(), reason: e.to_string() })
    }
}

/// Parse the base URL, forcing a trailing slash so relative joins append.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(&format!("{trimmed}/"))
        .map_err(|e| ConfigError::InvalidApiUrl { url: raw.to_owned(), reason: e.to_string() })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidApiUrl { url: raw.to_owned(), reason: "expected an http(s) base URL".into() });
    }
    Ok(url)
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
