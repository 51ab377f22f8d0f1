use ccd_core::hub_rpc::DEFAULT_MAX_FRAME_BYTES;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const HUB_URL_ENV: &str = "CCD_AGENT_HUB_URL";
pub const PASSPHRASE_ENV: &str = "CCD_AGENT_HUB_PASSPHRASE";
pub const DEFAULT_HUB_URL: &str = "ws://localhost:3012";
pub const DEFAULT_PASSPHRASE: &str = "passphrase";

const DEFAULT_CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_CONNECT_POLL_ATTEMPTS: u32 = 100;
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid hub url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported hub url scheme: {0}")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub hub_url: String,
    /// Appended as the last path segment of the endpoint when non-empty.
    pub passphrase: String,
    pub connect_poll_interval: Duration,
    pub connect_poll_attempts: u32,
    pub reconnect_interval: Duration,
    /// Consecutive failed connects tolerated before the session closes for good.
    pub max_reconnect_attempts: u32,
    pub command_queue_capacity: usize,
    pub max_frame_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_URL, DEFAULT_PASSPHRASE)
    }
}

impl SessionConfig {
    pub fn new(hub_url: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            passphrase: passphrase.into(),
            connect_poll_interval: DEFAULT_CONNECT_POLL_INTERVAL,
            connect_poll_attempts: DEFAULT_CONNECT_POLL_ATTEMPTS,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Flags win over the environment, which wins over the defaults.
    pub fn resolve(hub_url: Option<String>, passphrase: Option<String>) -> Self {
        Self::new(resolve_hub_url(hub_url), resolve_passphrase(passphrase))
    }

    /// Total time `call` waits for the connection to open.
    pub fn connect_wait(&self) -> Duration {
        self.connect_poll_interval * self.connect_poll_attempts
    }

    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self.hub_url.trim();
        let raw = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("ws://{raw}")
        };
        let mut url = Url::parse(&raw).map_err(|err| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: err.to_string(),
        })?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        let passphrase = self.passphrase.trim();
        if !passphrase.is_empty() {
            url.path_segments_mut()
                .map_err(|_| ConfigError::InvalidUrl {
                    url: raw.clone(),
                    reason: "url cannot carry a path".to_string(),
                })?
                .pop_if_empty()
                .push(passphrase);
        }
        Ok(url)
    }
}

pub fn resolve_hub_url(flag: Option<String>) -> String {
    if let Some(value) = flag {
        if !value.trim().is_empty() {
            return value;
        }
    }
    if let Ok(value) = std::env::var(HUB_URL_ENV) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    DEFAULT_HUB_URL.to_string()
}

/// An explicitly empty flag disables the passphrase segment.
pub fn resolve_passphrase(flag: Option<String>) -> String {
    if let Some(value) = flag {
        return value;
    }
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        return value;
    }
    DEFAULT_PASSPHRASE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_passphrase_segment() {
        let config = SessionConfig::new("ws://localhost:3012", "secret");
        let url = config.endpoint().expect("endpoint");
        assert_eq!(url.as_str(), "ws://localhost:3012/secret");
    }

    #[test]
    fn endpoint_without_passphrase_keeps_root() {
        let config = SessionConfig::new("ws://10.0.0.5:3012/", "");
        let url = config.endpoint().expect("endpoint");
        assert_eq!(url.as_str(), "ws://10.0.0.5:3012/");
    }

    #[test]
    fn endpoint_accepts_bare_host() {
        let config = SessionConfig::new("hub.internal:3012", "pw");
        let url = config.endpoint().expect("endpoint");
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/pw");
    }

    #[test]
    fn endpoint_rejects_http_scheme() {
        let config = SessionConfig::new("http://localhost:3012", "pw");
        assert_eq!(
            config.endpoint(),
            Err(ConfigError::UnsupportedScheme("http".to_string()))
        );
    }

    #[test]
    fn defaults_wait_five_seconds_for_open() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_wait(), Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn flag_takes_precedence_over_default() {
        assert_eq!(
            resolve_hub_url(Some("ws://flag:1".to_string())),
            "ws://flag:1"
        );
        assert_eq!(resolve_passphrase(Some(String::new())), "");
    }
}
