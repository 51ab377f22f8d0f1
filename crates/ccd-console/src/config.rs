use ccd_session::config::{resolve_hub_url, resolve_passphrase};
use ccd_session::SessionConfig;

pub const TITLE_ENV: &str = "CCD_TITLE";
pub const LOG_FILE_HOST_ENV: &str = "CCD_LOG_FILE_HOST";
pub const LOG_DIR_ENV: &str = "CCD_LOG_DIR";
pub const DEFAULT_TITLE: &str = "CodeChain Dashboard";

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub session: SessionConfig,
    pub title: String,
    /// Base URL under which each agent's raw log file is served.
    pub log_file_host: Option<String>,
    /// Empty disables the log file.
    pub log_dir: String,
}

impl ConsoleConfig {
    pub fn resolve(
        hub_url: Option<String>,
        passphrase: Option<String>,
        log_dir: Option<String>,
    ) -> Self {
        Self {
            session: SessionConfig::new(resolve_hub_url(hub_url), resolve_passphrase(passphrase)),
            title: pick(None, std::env::var(TITLE_ENV).ok()).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            log_file_host: pick(None, std::env::var(LOG_FILE_HOST_ENV).ok()),
            log_dir: pick(log_dir, std::env::var(LOG_DIR_ENV).ok()).unwrap_or_default(),
        }
    }

    pub fn log_file_link(&self, node: &str) -> Option<String> {
        self.log_file_host
            .as_deref()
            .map(|host| format!("{}/{}", host.trim_end_matches('/'), node))
    }
}

/// Flag first, then env. Blank values count as unset.
fn pick(flag: Option<String>, env: Option<String>) -> Option<String> {
    flag.filter(|value| !value.trim().is_empty())
        .or_else(|| env.filter(|value| !value.trim().is_empty()))
        .map(|value| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(log_file_host: Option<&str>) -> ConsoleConfig {
        ConsoleConfig {
            session: SessionConfig::new("ws://localhost:3012", "passphrase"),
            title: DEFAULT_TITLE.to_string(),
            log_file_host: log_file_host.map(str::to_string),
            log_dir: String::new(),
        }
    }

    #[test]
    fn flag_beats_env_and_blanks_are_ignored() {
        assert_eq!(
            pick(Some("/tmp/a".to_string()), Some("/tmp/b".to_string())),
            Some("/tmp/a".to_string())
        );
        assert_eq!(
            pick(Some("  ".to_string()), Some(" /tmp/b ".to_string())),
            Some("/tmp/b".to_string())
        );
        assert_eq!(pick(None, Some(String::new())), None);
    }

    #[test]
    fn log_file_link_joins_host_and_node() {
        let with_host = config(Some("http://logs.example:5000/"));
        assert_eq!(
            with_host.log_file_link("alice").as_deref(),
            Some("http://logs.example:5000/alice")
        );
        assert_eq!(config(None).log_file_link("alice"), None);
    }
}
