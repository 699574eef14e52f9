//! Client configuration.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file (`--config <path>`, else `<config dir>/pegada-chat/config.toml`)
//! 3. Environment (`PEGADA_*`, `.env` honored via dotenvy)
//! 4. CLI overrides applied by the caller
//!
//! # Example file
//!
//! ```toml
//! base_url = "http://127.0.0.1:5000"
//! timeout_ms = 30000
//! send_attempts = 3
//! retry_backoff_ms = 500
//! history_limit = 10
//! session_cookie = "session=abc123"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    ParseToml(#[from] toml::de::Error),

    #[error("Invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend root, always with a trailing slash so endpoint joins stay relative.
    pub base_url: Url,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Total attempts for `/send_message` (1 = no retry).
    pub send_attempts: u32,
    /// Backoff unit between send attempts; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Default page size for history listings.
    pub history_limit: u32,
    /// Raw `Cookie` header value for an already-authenticated backend session.
    pub session_cookie: Option<String>,
}


/// On-disk shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
    send_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    history_limit: Option<u32>,
    session_cookie: Option<String>,
}

impl ClientConfig {
    /// Built-in defaults pointing at [`DEFAULT_BASE_URL`].
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(DEFAULT_BASE_URL)?,
            request_timeout: Duration::from_secs(30),
            send_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            history_limit: 10,
            session_cookie: None,
        })
    }

    /// Load defaults, then the config file, then environment overrides.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = Self::new()?;

        let file = match path {
            Some(p) => Some(read_file(p)?),
            None => match default_config_path() {
                Some(p) if p.exists() => Some(read_file(&p)?),
                _ => None,
            },
        };
        if let Some(file) = file {
            cfg.apply_file(file)?;
        }

        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults (no env).
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::new()?;
        cfg.apply_file(toml::from_str(content)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Replace the backend root.
    pub fn set_base_url(&mut self, raw: &str) -> Result<(), ConfigError> {
        self.base_url = parse_base_url(raw)?;
        Ok(())
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(url) = file.base_url {
            self.set_base_url(&url)?;
        }
        if let Some(ms) = file.timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = file.send_attempts {
            self.send_attempts = n;
        }
        if let Some(ms) = file.retry_backoff_ms {
            self.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(n) = file.history_limit {
            self.history_limit = n;
        }
        if file.session_cookie.is_some() {
            self.session_cookie = file.session_cookie;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = dotenvy::var("PEGADA_BASE_URL") {
            self.set_base_url(&url)?;
        }
        if let Some(ms) = env_number::<u64>("PEGADA_TIMEOUT_MS")? {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_number::<u32>("PEGADA_SEND_ATTEMPTS")? {
            self.send_attempts = n;
        }
        if let Some(ms) = env_number::<u64>("PEGADA_RETRY_BACKOFF_MS")? {
            self.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(n) = env_number::<u32>("PEGADA_HISTORY_LIMIT")? {
            self.history_limit = n;
        }
        if let Ok(cookie) = dotenvy::var("PEGADA_SESSION_COOKIE") {
            self.session_cookie = Some(cookie).filter(|c| !c.trim().is_empty());
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.send_attempts == 0 {
            return Err(ConfigError::Validation(
                "send_attempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<platform config dir>/config.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "pegada-chat", "pegada-chat")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    debug!(path = %path.display(), "loading config file");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

fn env_number<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match dotenvy::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
        Err(_) => Ok(None),
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, val: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe { std::env::set_var(key, val) };
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(v) => unsafe { std::env::set_var(self.key, v) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn defaults() {
        let cfg = ClientConfig::new().unwrap();
        assert_eq!(cfg.base_url.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(cfg.send_attempts, 3);
        assert_eq!(cfg.history_limit, 10);
        assert!(cfg.session_cookie.is_none());
    }

    #[test]
    fn empty_document_keeps_builtin_defaults() {
        let cfg = ClientConfig::from_toml_str("").unwrap();
        let builtin = ClientConfig::new().unwrap();
        assert_eq!(cfg.base_url, builtin.base_url);
        assert_eq!(cfg.request_timeout, builtin.request_timeout);
        assert_eq!(cfg.retry_backoff, builtin.retry_backoff);
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg = ClientConfig::from_toml_str(
            r#"
            base_url = "https://pegada.example.com/app"
            timeout_ms = 1500
            send_attempts = 1
            session_cookie = "session=xyz"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.base_url.as_str(), "https://pegada.example.com/app/");
        assert_eq!(cfg.request_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.send_attempts, 1);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(500));
        assert_eq!(cfg.session_cookie.as_deref(), Some("session=xyz"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ClientConfig::from_toml_str("base_uri = \"http://x\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml(_)));
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = ClientConfig::from_toml_str("send_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let mut cfg = ClientConfig::new().unwrap();
        let err = cfg.set_base_url("ftp://example.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
        assert!(cfg.set_base_url("not a url").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ClientConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    #[serial]
    fn env_overrides_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "base_url = \"http://file.local:8000\"\nhistory_limit = 5\n").unwrap();

        let _url = EnvGuard::set("PEGADA_BASE_URL", "http://env.local:9000");
        let _attempts = EnvGuard::set("PEGADA_SEND_ATTEMPTS", "5");

        let cfg = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.base_url.as_str(), "http://env.local:9000/");
        assert_eq!(cfg.send_attempts, 5);
        assert_eq!(cfg.history_limit, 5);
    }

    #[test]
    #[serial]
    fn bad_env_number_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let _guard = EnvGuard::set("PEGADA_TIMEOUT_MS", "soon");
        let err = ClientConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                key: "PEGADA_TIMEOUT_MS",
                ..
            }
        ));
    }
}
