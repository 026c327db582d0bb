//! Client configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use crate::validation::InputLimits;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// REST backend configuration
    pub api: ApiConfig,
    /// Realtime channel configuration
    pub realtime: RealtimeConfig,
    /// Durable storage configuration
    pub storage: StorageConfig,
    /// Input validation limits
    pub limits: InputLimits,
}

/// REST backend configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the backend, without a trailing slash
    pub base_url: String,
}

/// Realtime channel configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Endpoint the realtime channel connects to
    pub endpoint: String,
    /// Reconnect attempts before the channel is declared stale
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt
    pub initial_backoff: Duration,
    /// Upper bound for any reconnect delay
    pub max_backoff: Duration,
}

/// Durable storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the persisted session record
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8001".to_string(),
            },
            realtime: RealtimeConfig {
                endpoint: "ws://localhost:8001/ws".to_string(),
                max_reconnect_attempts: 8,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_millis(30_000),
            },
            storage: StorageConfig {
                data_dir: default_data_dir(),
            },
            limits: InputLimits::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api: ApiConfig {
                base_url: env::var("CHAT_API_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.api.base_url),
            },
            realtime: RealtimeConfig {
                endpoint: env::var("CHAT_SOCKET_URL").unwrap_or(defaults.realtime.endpoint),
                max_reconnect_attempts: parse_var("CHAT_RECONNECT_ATTEMPTS")
                    .unwrap_or(defaults.realtime.max_reconnect_attempts),
                initial_backoff: parse_var("CHAT_RECONNECT_INITIAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.realtime.initial_backoff),
                max_backoff: parse_var("CHAT_RECONNECT_MAX_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.realtime.max_backoff),
            },
            storage: StorageConfig {
                data_dir: env::var_os("CHAT_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.data_dir),
            },
            limits: InputLimits {
                min_password_len: parse_var("CHAT_MIN_PASSWORD_LEN")
                    .unwrap_or(defaults.limits.min_password_len),
                ..defaults.limits
            },
        }
    }

    /// Path of the persisted session record
    pub fn session_path(&self) -> PathBuf {
        self.storage.data_dir.join("session.json")
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// Platform data directory, then the home directory, then the working directory
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("chat-client"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".chat-client")))
        .unwrap_or_else(|| PathBuf::from(".chat-client"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 7] = [
        "CHAT_API_URL",
        "CHAT_SOCKET_URL",
        "CHAT_RECONNECT_ATTEMPTS",
        "CHAT_RECONNECT_INITIAL_MS",
        "CHAT_RECONNECT_MAX_MS",
        "CHAT_DATA_DIR",
        "CHAT_MIN_PASSWORD_LEN",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.api.base_url, "http://localhost:8001");
        assert_eq!(config.realtime.endpoint, "ws://localhost:8001/ws");
        assert_eq!(config.realtime.max_reconnect_attempts, 8);
        assert_eq!(config.realtime.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.limits.max_email_len, 40);
        assert_eq!(config.limits.min_password_len, 7);
        assert!(config.session_path().ends_with("session.json"));
    }

    #[test]
    #[serial]
    fn test_default_data_dir_is_platform_data_dir() {
        clear_env();
        let config = Config::from_env();
        if let Some(data_dir) = dirs::data_dir() {
            assert_eq!(config.storage.data_dir, data_dir.join("chat-client"));
            assert!(config.session_path().is_absolute());
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("CHAT_API_URL", "https://chat.example.com/");
        env::set_var("CHAT_RECONNECT_ATTEMPTS", "3");
        env::set_var("CHAT_DATA_DIR", "/tmp/chat-test");
        env::set_var("CHAT_MIN_PASSWORD_LEN", "10");

        let config = Config::from_env();
        assert_eq!(config.api.base_url, "https://chat.example.com");
        assert_eq!(config.realtime.max_reconnect_attempts, 3);
        assert_eq!(
            config.session_path(),
            PathBuf::from("/tmp/chat-test/session.json")
        );
        assert_eq!(config.limits.min_password_len, 10);
        assert_eq!(config.limits.max_password_len, 30);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back() {
        clear_env();
        env::set_var("CHAT_RECONNECT_ATTEMPTS", "many");
        let config = Config::from_env();
        assert_eq!(config.realtime.max_reconnect_attempts, 8);
        clear_env();
    }
}
