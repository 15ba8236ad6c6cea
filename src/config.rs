use crate::error::{ChatError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Relay configuration
    pub relay: RelayConfig,
    /// Logging configuration
    pub log: LogConfig,
}

/// How the relay learns about new connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptMode {
    /// Listener is part of the readiness set; accepts are event-driven
    #[default]
    Event,
    /// Non-blocking accept between bounded readiness waits
    Poll,
}

impl AcceptMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "event" | "events" => Some(Self::Event),
            "poll" | "polling" => Some(Self::Poll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Rendezvous socket path (default: .chatsock)
    pub socket_path: PathBuf,
    /// Registry capacity (default: 10)
    pub max_participants: usize,
    /// Accept strategy (default: event)
    pub accept_mode: AcceptMode,
    /// Bounded wait used in poll mode (default: 100ms)
    pub poll_interval: Duration,
    /// Pending output allowed per recipient before it is dropped
    pub max_pending_bytes: usize,
    /// Delay after a failed wait or accept, so a persistent failure cannot spin
    pub error_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(".chatsock"),
            max_participants: 10,
            accept_mode: AcceptMode::Event,
            poll_interval: Duration::from_millis(100),
            max_pending_bytes: 64 * 1024,
            error_backoff: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let accept_raw = get_env_or("CHATSOCK_ACCEPT_MODE", "event");
        let accept_mode = AcceptMode::parse(&accept_raw).ok_or_else(|| {
            ChatError::InvalidConfig(format!(
                "CHATSOCK_ACCEPT_MODE must be 'event' or 'poll', got '{}'",
                accept_raw
            ))
        })?;

        let max_participants: usize = get_env_or("CHATSOCK_MAX_PARTICIPANTS", "10")
            .parse()
            .map_err(|_| {
                ChatError::InvalidConfig("CHATSOCK_MAX_PARTICIPANTS must be a valid number".into())
            })?;
        if max_participants == 0 {
            return Err(ChatError::InvalidConfig(
                "CHATSOCK_MAX_PARTICIPANTS must be at least 1".into(),
            ));
        }

        Ok(Config {
            relay: RelayConfig {
                socket_path: PathBuf::from(get_env_or("CHATSOCK_PATH", ".chatsock")),
                max_participants,
                accept_mode,
                poll_interval: Duration::from_millis(parse_env("CHATSOCK_POLL_INTERVAL_MS", 100)?),
                max_pending_bytes: parse_env("CHATSOCK_MAX_PENDING_BYTES", 64 * 1024)?,
                error_backoff: Duration::from_millis(parse_env("CHATSOCK_ERROR_BACKOFF_MS", 10)?),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Default tracing filter derived from the configured level
    pub fn log_filter(&self) -> String {
        format!("chatsock={}", self.log.level)
    }

    /// Whether logs should be emitted as JSON lines
    pub fn log_json(&self) -> bool {
        self.log.format.eq_ignore_ascii_case("json")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ChatError::InvalidConfig(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "CHATSOCK_PATH",
        "CHATSOCK_MAX_PARTICIPANTS",
        "CHATSOCK_ACCEPT_MODE",
        "CHATSOCK_POLL_INTERVAL_MS",
        "CHATSOCK_MAX_PENDING_BYTES",
        "CHATSOCK_ERROR_BACKOFF_MS",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.relay.socket_path, PathBuf::from(".chatsock"));
        assert_eq!(config.relay.max_participants, 10);
        assert_eq!(config.relay.accept_mode, AcceptMode::Event);
        assert_eq!(config.relay.poll_interval, Duration::from_millis(100));
        assert_eq!(config.relay.max_pending_bytes, 65536);
        assert_eq!(config.log.level, "info");
        assert!(!config.log_json());
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHATSOCK_PATH", "/tmp/room.sock");
        env::set_var("CHATSOCK_MAX_PARTICIPANTS", "3");
        env::set_var("CHATSOCK_ACCEPT_MODE", "poll");
        env::set_var("CHATSOCK_POLL_INTERVAL_MS", "250");
        env::set_var("LOG_LEVEL", "debug");
        env::set_var("LOG_FORMAT", "JSON");

        let config = Config::from_env().unwrap();

        assert_eq!(config.relay.socket_path, PathBuf::from("/tmp/room.sock"));
        assert_eq!(config.relay.max_participants, 3);
        assert_eq!(config.relay.accept_mode, AcceptMode::Poll);
        assert_eq!(config.relay.poll_interval, Duration::from_millis(250));
        assert_eq!(config.log_filter(), "chatsock=debug");
        assert!(config.log_json());
    }

    #[test]
    fn test_config_from_env_invalid_capacity() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHATSOCK_MAX_PARTICIPANTS", "many");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));

        env::set_var("CHATSOCK_MAX_PARTICIPANTS", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_accept_mode() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHATSOCK_ACCEPT_MODE", "sometimes");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_interval() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHATSOCK_POLL_INTERVAL_MS", "-5");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));
    }

    #[test]
    fn test_accept_mode_round_trip_names() {
        assert_eq!(AcceptMode::parse("EVENT"), Some(AcceptMode::Event));
        assert_eq!(AcceptMode::parse("polling"), Some(AcceptMode::Poll));
        assert_eq!(AcceptMode::parse("select"), None);
        assert_eq!(AcceptMode::Poll.as_str(), "poll");
    }
}
