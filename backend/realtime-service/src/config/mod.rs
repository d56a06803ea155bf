use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub push: PushConfig,
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Absent means the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub push_url: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Items per gateway call, capped at the Expo request limit.
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    /// Total attempts per request, first send included.
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub gateway_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                env: "development".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
            },
            push: PushConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            push_url: expo_push::DEFAULT_PUSH_URL.to_string(),
            access_token: None,
            batch_size: 50,
            flush_interval_ms: 200,
            max_attempts: 3,
            backoff_ms: 1000,
            max_backoff_ms: 30_000,
            gateway_timeout_ms: 10_000,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

impl PushConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > expo_push::MAX_MESSAGES_PER_REQUEST {
            return Err(AppError::Config(format!(
                "PUSH_BATCH_SIZE must be between 1 and {}",
                expo_push::MAX_MESSAGES_PER_REQUEST
            )));
        }
        if self.max_attempts == 0 {
            return Err(AppError::Config("PUSH_MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.gateway_timeout_ms == 0 {
            return Err(AppError::Config("PUSH_GATEWAY_TIMEOUT_MS must be positive".into()));
        }
        if self.max_backoff_ms < self.backoff_ms {
            return Err(AppError::Config(
                "PUSH_MAX_BACKOFF_MS must not be below PUSH_BACKOFF_MS".into(),
            ));
        }
        Ok(())
    }
}

impl WebSocketConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    /// A client must get at least one ping before it can time out.
    fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(AppError::Config(
                "WS_HEARTBEAT_INTERVAL_SECS must be positive".into(),
            ));
        }
        if self.client_timeout_secs <= self.heartbeat_interval_secs {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let push_defaults = PushConfig::default();
        let ws_defaults = WebSocketConfig::default();

        let config = Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: env_or("APP_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
                max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            },
            push: PushConfig {
                push_url: std::env::var("EXPO_PUSH_URL").unwrap_or(push_defaults.push_url),
                access_token: std::env::var("EXPO_ACCESS_TOKEN").ok().filter(|v| !v.is_empty()),
                batch_size: env_or("PUSH_BATCH_SIZE", push_defaults.batch_size)?,
                flush_interval_ms: env_or("PUSH_FLUSH_INTERVAL_MS", push_defaults.flush_interval_ms)?,
                max_attempts: env_or("PUSH_MAX_ATTEMPTS", push_defaults.max_attempts)?,
                backoff_ms: env_or("PUSH_BACKOFF_MS", push_defaults.backoff_ms)?,
                max_backoff_ms: env_or("PUSH_MAX_BACKOFF_MS", push_defaults.max_backoff_ms)?,
                gateway_timeout_ms: env_or("PUSH_GATEWAY_TIMEOUT_MS", push_defaults.gateway_timeout_ms)?,
            },
            websocket: WebSocketConfig {
                heartbeat_interval_secs: env_or(
                    "WS_HEARTBEAT_INTERVAL_SECS",
                    ws_defaults.heartbeat_interval_secs,
                )?,
                client_timeout_secs: env_or("WS_CLIENT_TIMEOUT_SECS", ws_defaults.client_timeout_secs)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.push.validate()?;
        self.websocket.validate()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has invalid value {raw:?}"))),
        Err(_) => Ok(default),
    }
}
