//! Server Configuration
//!
//! Everything comes from environment variables (`.env` is loaded first by
//! `main`). Payment settings are read by the payment types themselves.

use std::time::Duration;

use contacts_core::RetryPolicy;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Where credits and contacts are kept
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { url: String, max_connections: u32 },
    /// Process-local maps, for development and tests
    Memory,
}

impl StoreBackend {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::Memory => "memory",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub store: StoreBackend,
    pub jwt_secret: Option<String>,
    pub retry: RetryPolicy,
    /// `None` allows any origin
    pub cors_origin: Option<String>,
    pub session_refresh_leeway: chrono::Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store = match get("STORE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StoreBackend::Postgres {
                url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let retry = RetryPolicy::new(
            parse_or(&get, "RETRY_MAX_ATTEMPTS", 3)?,
            Duration::from_millis(parse_or(&get, "RETRY_BASE_DELAY_MS", 200)?),
            Duration::from_millis(parse_or(&get, "REQUEST_TIMEOUT_MS", 10_000)?),
        );

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            store,
            jwt_secret: get("AUTH_JWT_SECRET"),
            retry,
            cors_origin: get("CORS_ALLOW_ORIGIN").filter(|o| o != "*"),
            session_refresh_leeway: chrono::Duration::seconds(parse_or(
                &get,
                "SESSION_REFRESH_LEEWAY_SECS",
                300,
            )?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
