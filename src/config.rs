//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Message store configuration
    pub store: StoreConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Message store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection string for the message database
    pub database_url: String,
    /// Upper bound for establishing the connection at startup (in seconds)
    pub connect_timeout_secs: u64,
    /// Upper bound for a single history fetch or append (in seconds)
    pub operation_timeout_secs: u64,
    /// Maximum number of pooled connections
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/chatdb.sqlite".to_string(),
            connect_timeout_secs: 10,
            operation_timeout_secs: 5,
            max_connections: 5,
        }
    }
}

impl StoreConfig {
    /// Store configuration pointing at the given database, other values defaulted
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Connection timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-operation timeout as a `Duration`
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = StoreConfig::default();
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            store: StoreConfig {
                database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
                connect_timeout_secs: env::var("DB_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(defaults.connect_timeout_secs),
                operation_timeout_secs: env::var("DB_OPERATION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(defaults.operation_timeout_secs),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(defaults.max_connections),
            },
        }
    }

    /// Socket address to bind, accepting IPv4 and IPv6 hosts (bracketed or bare)
    pub fn server_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let host = self
            .server
            .host
            .trim_start_matches('[')
            .trim_end_matches(']');
        Ok(SocketAddr::new(host.parse::<IpAddr>()?, self.server.port))
    }
}
