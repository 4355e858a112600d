//! Chat database operations
//!
//! SQLite-backed implementation of [`MessageStore`]. Every operation is
//! bounded by the configured timeout.

use crate::chat::error::StoreError;
use crate::chat::models::{ChatMessage, MessageRow};
use crate::chat::store::MessageStore;
use crate::config::StoreConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database connection pool for chat messages
pub struct ChatDb {
    pool: SqlitePool,
    operation_timeout: Duration,
}

impl ChatDb {
    /// Connect to the message database and apply migrations
    ///
    /// # Arguments
    /// * `config` - Store configuration (URL, timeouts, pool size)
    ///
    /// # Returns
    /// * `Ok(ChatDb)` if successful
    /// * `Err(StoreError)` if the URL is invalid, the connection failed, or
    ///   `connect_timeout` elapsed
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let connection_string = normalize_database_url(&config.database_url)?;

        // One bound covers directory setup, pool creation and migrations
        with_timeout(
            "connect",
            config.connect_timeout(),
            Self::open(config, &connection_string),
        )
        .await
    }

    async fn open(config: &StoreConfig, connection_string: &str) -> Result<Self, StoreError> {
        let in_memory = connection_string.contains(":memory:");

        // Ensure parent directory exists
        let db_file = database_file_path(connection_string);
        if let Some(parent) = db_file
            .as_deref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Connect(format!(
                    "Failed to create db directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| StoreError::InvalidUrl(e.to_string()))?
            .create_if_missing(true);

        // Every in-memory connection is its own database, so keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
        };

        let pool = pool_options
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        info!("Connected to message database at: {}", connection_string);

        let db = Self {
            pool,
            operation_timeout: config.operation_timeout(),
        };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        debug!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_messages.sql");

        for statement in split_statements(migration_sql) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::Migration(format!(
                        "{} - Statement: {}",
                        e,
                        statement.chars().take(100).collect::<String>()
                    ))
                })?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Message database closed");
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        with_timeout(operation, self.operation_timeout, fut).await
    }

    async fn load_history(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let mut rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, message, timestamp FROM messages ORDER BY timestamp ASC, id ASC",
        )
        .fetch(&self.pool);

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await {
            match row {
                Ok(row) => {
                    let id = row.id;
                    match row.into_message() {
                        Some(message) => messages.push(message),
                        None => warn!(row_id = id, "Skipping message with invalid timestamp"),
                    }
                }
                Err(e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_))) => {
                    warn!(error = %e, "Skipping undecodable message row");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(messages)
    }

    async fn insert_message(&self, text: &str) -> Result<ChatMessage, StoreError> {
        let now = Utc::now();
        let millis = now.timestamp_millis();

        let result = sqlx::query("INSERT INTO messages (message, timestamp) VALUES (?, ?)")
            .bind(text)
            .bind(millis)
            .execute(&self.pool)
            .await?;

        let message = ChatMessage {
            id: result.last_insert_rowid(),
            text: text.to_string(),
            // Match the precision of what is read back
            timestamp: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(now),
        };

        debug!(message_id = message.id, "Stored message");
        Ok(message)
    }
}

#[async_trait]
impl MessageStore for ChatDb {
    async fn fetch_history(&self) -> Result<Vec<ChatMessage>, StoreError> {
        self.bounded("fetch_history", self.load_history()).await
    }

    async fn append(&self, text: &str) -> Result<ChatMessage, StoreError> {
        self.bounded("append", self.insert_message(text)).await
    }
}

/// Run `fut`, failing with `StoreError::Timeout` once `limit` elapses
async fn with_timeout<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout {
            operation,
            secs: limit.as_secs(),
        })?
}

/// Turn a configured URL or bare file path into an SQLite connection string
fn normalize_database_url(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidUrl("database URL is empty".to_string()));
    }
    if raw.starts_with("sqlite:") {
        return Ok(raw.to_string());
    }
    if let Some((scheme, _)) = raw.split_once("://") {
        return Err(StoreError::InvalidUrl(format!(
            "unsupported scheme '{}', expected sqlite",
            scheme
        )));
    }
    Ok(format!("sqlite:{}", raw))
}

/// File backing an SQLite connection string, `None` for in-memory databases
fn database_file_path(connection_string: &str) -> Option<PathBuf> {
    let rest = connection_string
        .strip_prefix("sqlite://")
        .or_else(|| connection_string.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Split a migration script into statements, dropping `--` comments
fn split_statements(sql: &str) -> Vec<String> {
    let mut cleaned_sql = String::new();
    for line in sql.lines() {
        let without_comments = match line.find("--") {
            Some(comment_pos) => &line[..comment_pos],
            None => line,
        };
        let trimmed = without_comments.trim();
        if trimmed.is_empty() {
            continue;
        }
        cleaned_sql.push_str(trimmed);
        cleaned_sql.push(' ');
    }

    cleaned_sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
