//! Store-specific error types
//!
//! Errors that can occur while connecting to or querying the message store.

use thiserror::Error;

/// Errors returned by message store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection string could not be parsed
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// Connection could not be established
    #[error("Failed to connect to database: {0}")]
    Connect(String),

    /// Schema setup failed
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Operation did not finish within its time bound
    #[error("{operation} timed out after {secs} seconds")]
    Timeout {
        /// Name of the operation that timed out
        operation: &'static str,
        /// Configured bound in seconds
        secs: u64,
    },

    /// Query failed
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),
}
