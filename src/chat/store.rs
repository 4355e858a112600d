//! Message store abstraction
//!
//! Sessions only see this trait, so the SQLite implementation can be swapped
//! for an in-memory or failing store in tests.

use crate::chat::error::StoreError;
use crate::chat::models::ChatMessage;
use async_trait::async_trait;

/// Persistence operations used by WebSocket sessions
///
/// Implementations must be safe for concurrent use by many sessions.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All stored messages, oldest first
    async fn fetch_history(&self) -> Result<Vec<ChatMessage>, StoreError>;

    /// Persist `text` stamped with the current time
    ///
    /// # Returns
    /// * `Ok(ChatMessage)` - the stored record
    /// * `Err(StoreError)` - the write did not happen (or its outcome is unknown)
    async fn append(&self, text: &str) -> Result<ChatMessage, StoreError>;
}
