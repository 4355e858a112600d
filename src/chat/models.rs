//! Chat data models
//!
//! Defines the persisted chat message and its database row form.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A single chat message as stored in the `messages` collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Store-assigned row id, only used to order messages with equal timestamps
    pub id: i64,
    /// Message content, stored verbatim
    pub text: String,
    /// When the server persisted the message
    pub timestamp: DateTime<Utc>,
}

/// Raw row of the `messages` table
#[derive(Debug, Clone, FromRow)]
pub(crate) struct MessageRow {
    pub id: i64,
    pub message: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl MessageRow {
    /// Convert into a `ChatMessage`, `None` if the stored timestamp is out of range
    pub(crate) fn into_message(self) -> Option<ChatMessage> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.timestamp)?;
        Some(ChatMessage {
            id: self.id,
            text: self.message,
            timestamp,
        })
    }
}
