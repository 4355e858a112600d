//! Chat module
//!
//! Handles chat message storage using an SQLite database.

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use db::ChatDb;
pub use error::StoreError;
pub use models::ChatMessage;
pub use store::MessageStore;
