//! Shared application state
//!
//! Holds the message store handle that every handler and session uses.

use crate::chat::MessageStore;
use std::sync::Arc;

/// State passed to axum handlers
#[derive(Clone)]
pub struct AppState {
    /// Store used for history replay and persistence
    pub store: Arc<dyn MessageStore>,
}

impl AppState {
    /// Create state around an already connected store
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }
}
