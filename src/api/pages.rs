//! Static page and health endpoints

use axum::response::{Html, Json};
use serde::Serialize;

/// Chat page served at `/`
const CHAT_PAGE: &str = include_str!("../../templates/chat.html");

/// Health check response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the server is answering
    pub status: String,
    /// Crate version
    pub version: String,
    /// Human readable status
    pub message: String,
}

/// GET / - Chat page
pub async fn index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

/// GET /api/health - Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "Chat relay is healthy".to_string(),
    })
}
