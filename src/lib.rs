//! Chat Relay Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
/// Application state management
///
/// Holds the message store handle shared by handlers and sessions.
pub mod state;
pub mod websocket;
