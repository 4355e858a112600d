// State management module
// Holds the shared handles passed to request handlers and sessions

pub mod app_state;

pub use app_state::AppState;
