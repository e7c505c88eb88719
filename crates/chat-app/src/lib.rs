#![deny(unsafe_code)]

//! Desktop chat client for models served by a local Ollama instance.

/// Application shell and global actions.
pub mod app;
/// Chat domain types, rendering and the request transport.
pub mod chat;
/// Model selector component for switching local models.
pub mod model_selector;
/// Settings persistence.
pub mod settings;
