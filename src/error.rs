//! Error types for the plugin.

/// Top-level error type for the plugin process.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Controller host connection error (dial, send, receive).
    #[error("transport error: {0}")]
    Transport(String),

    /// Startup argument error.
    #[error("launch error: {0}")]
    Launch(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PluginError>;
