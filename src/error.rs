//! Error types for devtools-remote.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for all devtools-remote operations.
#[derive(Debug, Error)]
pub enum DevToolsError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (payloads).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration is well-formed but not usable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Protocol error (malformed payload, bad destination, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A handler is already registered for this tool.
    #[error("tool already registered: {0}")]
    ToolAlreadyRegistered(String),

    /// Unregistration attempted with a handler other than the registered one.
    #[error("handler registered for tool {0} does not match")]
    HandlerMismatch(String),

    /// No handler registered for this tool.
    #[error("no handler registered for tool: {0}")]
    UnknownTool(String),

    /// The debugger backend rejected an operation.
    #[error("debugger error: {0}")]
    Debugger(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using DevToolsError.
pub type Result<T> = std::result::Result<T, DevToolsError>;
