//! Error types for dvap
//!
//! Provides a unified error type used across all dvap crates.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Main error type for dvap operations
#[derive(Debug, thiserror::Error)]
pub enum DvapError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Network Errors ===

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // === Producer Errors ===

    #[error("Event channel closed")]
    EventChannelClosed,

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DvapError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using DvapError
pub type Result<T> = std::result::Result<T, DvapError>;
