//! Error types
//!
//! Defines domain-specific error types for each module of the file server.

use std::io;

use thiserror::Error;

/// Storage engine errors
///
/// Variants that describe a security rejection carry no path at all, so
/// their `Display` output can be shown to a client as-is.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("access denied: invalid path")]
    PathTraversal,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("operation not permitted: {0}")]
    Forbidden(&'static str),

    #[error("invalid name: {0}")]
    InvalidName(&'static str),

    #[error("file too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("file type not allowed")]
    UnsupportedFileType,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// True for rejections caused by hostile or out-of-bounds input.
    pub fn is_security_violation(&self) -> bool {
        matches!(self, StorageError::PathTraversal | StorageError::Forbidden(_))
    }
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token")]
    MalformedToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("not authenticated")]
    NotAuthenticated,
}

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request line too long (max {max} bytes)")]
    RequestTooLong { max: usize },

    #[error("request is not valid UTF-8")]
    InvalidEncoding,

    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors raised while starting or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("storage root unavailable: {0}")]
    StorageRoot(io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
