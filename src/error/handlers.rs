//! Error handlers
//!
//! Translates domain errors into response status codes and client-safe
//! messages.

use log::error;

use crate::error::types::{AuthError, ProtocolError, StorageError};

/// Convert a storage error to its response status code
pub fn storage_status(err: &StorageError) -> u16 {
    match err {
        StorageError::PathTraversal => 403,
        StorageError::NotFound(_) => 404,
        StorageError::NotADirectory(_) => 400,
        StorageError::IsADirectory(_) => 400,
        StorageError::Conflict(_) => 409,
        StorageError::Forbidden(_) => 400,
        StorageError::InvalidName(_) => 400,
        StorageError::PayloadTooLarge { .. } => 413,
        StorageError::UnsupportedFileType => 400,
        StorageError::Io(_) => 500,
    }
}

/// Message safe to send back to the client.
///
/// I/O failures are logged in full and replaced by a generic message, since
/// the underlying error may describe server-side state.
pub fn storage_message(err: &StorageError) -> String {
    match err {
        StorageError::Io(e) => {
            error!("Storage I/O failure: {}", e);
            "internal storage error".to_string()
        }
        other => other.to_string(),
    }
}

/// Convert an authentication error to its response status code
pub fn auth_status(_err: &AuthError) -> u16 {
    401
}

/// Convert a protocol error to its response status code
pub fn protocol_status(_err: &ProtocolError) -> u16 {
    400
}
