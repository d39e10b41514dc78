//! Module `commands`
//!
//! Defines the requests a client can send and how a raw request line is
//! parsed into them. Each request is one JSON object on one line, tagged by
//! its `op` field.

use serde::Deserialize;

use crate::error::ProtocolError;

/// A request parsed from one client line.
///
/// `Upload` is followed on the wire by exactly `size` raw bytes.
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Auth {
        token: String,
    },
    List {
        #[serde(default)]
        path: String,
    },
    Upload {
        #[serde(default)]
        dir: String,
        name: String,
        size: u64,
    },
    Download {
        path: String,
    },
    Delete {
        path: String,
    },
    CreateFolder {
        #[serde(default)]
        parent: String,
        name: String,
    },
    Health,
    Quit,
}

impl Request {
    /// Operation name for logs. Never includes arguments, so tokens stay out
    /// of the log.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Auth { .. } => "auth",
            Request::List { .. } => "list",
            Request::Upload { .. } => "upload",
            Request::Download { .. } => "download",
            Request::Delete { .. } => "delete",
            Request::CreateFolder { .. } => "create_folder",
            Request::Health => "health",
            Request::Quit => "quit",
        }
    }
}

/// Represents the outcome status of executing a request.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Parses a raw request line into a [`Request`].
pub fn parse_request(line: &str) -> Result<Request, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}
