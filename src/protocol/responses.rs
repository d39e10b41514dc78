//! Response handling
//!
//! Defines response status codes and the JSON line every request is
//! answered with.

use serde::Serialize;

use crate::storage::{FileNode, Listing};

/// Response status codes
pub const OK: u16 = 200;
pub const CREATED: u16 = 201;
pub const BAD_REQUEST: u16 = 400;
pub const UNAUTHORIZED: u16 = 401;
pub const INTERNAL_ERROR: u16 = 500;
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// One response line.
#[derive(Debug, Serialize)]
pub struct Response {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

/// Payload attached to a successful response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Listing(Listing),
    Node(FileNode),
    /// Announces `size` raw bytes following the response line.
    Transfer { name: String, size: u64 },
    Session { user: String },
}

impl Response {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(OK, message)
    }

    pub fn with_data(mut self, data: ResponseData) -> Self {
        self.data = Some(data);
        self
    }

    /// Serializes the response as a newline-terminated JSON line.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"status":{INTERNAL_ERROR},"message":"response encoding failed"}}"#)
        });
        line.push('\n');
        line
    }
}
