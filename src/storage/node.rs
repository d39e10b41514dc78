//! Storage result types
//!
//! Defines the values returned to clients by storage operations.

use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

/// Kind of a directory entry.
///
/// Declaration order is the listing order: folders sort before files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// A file or folder inside a user root, described from live metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    /// `/`-separated path relative to the user root.
    pub path: String,
    pub kind: NodeKind,
    /// Size in bytes, files only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(serialize_with = "unix_seconds")]
    pub modified: SystemTime,
}

impl FileNode {
    /// Builds a node from already-followed metadata.
    ///
    /// Returns `None` for entries that are neither regular files nor
    /// directories (sockets, devices, fifos).
    pub fn from_metadata(name: String, path: String, metadata: &Metadata) -> Option<Self> {
        let (kind, size) = if metadata.is_dir() {
            (NodeKind::Folder, None)
        } else if metadata.is_file() {
            (NodeKind::File, Some(metadata.len()))
        } else {
            return None;
        };

        Some(Self {
            name,
            path,
            kind,
            size,
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        })
    }
}

/// Orders nodes folders first, then by name, case-sensitively.
pub fn sort_nodes(nodes: &mut [FileNode]) {
    nodes.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
}

fn unix_seconds<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    serializer.serialize_u64(secs)
}
