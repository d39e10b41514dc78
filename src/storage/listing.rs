//! Directory listing
//!
//! Lists the immediate children of a directory inside a user root. Nothing
//! is cached; every call re-reads the filesystem.

use std::io;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;
use tokio::fs;

use crate::error::StorageError;
use crate::storage::node::{FileNode, sort_nodes};
use crate::storage::resolver::{RESERVED_PREFIX, resolve};
use crate::storage::root::UserRoot;

/// Result of a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    /// Normalized path of the listed directory, `""` for the root.
    pub current_path: String,
    pub tree: Vec<FileNode>,
}

/// Lists the directory at `relative_path`, folders first, then by name.
pub async fn list_directory(
    root: &UserRoot,
    relative_path: &str,
) -> Result<Listing, StorageError> {
    let dir = resolve(root, relative_path).await?;

    if !fs::metadata(dir.absolute()).await?.is_dir() {
        return Err(StorageError::NotADirectory(dir.relative().to_string()));
    }

    let mut entries = fs::read_dir(dir.absolute()).await?;
    let mut tree = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!("Skipping non UTF-8 entry {:?}", raw);
                continue;
            }
        };
        if name.starts_with(RESERVED_PREFIX) {
            continue;
        }

        let metadata = match entry_metadata(root, &entry.path()).await? {
            Some(metadata) => metadata,
            None => continue,
        };

        let path = dir.child(&name);
        if let Some(node) = FileNode::from_metadata(name, path, &metadata) {
            tree.push(node);
        }
    }

    sort_nodes(&mut tree);

    info!(
        "Listed directory '{}' - {} entries",
        dir.relative(),
        tree.len()
    );

    Ok(Listing {
        current_path: dir.relative().to_string(),
        tree,
    })
}

/// Metadata of a listed entry, following symlinks only when their target
/// stays inside the root. Entries that vanished mid-listing are skipped.
async fn entry_metadata(
    root: &UserRoot,
    path: &Path,
) -> Result<Option<std::fs::Metadata>, StorageError> {
    let link = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !link.file_type().is_symlink() {
        return Ok(Some(link));
    }

    let target = match fs::canonicalize(path).await {
        Ok(target) if root.contains(&target) => target,
        // Dangling, or pointing outside the root: not shown
        _ => return Ok(None),
    };
    match fs::metadata(&target).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
