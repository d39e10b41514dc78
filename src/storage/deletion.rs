//! File and folder deletion
//!
//! Files are unlinked, folders are removed with their whole subtree. Subtree
//! removal checks a cancellation token between entries; a cancelled or
//! failed removal reports how far it got as an I/O error instead of
//! pretending nothing happened.

use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::storage::resolver::{ResolvedPath, resolve, validate_segment};
use crate::storage::root::UserRoot;

/// Deletes the file or folder at `relative_path`.
///
/// A symlink is removed itself, never what it points to. The user root can
/// not be deleted.
pub async fn delete_path(
    root: &UserRoot,
    relative_path: &str,
    cancel: &CancellationToken,
) -> Result<(), StorageError> {
    // Checked before resolving: a link pointing at the root is still just a link
    if let Some((link, relative)) = link_entry(root, relative_path).await? {
        fs::remove_file(&link).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(relative.clone())
            } else {
                StorageError::Io(e)
            }
        })?;
        info!("Deleted link '{}'", relative);
        return Ok(());
    }

    let target = resolve(root, relative_path).await?;
    if target.is_root() {
        warn!("Refused to delete a storage root");
        return Err(StorageError::Forbidden("cannot delete the storage root"));
    }

    let victim = target.absolute();
    let metadata = fs::symlink_metadata(victim)
        .await
        .map_err(|e| gone(e, &target))?;

    if metadata.is_dir() {
        remove_subtree(victim, cancel).await?;
    } else {
        fs::remove_file(victim).await.map_err(|e| gone(e, &target))?;
    }

    info!("Deleted '{}'", target.relative());
    Ok(())
}

/// If the last segment of `raw` names a symlink, returns the link's own
/// path inside its (already validated) parent, with its relative path.
async fn link_entry(
    root: &UserRoot,
    raw: &str,
) -> Result<Option<(PathBuf, String)>, StorageError> {
    let trimmed = raw.trim_end_matches('/');
    let (parent, name) = match trimmed.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", trimmed),
    };
    if validate_segment(name).is_err() {
        return Ok(None);
    }

    let parent = resolve(root, parent).await?;
    let candidate = parent.absolute().join(name);
    match fs::symlink_metadata(&candidate).await {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            Ok(Some((candidate, parent.child(name))))
        }
        _ => Ok(None),
    }
}

fn gone(e: io::Error, target: &ResolvedPath) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(target.relative().to_string())
    } else {
        StorageError::Io(e)
    }
}

/// Removes `dir` and everything beneath it without following symlinks.
async fn remove_subtree(dir: &Path, cancel: &CancellationToken) -> Result<(), StorageError> {
    let mut removed = 0u64;
    // (path, children already removed)
    let mut pending = vec![(dir.to_path_buf(), false)];

    while let Some((path, emptied)) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(partial(
                io::Error::new(io::ErrorKind::Interrupted, "deletion cancelled"),
                removed,
            ));
        }

        if emptied {
            match fs::remove_dir(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(partial(e, removed)),
            }
            continue;
        }

        pending.push((path.clone(), true));

        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(partial(e, removed)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(|e| partial(e, removed))? {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(partial(e, removed)),
            };

            if file_type.is_dir() {
                pending.push((entry.path(), false));
                continue;
            }

            if cancel.is_cancelled() {
                return Err(partial(
                    io::Error::new(io::ErrorKind::Interrupted, "deletion cancelled"),
                    removed,
                ));
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(partial(e, removed)),
            }
        }
    }

    Ok(())
}

fn partial(e: io::Error, removed: u64) -> StorageError {
    if removed > 0 {
        warn!("Subtree deletion stopped after {} entries: {}", removed, e);
        StorageError::Io(io::Error::new(
            e.kind(),
            format!("{e}; subtree partially removed ({removed} entries)"),
        ))
    } else {
        StorageError::Io(e)
    }
}
