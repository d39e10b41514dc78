//! Path resolution
//!
//! Every client-supplied path passes through [`resolve`] before it reaches
//! the filesystem. The path is walked one segment at a time and
//! canonicalized after each step, so a symlink is followed to its real
//! target before anything beneath it is looked at, and containment in the
//! user root is checked on every intermediate location.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::StorageError;
use crate::storage::root::UserRoot;

/// Prefix of in-flight upload files. Names starting with it cannot be
/// addressed, created, or listed by clients.
pub const RESERVED_PREFIX: &str = ".filevault-upload-";

/// Longest accepted single path segment, in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

/// A location inside a user root that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
}

impl ResolvedPath {
    /// Canonical absolute path on disk. Never shown to clients.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Normalized `/`-separated path relative to the user root.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Relative path of a direct child of this location.
    pub fn child(&self, name: &str) -> String {
        if self.relative.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.relative, name)
        }
    }
}

enum Step<'a> {
    Up,
    Down(&'a str),
}

/// Resolves `raw` against `root`.
///
/// The target must exist. Fails with [`StorageError::PathTraversal`] when the
/// input is absolute or when any step would leave the root, and with
/// [`StorageError::NotFound`] when a segment does not exist.
pub async fn resolve(root: &UserRoot, raw: &str) -> Result<ResolvedPath, StorageError> {
    let steps = lexical_steps(raw)?;
    let mut current = root.path().to_path_buf();

    for step in steps {
        match step {
            Step::Up => {
                if current == root.path() {
                    return Err(StorageError::PathTraversal);
                }
                current.pop();
            }
            Step::Down(name) => {
                if name.starts_with(RESERVED_PREFIX) {
                    return Err(StorageError::NotFound(raw.to_string()));
                }
                let canonical = match fs::canonicalize(current.join(name)).await {
                    Ok(path) => path,
                    Err(e) if is_missing(&e) => {
                        return Err(StorageError::NotFound(raw.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                };
                if !root.contains(&canonical) {
                    return Err(StorageError::PathTraversal);
                }
                current = canonical;
            }
        }
    }

    let relative = relative_to(root.path(), &current);
    Ok(ResolvedPath {
        absolute: current,
        relative,
    })
}

/// Validates a client-supplied name as exactly one path segment.
pub fn validate_segment(name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidName("name is empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StorageError::PathTraversal);
    }
    if name.chars().any(char::is_control) {
        return Err(StorageError::InvalidName("name contains control characters"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(StorageError::InvalidName("name is too long"));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(StorageError::InvalidName("name is reserved"));
    }
    Ok(())
}

/// Splits `raw` into steps, rejecting absolute input and any `..` that would
/// climb above the root even before symlinks are considered.
fn lexical_steps(raw: &str) -> Result<Vec<Step<'_>>, StorageError> {
    if raw.starts_with(['/', '\\']) || raw.contains(['\\', '\0']) {
        return Err(StorageError::PathTraversal);
    }

    let mut steps = Vec::new();
    let mut depth = 0usize;

    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                depth = depth.checked_sub(1).ok_or(StorageError::PathTraversal)?;
                steps.push(Step::Up);
            }
            name => {
                depth += 1;
                steps.push(Step::Down(name));
            }
        }
    }

    Ok(steps)
}

fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}
