//! Per-user storage roots
//!
//! The server owns one base directory; each authenticated identity gets its
//! own directory directly beneath it, created on first use and never removed
//! by the server.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::StorageError;
use crate::storage::resolver::RESERVED_PREFIX;

/// Opaque user identifier handed over by the authentication layer.
///
/// The value is only ever hashed and compared, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of this identity's directory under the storage base.
    fn directory_name(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical root directory of a single user.
///
/// Only [`StorageRoot::for_user`] hands these out, so every value refers to
/// an existing, canonicalized directory inside the storage base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRoot {
    path: PathBuf,
}

impl UserRoot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Component-wise containment check on an already canonical path.
    pub fn contains(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.path)
    }
}

/// Base directory holding every user's root.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    base: PathBuf,
}

impl StorageRoot {
    /// Opens the storage base, creating it if it does not exist yet.
    pub async fn open(base: impl AsRef<Path>) -> io::Result<Self> {
        let base = base.as_ref();
        fs::create_dir_all(base).await?;
        let base = fs::canonicalize(base).await?;
        info!("Storage base directory: {}", base.display());
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the root directory for `identity`, creating it on first use.
    ///
    /// Creation is idempotent: concurrent callers for the same identity all
    /// receive the same root.
    pub async fn for_user(&self, identity: &UserIdentity) -> Result<UserRoot, StorageError> {
        let dir = self.base.join(identity.directory_name());

        // create_dir_all treats an existing directory as success, including
        // one created by a racing caller.
        fs::create_dir_all(&dir).await?;

        let path = fs::canonicalize(&dir).await?;
        if !path.starts_with(&self.base) || !fs::metadata(&path).await?.is_dir() {
            return Err(StorageError::Io(io::Error::other(
                "user root is not a directory inside the storage base",
            )));
        }

        debug!("Resolved storage root for {}", identity);
        Ok(UserRoot { path })
    }

    /// Removes upload temporaries left behind by an interrupted process.
    ///
    /// Only safe while no uploads are running, i.e. at startup. Symlinks are
    /// never followed.
    pub async fn sweep_partial_uploads(&self) -> io::Result<usize> {
        let mut removed = 0;
        let mut pending = vec![self.base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping unreadable directory during sweep: {}", e);
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file()
                    && entry.file_name().to_string_lossy().starts_with(RESERVED_PREFIX)
                {
                    match fs::remove_file(entry.path()).await {
                        Ok(()) => removed += 1,
                        Err(e) => warn!("Failed to remove stale upload: {}", e),
                    }
                }
            }
        }

        Ok(removed)
    }
}
