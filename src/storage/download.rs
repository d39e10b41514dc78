//! File retrieval

use std::io;

use log::info;
use tokio::fs::File;

use crate::error::StorageError;
use crate::storage::resolver::resolve;
use crate::storage::root::UserRoot;

/// An opened file ready to be streamed to the client.
#[derive(Debug)]
pub struct Download {
    /// Name the client should label the transfer with.
    pub name: String,
    pub size: u64,
    pub file: File,
}

/// Opens the file at `relative_path` for reading.
pub async fn open_download(root: &UserRoot, relative_path: &str) -> Result<Download, StorageError> {
    let target = resolve(root, relative_path).await?;

    let file = match File::open(target.absolute()).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(target.relative().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata().await?;
    if metadata.is_dir() {
        return Err(StorageError::IsADirectory(target.relative().to_string()));
    }

    // Label with the name the client asked for, not a symlink's target name
    let name = relative_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !matches!(*name, "" | "." | ".."))
        .or_else(|| target.relative().rsplit('/').next())
        .unwrap_or_default()
        .to_string();

    info!(
        "Prepared download of '{}' ({} bytes)",
        target.relative(),
        metadata.len()
    );

    Ok(Download {
        name,
        size: metadata.len(),
        file,
    })
}
