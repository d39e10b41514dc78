//! Identity-facing storage facade
//!
//! The request layer only knows identities. [`FileStore`] turns an identity
//! into its user root (creating it on first use) and runs the operation
//! against that root, so no request can name another user's directory.

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::storage::deletion::delete_path;
use crate::storage::download::{Download, open_download};
use crate::storage::folders::create_folder;
use crate::storage::listing::{Listing, list_directory};
use crate::storage::node::FileNode;
use crate::storage::root::{StorageRoot, UserIdentity};
use crate::storage::upload::{UploadPolicy, upload_file};

#[derive(Debug, Clone)]
pub struct FileStore {
    roots: StorageRoot,
}

impl FileStore {
    pub fn new(roots: StorageRoot) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &StorageRoot {
        &self.roots
    }

    pub async fn list(&self, identity: &UserIdentity, path: &str) -> Result<Listing, StorageError> {
        let root = self.roots.for_user(identity).await?;
        list_directory(&root, path).await
    }

    pub async fn upload<R>(
        &self,
        identity: &UserIdentity,
        target_dir: &str,
        file_name: &str,
        body: R,
        declared_size: Option<u64>,
        policy: &UploadPolicy,
    ) -> Result<FileNode, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let root = self.roots.for_user(identity).await?;
        upload_file(&root, target_dir, file_name, body, declared_size, policy).await
    }

    pub async fn download(
        &self,
        identity: &UserIdentity,
        path: &str,
    ) -> Result<Download, StorageError> {
        let root = self.roots.for_user(identity).await?;
        open_download(&root, path).await
    }

    pub async fn delete(
        &self,
        identity: &UserIdentity,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let root = self.roots.for_user(identity).await?;
        delete_path(&root, path, cancel).await
    }

    pub async fn create_folder(
        &self,
        identity: &UserIdentity,
        parent_dir: &str,
        name: &str,
    ) -> Result<FileNode, StorageError> {
        let root = self.roots.for_user(identity).await?;
        create_folder(&root, parent_dir, name).await
    }
}
