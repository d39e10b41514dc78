//! Folder creation

use std::io;

use log::info;
use tokio::fs;

use crate::error::StorageError;
use crate::storage::node::FileNode;
use crate::storage::resolver::{resolve, validate_segment};
use crate::storage::root::UserRoot;

/// Creates the folder `parent_dir/name`.
///
/// Not idempotent: an existing entry of either kind under `name` is a
/// [`StorageError::Conflict`] and is left untouched.
pub async fn create_folder(
    root: &UserRoot,
    parent_dir: &str,
    name: &str,
) -> Result<FileNode, StorageError> {
    validate_segment(name)?;

    let parent = resolve(root, parent_dir).await?;
    if !fs::metadata(parent.absolute()).await?.is_dir() {
        return Err(StorageError::NotADirectory(parent.relative().to_string()));
    }

    let target = parent.absolute().join(name);
    let relative = parent.child(name);

    // A single mkdir: the existence check and the creation cannot interleave
    // with another request.
    match fs::create_dir(&target).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(StorageError::Conflict(relative));
        }
        Err(e) => return Err(e.into()),
    }

    let metadata = fs::metadata(&target).await?;
    info!("Created folder '{}'", relative);

    FileNode::from_metadata(name.to_string(), relative.clone(), &metadata)
        .ok_or(StorageError::NotFound(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::node::NodeKind;
    use crate::storage::root::{StorageRoot, UserIdentity};
    use std::fs as stdfs;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, UserRoot) {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageRoot::open(temp_dir.path().join("storage"))
            .await
            .unwrap();
        let root = storage.for_user(&UserIdentity::new("alice")).await.unwrap();
        (temp_dir, root)
    }

    #[tokio::test]
    async fn test_create_folder() {
        let (_tmp, root) = setup().await;

        let node = create_folder(&root, "", "projects").await.unwrap();
        assert_eq!(node.kind, NodeKind::Folder);
        assert_eq!(node.path, "projects");
        assert!(root.path().join("projects").is_dir());

        let nested = create_folder(&root, "projects", "2024").await.unwrap();
        assert_eq!(nested.path, "projects/2024");
    }

    #[tokio::test]
    async fn test_existing_folder_conflicts() {
        let (_tmp, root) = setup().await;
        stdfs::create_dir(root.path().join("docs")).unwrap();
        stdfs::write(root.path().join("docs/keep.txt"), "keep").unwrap();

        let result = create_folder(&root, "", "docs").await;
        assert!(matches!(result, Err(StorageError::Conflict(ref p)) if p == "docs"));
        assert!(root.path().join("docs/keep.txt").exists());
    }

    #[tokio::test]
    async fn test_existing_file_conflicts() {
        let (_tmp, root) = setup().await;
        stdfs::write(root.path().join("notes"), "file contents").unwrap();

        let result = create_folder(&root, "", "notes").await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
        assert_eq!(
            stdfs::read_to_string(root.path().join("notes")).unwrap(),
            "file contents"
        );
    }

    #[tokio::test]
    async fn test_invalid_names() {
        let (_tmp, root) = setup().await;

        assert!(matches!(
            create_folder(&root, "", "").await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            create_folder(&root, "", "a/b").await,
            Err(StorageError::PathTraversal)
        ));
        assert!(matches!(
            create_folder(&root, "", "..").await,
            Err(StorageError::PathTraversal)
        ));
    }

    #[tokio::test]
    async fn test_parent_must_be_valid() {
        let (_tmp, root) = setup().await;
        stdfs::write(root.path().join("file.txt"), "x").unwrap();

        assert!(matches!(
            create_folder(&root, "..", "evil").await,
            Err(StorageError::PathTraversal)
        ));
        assert!(matches!(
            create_folder(&root, "missing", "a").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            create_folder(&root, "file.txt", "a").await,
            Err(StorageError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_creation_single_winner() {
        let (_tmp, root) = setup().await;

        let (a, b) = tokio::join!(
            create_folder(&root, "", "race"),
            create_folder(&root, "", "race")
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
    }
}
