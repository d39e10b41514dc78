//! Atomic uploads
//!
//! Incoming bytes are written to a temporary file in the destination
//! directory and renamed over the final name only after the whole stream was
//! received, flushed, and synced. Readers never see a partially written file
//! under the final name. Uploading onto an existing file replaces it.

use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::node::FileNode;
use crate::storage::resolver::{RESERVED_PREFIX, resolve, validate_segment};
use crate::storage::root::UserRoot;

const BUFFER_SIZE: usize = 64 * 1024;

/// Limits applied to every upload.
#[derive(Debug, Clone, Default)]
pub struct UploadPolicy {
    /// Largest accepted upload in bytes. `None` means unlimited.
    pub max_bytes: Option<u64>,
    /// Accepted file extensions, lowercase without the dot. Empty accepts
    /// everything.
    pub allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    fn check_name(&self, file_name: &str) -> Result<(), StorageError> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let extension = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return Err(StorageError::UnsupportedFileType),
        };
        if self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            Ok(())
        } else {
            Err(StorageError::UnsupportedFileType)
        }
    }

    fn check_size(&self, size: u64) -> Result<(), StorageError> {
        match self.max_bytes {
            Some(limit) if size > limit => Err(StorageError::PayloadTooLarge { limit }),
            _ => Ok(()),
        }
    }
}

/// Temporary upload file, removed on drop unless persisted.
///
/// The drop path covers a cancelled upload future; regular failures call
/// [`PartialUpload::discard`].
struct PartialUpload {
    path: PathBuf,
    armed: bool,
}

impl PartialUpload {
    async fn create(dir: &Path) -> io::Result<(Self, File)> {
        let path = dir.join(format!("{}{}.part", RESERVED_PREFIX, Uuid::new_v4().simple()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((Self { path, armed: true }, file))
    }

    async fn discard(mut self) {
        self.armed = false;
        if let Err(e) = fs::remove_file(&self.path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove partial upload: {}", e);
            }
        }
    }

    fn persist(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Stores `body` as `target_dir/file_name` inside `root`.
///
/// When `declared_size` is given, a stream that ends early is treated as a
/// disconnect and fails with [`StorageError::Io`]. On any failure the final
/// destination is left as it was.
pub async fn upload_file<R>(
    root: &UserRoot,
    target_dir: &str,
    file_name: &str,
    mut body: R,
    declared_size: Option<u64>,
    policy: &UploadPolicy,
) -> Result<FileNode, StorageError>
where
    R: AsyncRead + Unpin,
{
    validate_segment(file_name)?;
    policy.check_name(file_name)?;
    if let Some(size) = declared_size {
        policy.check_size(size)?;
    }

    let dir = resolve(root, target_dir).await?;
    if !fs::metadata(dir.absolute()).await?.is_dir() {
        return Err(StorageError::NotADirectory(dir.relative().to_string()));
    }

    let final_path = dir.absolute().join(file_name);
    let relative = dir.child(file_name);
    if let Ok(existing) = fs::symlink_metadata(&final_path).await {
        if existing.is_dir() {
            return Err(StorageError::Conflict(relative));
        }
    }

    let (partial, mut file) = PartialUpload::create(dir.absolute()).await?;

    let received = match write_body(&mut file, &mut body, declared_size, policy).await {
        Ok(received) => received,
        Err(e) => {
            drop(file);
            partial.discard().await;
            warn!("Upload to '{}' aborted: {}", relative, e);
            return Err(e);
        }
    };

    // Metadata is taken before the rename: size and mtime carry over, and a
    // concurrent delete right after the rename must not fail this upload.
    let metadata = match file.metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            drop(file);
            partial.discard().await;
            return Err(e.into());
        }
    };
    drop(file);

    if let Err(e) = fs::rename(&partial.path, &final_path).await {
        partial.discard().await;
        return Err(e.into());
    }
    partial.persist();

    info!("Stored upload '{}' ({} bytes)", relative, received);

    FileNode::from_metadata(file_name.to_string(), relative.clone(), &metadata)
        .ok_or(StorageError::NotFound(relative))
}

async fn write_body<R>(
    file: &mut File,
    body: &mut R,
    declared_size: Option<u64>,
    policy: &UploadPolicy,
) -> Result<u64, StorageError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut received = 0u64;

    loop {
        // A declared body ends at its size even if the stream stays open
        let want = match declared_size {
            Some(declared) => {
                let remaining = declared - received;
                if remaining == 0 {
                    break;
                }
                usize::try_from(remaining).map_or(buffer.len(), |r| r.min(buffer.len()))
            }
            None => buffer.len(),
        };

        let n = body.read(&mut buffer[..want]).await?;
        if n == 0 {
            break;
        }

        // Check limits before writing (fail fast)
        received += n as u64;
        policy.check_size(received)?;

        file.write_all(&buffer[..n]).await?;
    }

    if let Some(declared) = declared_size {
        if received != declared {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after {received} of {declared} bytes"),
            )));
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::listing::list_directory;
    use crate::storage::root::{StorageRoot, UserIdentity};
    use std::time::Duration;
    use std::fs as stdfs;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    async fn setup() -> (TempDir, UserRoot) {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageRoot::open(temp_dir.path().join("storage"))
            .await
            .unwrap();
        let root = storage.for_user(&UserIdentity::new("alice")).await.unwrap();
        (temp_dir, root)
    }

    fn leftover_partials(dir: &Path) -> usize {
        stdfs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(RESERVED_PREFIX))
            .count()
    }

    /// Yields `data`, then fails like a dropped connection.
    struct BrokenStream {
        data: Vec<u8>,
        sent: bool,
    }

    impl AsyncRead for BrokenStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            self.sent = true;
            let data = std::mem::take(&mut self.data);
            buf.put_slice(&data);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_upload_creates_file() {
        let (_tmp, root) = setup().await;
        stdfs::create_dir(root.path().join("docs")).unwrap();

        let node = upload_file(
            &root,
            "docs",
            "hello.txt",
            &b"Hello, world"[..],
            Some(12),
            &UploadPolicy::unrestricted(),
        )
        .await
        .unwrap();

        assert_eq!(node.name, "hello.txt");
        assert_eq!(node.path, "docs/hello.txt");
        assert_eq!(node.size, Some(12));
        assert_eq!(
            stdfs::read(root.path().join("docs/hello.txt")).unwrap(),
            b"Hello, world"
        );
        assert_eq!(leftover_partials(&root.path().join("docs")), 0);
    }

    #[tokio::test]
    async fn test_upload_without_declared_size() {
        let (_tmp, root) = setup().await;

        let node = upload_file(
            &root,
            "",
            "empty.txt",
            &b""[..],
            None,
            &UploadPolicy::unrestricted(),
        )
        .await
        .unwrap();

        assert_eq!(node.size, Some(0));
        assert!(root.path().join("empty.txt").is_file());
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_file() {
        let (_tmp, root) = setup().await;
        stdfs::write(root.path().join("report.txt"), "old contents").unwrap();

        upload_file(
            &root,
            "",
            "report.txt",
            &b"new"[..],
            Some(3),
            &UploadPolicy::unrestricted(),
        )
        .await
        .unwrap();

        assert_eq!(stdfs::read(root.path().join("report.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_upload_onto_folder_conflicts() {
        let (_tmp, root) = setup().await;
        stdfs::create_dir(root.path().join("docs")).unwrap();

        let result = upload_file(
            &root,
            "",
            "docs",
            &b"x"[..],
            Some(1),
            &UploadPolicy::unrestricted(),
        )
        .await;

        assert!(matches!(result, Err(StorageError::Conflict(_))));
        assert!(root.path().join("docs").is_dir());
    }

    #[tokio::test]
    async fn test_broken_stream_leaves_destination_untouched() {
        let (_tmp, root) = setup().await;
        stdfs::write(root.path().join("data.bin"), "original").unwrap();

        let body = BrokenStream {
            data: b"partial".to_vec(),
            sent: false,
        };
        let result = upload_file(
            &root,
            "",
            "data.bin",
            body,
            None,
            &UploadPolicy::unrestricted(),
        )
        .await;

        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(stdfs::read(root.path().join("data.bin")).unwrap(), b"original");
        assert_eq!(leftover_partials(root.path()), 0);
    }

    #[tokio::test]
    async fn test_short_stream_is_a_disconnect() {
        let (_tmp, root) = setup().await;

        let result = upload_file(
            &root,
            "",
            "short.bin",
            &b"abc"[..],
            Some(10),
            &UploadPolicy::unrestricted(),
        )
        .await;

        match result {
            Err(StorageError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected I/O error, got {other:?}"),
        }
        assert!(!root.path().join("short.bin").exists());
        assert_eq!(leftover_partials(root.path()), 0);
    }

    #[tokio::test]
    async fn test_size_limit() {
        let (_tmp, root) = setup().await;
        let policy = UploadPolicy {
            max_bytes: Some(4),
            allowed_extensions: Vec::new(),
        };

        // Declared too large: rejected before reading
        let result = upload_file(&root, "", "a.bin", &b"12345"[..], Some(5), &policy).await;
        assert!(matches!(
            result,
            Err(StorageError::PayloadTooLarge { limit: 4 })
        ));

        // Undeclared: rejected while streaming
        let result = upload_file(&root, "", "b.bin", &b"12345"[..], None, &policy).await;
        assert!(matches!(result, Err(StorageError::PayloadTooLarge { .. })));
        assert!(!root.path().join("b.bin").exists());
        assert_eq!(leftover_partials(root.path()), 0);
    }

    #[tokio::test]
    async fn test_extension_allow_list() {
        let (_tmp, root) = setup().await;
        let policy = UploadPolicy {
            max_bytes: None,
            allowed_extensions: vec!["txt".into(), "pdf".into()],
        };

        assert!(
            upload_file(&root, "", "Notes.TXT", &b"x"[..], Some(1), &policy)
                .await
                .is_ok()
        );
        for name in ["script.sh", "noextension", ".txt"] {
            let result = upload_file(&root, "", name, &b"x"[..], Some(1), &policy).await;
            assert!(
                matches!(result, Err(StorageError::UnsupportedFileType)),
                "{name} was accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_hostile_file_names() {
        let (_tmp, root) = setup().await;

        for name in ["../escape.txt", "a/b.txt", "..", "."] {
            let result = upload_file(
                &root,
                "",
                name,
                &b"x"[..],
                Some(1),
                &UploadPolicy::unrestricted(),
            )
            .await;
            assert!(
                matches!(result, Err(StorageError::PathTraversal)),
                "{name} was accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_target_dir_must_exist() {
        let (_tmp, root) = setup().await;

        let result = upload_file(
            &root,
            "missing",
            "a.txt",
            &b"x"[..],
            Some(1),
            &UploadPolicy::unrestricted(),
        )
        .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));

        let result = upload_file(
            &root,
            "../..",
            "a.txt",
            &b"x"[..],
            Some(1),
            &UploadPolicy::unrestricted(),
        )
        .await;
        assert!(matches!(result, Err(StorageError::PathTraversal)));
    }

    #[tokio::test]
    async fn test_cancelled_upload_removes_partial_file() {
        let (_tmp, root) = setup().await;
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"first chunk").await.unwrap();

        // The body never finishes, so the upload is still pending at timeout
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            upload_file(
                &root,
                "",
                "slow.bin",
                server,
                Some(1024),
                &UploadPolicy::unrestricted(),
            ),
        )
        .await;

        assert!(result.is_err());
        assert!(!root.path().join("slow.bin").exists());
        assert_eq!(leftover_partials(root.path()), 0);
        drop(client);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_last_writer_wins() {
        let (_tmp, root) = setup().await;
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 256 * 1024]).collect();

        let mut tasks = Vec::new();
        for payload in payloads.clone() {
            let root = root.clone();
            tasks.push(tokio::spawn(async move {
                let size = payload.len() as u64;
                upload_file(
                    &root,
                    "",
                    "shared.bin",
                    &payload[..],
                    Some(size),
                    &UploadPolicy::unrestricted(),
                )
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = stdfs::read(root.path().join("shared.bin")).unwrap();
        assert!(payloads.contains(&stored));
        assert_eq!(leftover_partials(root.path()), 0);
    }

    #[tokio::test]
    async fn test_listing_never_sees_upload_in_progress() {
        let (_tmp, root) = setup().await;
        let (mut client, server) = tokio::io::duplex(64);

        let upload_root = root.clone();
        let upload = tokio::spawn(async move {
            upload_file(
                &upload_root,
                "",
                "growing.txt",
                server,
                Some(20),
                &UploadPolicy::unrestricted(),
            )
            .await
        });

        client.write_all(&[b'a'; 10]).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while leftover_partials(root.path()) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let listing = list_directory(&root, "").await.unwrap();
        assert!(listing.tree.is_empty(), "{:?}", listing.tree);
        assert!(!root.path().join("growing.txt").exists());

        client.write_all(&[b'b'; 10]).await.unwrap();
        drop(client);

        let node = upload.await.unwrap().unwrap();
        assert_eq!(node.size, Some(20));
        let listing = list_directory(&root, "").await.unwrap();
        assert_eq!(listing.tree.len(), 1);
        assert_eq!(listing.tree[0].name, "growing.txt");
    }

    #[tokio::test]
    async fn test_declared_body_completes_while_stream_stays_open() {
        let (_tmp, root) = setup().await;
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"exactly12byt").await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            upload_file(
                &root,
                "",
                "open.txt",
                server,
                Some(12),
                &UploadPolicy::unrestricted(),
            ),
        )
        .await
        .expect("upload waited for end of stream");

        assert_eq!(result.unwrap().size, Some(12));
        assert_eq!(stdfs::read(root.path().join("open.txt")).unwrap(), b"exactly12byt");
        drop(client);
    }
}
