//! User-isolated file storage
//!
//! Path resolution, per-user roots, and the file operations built on them.
//! Every operation takes an explicit [`UserRoot`] and passes client paths
//! through [`resolver::resolve`] before touching the filesystem.

pub mod deletion;
pub mod download;
pub mod folders;
pub mod listing;
pub mod node;
pub mod resolver;
pub mod root;
pub mod store;
pub mod upload;

pub use deletion::delete_path;
pub use download::{Download, open_download};
pub use folders::create_folder;
pub use listing::{Listing, list_directory};
pub use node::{FileNode, NodeKind};
pub use resolver::{ResolvedPath, resolve, validate_segment};
pub use root::{StorageRoot, UserIdentity, UserRoot};
pub use store::FileStore;
pub use upload::{UploadPolicy, upload_file};
