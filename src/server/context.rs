//! Shared server state
//!
//! Everything a session task needs, built once at startup and handed to each
//! connection behind an `Arc`.

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenStore;
use crate::client::ClientRegistry;
use crate::config::ServerConfig;
use crate::storage::{FileStore, StorageRoot, UploadPolicy};

#[derive(Debug)]
pub struct ServerContext {
    pub config: ServerConfig,
    pub store: FileStore,
    pub tokens: TokenStore,
    pub upload_policy: UploadPolicy,
    pub clients: Mutex<ClientRegistry>,
    /// Cancelled when the server shuts down. Long-running operations such as
    /// recursive deletion observe it.
    pub shutdown: CancellationToken,
}

impl ServerContext {
    pub fn new(config: ServerConfig, roots: StorageRoot) -> Self {
        let tokens = TokenStore::from_entries(&config.identities);
        let upload_policy = config.upload_policy();

        Self {
            store: FileStore::new(roots),
            tokens,
            upload_policy,
            clients: Mutex::new(ClientRegistry::new()),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.config.server.max_clients
    }
}
