use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::client::handle_client;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::server::context::ServerContext;
use crate::storage::StorageRoot;

pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Opens the storage root, clears stale upload temporaries, and binds the
    /// listener.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let roots = StorageRoot::open(config.storage_root())
            .await
            .map_err(ServerError::StorageRoot)?;

        match roots.sweep_partial_uploads().await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} stale partial uploads", removed),
            Err(e) => warn!("Failed to sweep partial uploads: {}", e),
        }

        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server bound to {}", addr);

        let ctx = ServerContext::new(config, roots);
        if ctx.tokens.is_empty() {
            warn!("No identities configured; every authentication will fail");
        }

        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop and in-flight deletions when
    /// cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.ctx.shutdown.clone()
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    /// Accepts connections until the shutdown token is cancelled. Each client
    /// runs in its own task.
    pub async fn start(self) {
        info!(
            "Starting file server (max {} clients)",
            self.ctx.max_clients()
        );

        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => {
                    info!("Shutting down, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        let ctx = Arc::clone(&self.ctx);

                        // Spawn a task for each client so accept loop doesn't block
                        tokio::spawn(async move {
                            handle_client(stream, addr, ctx).await;
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                },
            }
        }
    }
}
