//! Request handlers
//!
//! Executes a parsed request for one session and builds the reply. Storage
//! requests run against the session's own identity only.

use std::net::SocketAddr;

use log::{info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::auth::validate_token;
use crate::client::Session;
use crate::error::{AuthError, StorageError};
use crate::error::handlers::{auth_status, storage_message, storage_status};
use crate::protocol::commands::{CommandStatus, Request};
use crate::protocol::responses::{BAD_REQUEST, CREATED, Response, ResponseData, SERVICE_UNAVAILABLE};
use crate::server::ServerContext;
use crate::storage::{Download, UserIdentity};

/// Result of handling one request.
#[derive(Debug)]
pub struct Reply {
    pub response: Response,
    pub status: CommandStatus,
    /// File to stream after the response line.
    pub download: Option<Download>,
}

impl Reply {
    fn success(response: Response) -> Self {
        Self {
            response,
            status: CommandStatus::Success,
            download: None,
        }
    }

    fn failure(response: Response) -> Self {
        let status = CommandStatus::Failure(response.message.clone());
        Self {
            response,
            status,
            download: None,
        }
    }

    fn close(response: Response) -> Self {
        Self {
            response,
            status: CommandStatus::CloseConnection,
            download: None,
        }
    }

    /// Keeps the response but ends the session after sending it.
    fn closing(mut self) -> Self {
        self.status = CommandStatus::CloseConnection;
        self
    }
}

/// Handles one request.
///
/// `body` is the connection's read side; uploads consume exactly their
/// declared size from it. When an upload fails before its body was read in
/// full, the stream can no longer be framed and the reply closes the session.
pub async fn handle_request<R>(
    request: Request,
    session: &mut Session,
    ctx: &ServerContext,
    body: &mut R,
) -> Reply
where
    R: AsyncRead + Unpin,
{
    match request {
        Request::Auth { token } => handle_auth(session, ctx, &token).await,
        Request::Health => Reply::success(Response::ok("ok")),
        Request::Quit => Reply::close(Response::ok("goodbye")),
        request => {
            let Some(identity) = session.identity().cloned() else {
                let err = AuthError::NotAuthenticated;
                let reply = Reply::failure(Response::new(auth_status(&err), err.to_string()));
                return match request {
                    Request::Upload { size, .. } if size > 0 => reply.closing(),
                    _ => reply,
                };
            };
            handle_storage(request, &identity, session.peer(), ctx, body).await
        }
    }
}

async fn handle_auth(session: &mut Session, ctx: &ServerContext, token: &str) -> Reply {
    let peer = session.peer();
    if session.is_authenticated() {
        return Reply::failure(Response::new(BAD_REQUEST, "already authenticated"));
    }

    let identity = match validate_token(&ctx.tokens, token) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Authentication failed for {}: {}", peer, e);
            return Reply::failure(Response::new(auth_status(&e), e.to_string()));
        }
    };

    let mut clients = ctx.clients.lock().await;
    match clients.try_register(peer, identity.clone(), ctx.max_clients()) {
        Some(id) => {
            info!(
                "Authenticated {} as {} ({} sessions for user, {}/{} clients)",
                peer,
                identity,
                clients.sessions_for(&identity),
                clients.len(),
                ctx.max_clients()
            );
            let user = identity.as_str().to_string();
            session.authenticate(identity, id);
            Reply::success(Response::ok("authenticated").with_data(ResponseData::Session { user }))
        }
        None => {
            warn!("Rejecting {}: client limit reached", peer);
            Reply::close(Response::new(
                SERVICE_UNAVAILABLE,
                "too many clients, try again later",
            ))
        }
    }
}

async fn handle_storage<R>(
    request: Request,
    identity: &UserIdentity,
    peer: SocketAddr,
    ctx: &ServerContext,
    body: &mut R,
) -> Reply
where
    R: AsyncRead + Unpin,
{
    let op = request.name();
    let store = &ctx.store;

    match request {
        Request::List { path } => match store.list(identity, &path).await {
            Ok(listing) => Reply::success(Response::ok("ok").with_data(ResponseData::Listing(listing))),
            Err(e) => storage_failure(op, peer, e),
        },
        Request::Upload { dir, name, size } => {
            let mut limited = (&mut *body).take(size);
            let result = store
                .upload(
                    identity,
                    &dir,
                    &name,
                    &mut limited,
                    Some(size),
                    &ctx.upload_policy,
                )
                .await;
            let unread = limited.limit();

            match result {
                Ok(node) => {
                    info!("{} uploaded {} bytes as {}", peer, size, identity);
                    Reply::success(Response::ok("uploaded").with_data(ResponseData::Node(node)))
                }
                Err(e) if unread > 0 => storage_failure(op, peer, e).closing(),
                Err(e) => storage_failure(op, peer, e),
            }
        }
        Request::Download { path } => match store.download(identity, &path).await {
            Ok(download) => {
                let data = ResponseData::Transfer {
                    name: download.name.clone(),
                    size: download.size,
                };
                Reply {
                    response: Response::ok("sending file").with_data(data),
                    status: CommandStatus::Success,
                    download: Some(download),
                }
            }
            Err(e) => storage_failure(op, peer, e),
        },
        Request::Delete { path } => match store.delete(identity, &path, &ctx.shutdown).await {
            Ok(()) => {
                info!("{} deleted an entry as {}", peer, identity);
                Reply::success(Response::ok("deleted"))
            }
            Err(e) => storage_failure(op, peer, e),
        },
        Request::CreateFolder { parent, name } => {
            match store.create_folder(identity, &parent, &name).await {
                Ok(node) => Reply::success(
                    Response::new(CREATED, "folder created").with_data(ResponseData::Node(node)),
                ),
                Err(e) => storage_failure(op, peer, e),
            }
        }
        Request::Auth { .. } | Request::Health | Request::Quit => {
            Reply::failure(Response::new(BAD_REQUEST, "unsupported request"))
        }
    }
}

fn storage_failure(op: &str, peer: SocketAddr, err: StorageError) -> Reply {
    if err.is_security_violation() {
        warn!("Rejected {} from {}: {}", op, peer, err);
    }
    Reply::failure(Response::new(storage_status(&err), storage_message(&err)))
}
