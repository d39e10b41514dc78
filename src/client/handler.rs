use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::client::Session;
use crate::error::ProtocolError;
use crate::error::handlers::protocol_status;
use crate::protocol::{CommandStatus, Response, handle_request, parse_request};
use crate::server::ServerContext;
use crate::transfer::send_file;

enum LineError {
    TooLong(usize),
    Encoding,
    Io(std::io::Error),
}

/// Handles one client session.
///
/// - Reads newline-terminated JSON requests, at most `max_request_length`
///   bytes each.
/// - Dispatches them with `handle_request`, passing the read side along so
///   uploads can take their body from the same stream.
/// - Streams download bodies right after their response line.
/// - Releases the session's client slot when the connection ends.
pub async fn handle_client<S>(stream: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Send,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut session = Session::new(peer);
    let max_len = ctx.config.server.max_request_length;

    info!("Client {} connected", peer);
    if send_response(&mut write_half, &Response::ok("filevault ready"))
        .await
        .is_err()
    {
        return;
    }

    loop {
        let line = match read_request_line(&mut reader, max_len).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Connection closed by client {}", peer);
                break;
            }
            Err(LineError::TooLong(max)) => {
                let err = ProtocolError::RequestTooLong { max };
                warn!("Discarded oversized request from {}", peer);
                if send_response(&mut write_half, &protocol_error(&err)).await.is_err() {
                    break;
                }
                continue;
            }
            Err(LineError::Encoding) => {
                let err = ProtocolError::InvalidEncoding;
                warn!("Non UTF-8 request from {}", peer);
                if send_response(&mut write_half, &protocol_error(&err)).await.is_err() {
                    break;
                }
                continue;
            }
            Err(LineError::Io(e)) => {
                error!("Failed to read from {}: {}", peer, e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request = match parse_request(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed request from {}: {}", peer, e);
                if send_response(&mut write_half, &protocol_error(&e)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        info!("Received {} from {}", request.name(), peer);
        let reply = handle_request(request, &mut session, &ctx, &mut reader).await;

        if let Err(e) = send_response(&mut write_half, &reply.response).await {
            error!("Failed to respond to {}: {}", peer, e);
            break;
        }

        if let Some(download) = reply.download {
            let buffer_size = ctx.config.server.buffer_size;
            if let Err(e) = send_file(download, &mut write_half, buffer_size).await {
                warn!("Download to {} aborted: {}", peer, e);
                break;
            }
        }

        if reply.status == CommandStatus::CloseConnection {
            info!("Closing session with {}", peer);
            break;
        }
    }

    if let Some(id) = session.logout() {
        let mut clients = ctx.clients.lock().await;
        clients.remove(id);
        info!("Released client slot ({} active)", clients.len());
    }
    let _ = write_half.shutdown().await;
    info!("Client {} disconnected", peer);
}

fn protocol_error(err: &ProtocolError) -> Response {
    Response::new(protocol_status(err), err.to_string())
}

async fn send_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(response.to_line().as_bytes()).await?;
    writer.flush().await
}

/// Reads one request line without buffering more than `max_len` bytes of it.
///
/// An oversized line is consumed up to its newline and reported, so the
/// session can continue with the next request. Returns `None` on a clean
/// EOF.
async fn read_request_line<R>(reader: &mut R, max_len: usize) -> Result<Option<String>, LineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(max_len as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(LineError::Io)?;

    if n == 0 {
        return Ok(None);
    }

    if n > max_len {
        if !buf.ends_with(b"\n") {
            skip_line(reader).await.map_err(LineError::Io)?;
        }
        return Err(LineError::TooLong(max_len));
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| LineError::Encoding)
}

async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut sink = Vec::new();
    loop {
        sink.clear();
        let n = (&mut *reader).take(8192).read_until(b'\n', &mut sink).await?;
        if n == 0 || sink.ends_with(b"\n") {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_lines_within_limit() {
        let mut reader: &[u8] = b"{\"op\":\"health\"}\nnext\n";
        let line = read_request_line(&mut reader, 64).await.ok().flatten().unwrap();
        assert_eq!(line, "{\"op\":\"health\"}\n");
        let line = read_request_line(&mut reader, 64).await.ok().flatten().unwrap();
        assert_eq!(line, "next\n");
        assert!(matches!(read_request_line(&mut reader, 64).await, Ok(None)));
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let input = format!("{}\nafter\n", "x".repeat(200));
        let mut reader = input.as_bytes();

        assert!(matches!(
            read_request_line(&mut reader, 64).await,
            Err(LineError::TooLong(64))
        ));
        let line = read_request_line(&mut reader, 64).await.ok().flatten().unwrap();
        assert_eq!(line, "after\n");
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let input = format!("{}\n", "y".repeat(63));
        let mut reader = input.as_bytes();
        let line = read_request_line(&mut reader, 64).await.ok().flatten().unwrap();
        assert_eq!(line.len(), 64);
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mut reader: &[u8] = b"\xff\xfe\n";
        assert!(matches!(
            read_request_line(&mut reader, 64).await,
            Err(LineError::Encoding)
        ));
    }

    #[tokio::test]
    async fn test_unterminated_final_line() {
        let mut reader: &[u8] = b"{\"op\":\"quit\"}";
        let line = read_request_line(&mut reader, 64).await.ok().flatten().unwrap();
        assert_eq!(line, "{\"op\":\"quit\"}");
    }
}
