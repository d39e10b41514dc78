//! Module `file_ops`
//!
//! Streams a download to the client in fixed-size chunks.

use std::io;

use log::info;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::storage::Download;

/// Writes exactly `download.size` bytes of the file to `writer`.
///
/// The size was announced to the client before the body, so a file that
/// shrank in the meantime fails with `UnexpectedEof` and the caller must drop
/// the connection. Bytes appended after the announcement are not sent.
pub async fn send_file<W>(download: Download, writer: &mut W, buffer_size: usize) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let Download { name, size, file } = download;
    let mut source = file.take(size);
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut sent = 0u64;

    loop {
        let n = source.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n]).await?;
        sent += n as u64;
    }

    writer.flush().await?;

    if sent < size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("file shrank during transfer ({sent} of {size} bytes)"),
        ));
    }

    info!("Sent '{}' ({} bytes)", name, sent);
    Ok(sent)
}
