use serde::Serialize;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Bidirectional newline-framed text channel.
///
/// One message per line, one request in flight at a time. Works the same over
/// child-process pipes, sockets, or an in-memory duplex.
pub struct LineChannel<R, W> {
    reader: R,
    writer: W,
    buf: Vec<u8>,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer, buf: Vec::new() }
    }

    /// Next line as raw bytes without its terminator, or `None` at end of stream.
    ///
    /// Bytes are not checked for UTF-8, so a garbled line can be answered
    /// without losing the stream.
    pub async fn recv_bytes(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        let line = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Ok(Some(line.to_vec()))
    }

    /// Next line as text. Invalid UTF-8 is an `InvalidData` error.
    pub async fn recv_line(&mut self) -> io::Result<Option<String>> {
        match self.recv_bytes().await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }

    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub async fn send_json<T: Serialize>(&mut self, msg: &T) -> io::Result<()> {
        let line = serde_json::to_string(msg).map_err(io::Error::other)?;
        self.send_line(&line).await
    }
}
