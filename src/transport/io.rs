//! Framed message I/O over the remote process's stdio.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::FRAME_PREFIX;
use crate::protocol::Message;
use crate::{Error, Result};

/// Reads framed messages, skipping unframed application output.
///
/// The host application shares stdout with the server script, so only lines
/// starting with [`FRAME_PREFIX`] are parsed. Everything else is logged at
/// debug level and dropped.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Read the next framed message.
    ///
    /// Returns `Ok(None)` at EOF.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            self.buffer.clear();

            let bytes_read = self
                .reader
                .read_until(b'\n', &mut self.buffer)
                .await
                .map_err(Error::io)?;

            if bytes_read == 0 {
                return Ok(None);
            }

            let line = String::from_utf8_lossy(&self.buffer);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(frame) = line.strip_prefix(FRAME_PREFIX) else {
                if !line.trim().is_empty() {
                    tracing::debug!(target: "libbridge::remote", "{}", line);
                }
                continue;
            };

            let message: Message =
                serde_json::from_str(frame).map_err(|e| Error::json_parse(e, frame))?;

            return Ok(Some(message));
        }
    }
}

/// Writes framed messages to the remote process's stdin.
pub struct FrameWriter {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    line: Vec<u8>,
}

impl FrameWriter {
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(inner: W) -> Self {
        Self {
            writer: Box::new(inner),
            line: Vec::with_capacity(1024),
        }
    }

    /// Write one message as a single framed line and flush it.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        self.line.clear();
        self.line.extend_from_slice(FRAME_PREFIX.as_bytes());
        serde_json::to_writer(&mut self.line, message)?;
        self.line.push(b'\n');

        self.writer.write_all(&self.line).await.map_err(Error::io)?;
        self.writer.flush().await.map_err(Error::io)
    }

    /// Close the write half, signaling EOF to the remote side.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(Error::io)
    }
}
