//! MCP transport layer.
//!
//! A transport moves whole JSON-RPC frames. It knows nothing about ids or
//! methods; correlation happens in [`crate::session`].

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::McpError;

/// Trait for MCP message transport.
///
/// The session drives a transport from a single task, racing `receive`
/// against outbound frames with `tokio::select!`. Implementations must
/// therefore make `receive` cancel-safe: dropping an unfinished `receive`
/// future must not lose a frame.
#[async_trait]
pub trait McpTransport: Send {
    /// Next inbound frame, or `None` once the peer has gone away.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;

    /// Write one outbound frame.
    async fn send(&mut self, message: &str) -> Result<(), McpError>;

    /// Release the underlying connection. Called at most once.
    async fn close(&mut self) -> Result<(), McpError> {
        Ok(())
    }
}

/// Newline-delimited JSON over stdin/stdout.
pub struct StdioTransport {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
    /// Bytes of a partially read line survive a cancelled `receive`.
    line: Vec<u8>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
            line: Vec::new(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        loop {
            let bytes_read = self.reader.read_until(b'\n', &mut self.line).await?;
            let raw = std::mem::take(&mut self.line);
            if bytes_read == 0 && raw.is_empty() {
                return Ok(None);
            }
            let text = String::from_utf8_lossy(&raw);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
            if bytes_read == 0 {
                return Ok(None);
            }
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-memory transport backed by channel pairs.
///
/// One end plays the client, the other a scripted tool host.
pub struct ChannelTransport {
    rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Create a pair of connected transports.
    ///
    /// Messages sent on one transport are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::channel(64);
        let (tx_b, rx_a) = mpsc::channel(64);
        (Self { rx: rx_a, tx: tx_a }, Self { rx: rx_b, tx: tx_b })
    }
}

#[async_trait]
impl McpTransport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.rx.recv().await)
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.tx
            .send(message.to_string())
            .await
            .map_err(|_| McpError::Connection("peer transport dropped".to_string()))
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.rx.close();
        Ok(())
    }
}
