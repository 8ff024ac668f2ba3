//! Client side of the HTTP+SSE transport.
//!
//! The client GETs the host's event stream. The host's first event is
//! `endpoint`, whose data is the (usually relative) URL that frames must be
//! POSTed to. Every reply then arrives as a `message` event on the stream.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::McpError;
use crate::transport::McpTransport;

pub const ENDPOINT_EVENT: &str = "endpoint";
pub const MESSAGE_EVENT: &str = "message";

/// Bound on delivering one frame to the host's message endpoint.
pub const DEFAULT_POST_TIMEOUT: Duration = Duration::from_secs(10);

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Chunks may split lines (or UTF-8 sequences) anywhere; only complete
/// lines are interpreted. Comment lines (keep-alives) are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.feed_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            let event = self.event.take();
            if self.data.is_empty() {
                return None;
            }
            return Some(SseEvent {
                event: event.unwrap_or_else(|| MESSAGE_EVENT.to_string()),
                data: std::mem::take(&mut self.data).join("\n"),
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Client transport for a tool host served over HTTP+SSE.
pub struct SseClientTransport {
    http: reqwest::Client,
    post_url: Url,
    post_timeout: Duration,
    events: mpsc::Receiver<SseEvent>,
    reader: JoinHandle<()>,
}

impl SseClientTransport {
    /// Open the event stream at `url` and wait up to `timeout` for the
    /// host to announce its message endpoint.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, McpError> {
        let stream_url = Url::parse(url)
            .map_err(|e| McpError::Connection(format!("invalid tool host url '{}': {}", url, e)))?;
        // No overall timeout here: it would cut the long-lived event stream.
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| McpError::Connection(e.to_string()))?;

        info!(url = %stream_url, "Opening SSE stream");
        let response = tokio::time::timeout(
            timeout,
            http.get(stream_url.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| McpError::Connection(format!("no response from {} within {:?}", stream_url, timeout)))?
        .map_err(|e| McpError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(McpError::Connection(format!(
                "tool host returned {} for {}",
                response.status(),
                stream_url
            )));
        }

        let (tx, mut events) = mpsc::channel(64);
        let reader = tokio::spawn(pump_events(Box::pin(response.bytes_stream()), tx));

        let endpoint = tokio::time::timeout(timeout, async {
            while let Some(event) = events.recv().await {
                if event.event == ENDPOINT_EVENT {
                    return Some(event.data);
                }
                debug!(event = %event.event, "Ignoring event before endpoint");
            }
            None
        })
        .await;

        let endpoint = match endpoint {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => {
                return Err(McpError::Connection(
                    "event stream ended before the endpoint was announced".to_string(),
                ))
            }
            Err(_) => {
                reader.abort();
                return Err(McpError::Connection(format!(
                    "no endpoint event within {:?}",
                    timeout
                )));
            }
        };

        let post_url = stream_url
            .join(endpoint.trim())
            .map_err(|e| McpError::Protocol(format!("bad endpoint '{}': {}", endpoint, e)))?;
        debug!(post_url = %post_url, "Tool host endpoint announced");

        Ok(Self {
            http,
            post_url,
            post_timeout: DEFAULT_POST_TIMEOUT,
            events,
            reader,
        })
    }

    /// Bound each POST; a host that never answers one fails the send.
    pub fn with_post_timeout(mut self, timeout: Duration) -> Self {
        self.post_timeout = timeout;
        self
    }

    pub fn post_url(&self) -> &Url {
        &self.post_url
    }
}

async fn pump_events(mut bytes: ByteStream, tx: mpsc::Sender<SseEvent>) {
    let mut decoder = SseDecoder::new();
    while let Some(chunk) = bytes.next().await {
        match chunk {
            Ok(chunk) => {
                for event in decoder.push(&chunk) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "SSE stream failed");
                return;
            }
        }
    }
    debug!("SSE stream ended");
}

#[async_trait]
impl McpTransport for SseClientTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        while let Some(event) = self.events.recv().await {
            if event.event == MESSAGE_EVENT {
                return Ok(Some(event.data));
            }
            debug!(event = %event.event, "Ignoring non-message event");
        }
        Ok(None)
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.post_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.post_timeout)
            .body(message.to_string())
            .send()
            .await
            .map_err(|e| McpError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(McpError::Connection(format!(
                "tool host rejected message with {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.reader.abort();
        Ok(())
    }
}

impl Drop for SseClientTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
