//! MCP transport layer.
//!
//! Every server is reached through one [`McpTransport`]:
//! - [`StdioTransport`]: child process, newline-delimited JSON-RPC on
//!   stdin/stdout.
//! - [`StreamableHttpTransport`]: POST per message, answer as JSON or as
//!   an event stream.
//! - [`SseTransport`]: legacy HTTP+SSE (GET stream, POST to the announced
//!   endpoint).
//! - [`WebSocketTransport`]: one text frame per message, subprotocol `mcp`.

mod event_stream;
mod pending;
mod sse;
mod stdio;
mod streamable_http;
mod websocket;

pub use event_stream::{EventStreamParser, SseEvent};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use streamable_http::StreamableHttpTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::JsonRpcResponse;

#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the response with the same id.
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError>;

    fn is_alive(&self) -> bool;

    /// Release the underlying channel. Must tolerate repeated calls.
    async fn shutdown(&self);

    /// Short label for log lines (`stdio`, `http`, `sse`, `websocket`).
    fn kind(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP server process has exited")]
    ProcessExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("transport is closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(e.to_string())
    }
}

/// Build the HTTP client shared by the streamable and SSE transports.
///
/// Only the connect phase is bounded here; request deadlines are applied
/// per call so long-lived event streams are not cut off.
pub(crate) fn http_client(
    connect_timeout: std::time::Duration,
) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(TransportError::from)
}
