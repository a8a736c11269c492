use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use super::event_stream::EventStreamParser;
use super::{http_client, McpTransport, TransportError};
use crate::protocol::{decode_incoming, Incoming, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport.
///
/// Every message is a POST to the server URL. The server answers with
/// either a JSON body or a `text/event-stream` carrying the response. The
/// `mcp-session-id` header handed out at `initialize` is echoed on every
/// later request and the session is deleted on shutdown.
pub struct StreamableHttpTransport {
    server: String,
    url: String,
    client: reqwest::Client,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    alive: AtomicBool,
    request_timeout: Duration,
}

impl StreamableHttpTransport {
    pub fn new(
        server: impl Into<String>,
        url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            server: server.into(),
            url: url.into(),
            client: http_client(connect_timeout)?,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            request_timeout,
        })
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    async fn post(&self, body: String) -> Result<reqwest::Response, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(session_id) = self.session_id() {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {} - {}", status.as_u16(), text)));
        }

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut current = self.session_id.lock();
            if current.as_deref() != Some(id) {
                tracing::debug!(server = %self.server, session_id = %id, "MCP HTTP session assigned");
                *current = Some(id.to_string());
            }
        }
        Ok(response)
    }

    async fn exchange(&self, id: u64, body: String) -> Result<JsonRpcResponse, TransportError> {
        let mut response = self.post(body).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if !content_type.starts_with("text/event-stream") {
            let text = response.text().await?;
            return self
                .find_response(id, &text)
                .ok_or_else(|| TransportError::Protocol(format!("no response for request {id} in body")));
        }

        // The server may interleave notifications before our response.
        let mut parser = EventStreamParser::new();
        while let Some(chunk) = response.chunk().await? {
            for event in parser.push(&chunk) {
                if event.event != "message" {
                    continue;
                }
                if let Some(resp) = self.find_response(id, &event.data) {
                    return Ok(resp);
                }
            }
        }
        if let Some(resp) = parser
            .finish()
            .and_then(|event| self.find_response(id, &event.data))
        {
            return Ok(resp);
        }
        Err(TransportError::Protocol(format!(
            "event stream ended without a response for request {id}"
        )))
    }

    fn find_response(&self, id: u64, text: &str) -> Option<JsonRpcResponse> {
        decode_incoming(text).into_iter().find_map(|incoming| match incoming {
            Incoming::Response(resp) if resp.id == id => Some(resp),
            Incoming::Response(resp) => {
                tracing::debug!(server = %self.server, expected_id = id, got_id = resp.id, "unexpected response id");
                None
            }
            Incoming::ServerMessage { method } => {
                tracing::debug!(server = %self.server, method = %method, "ignoring server-initiated message");
                None
            }
        })
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        tracing::debug!(server = %self.server, id, method, url = %self.url, "sending MCP HTTP request");

        tokio::time::timeout(self.request_timeout, self.exchange(id, body))
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        tracing::debug!(server = %self.server, method, "sending MCP HTTP notification");
        tokio::time::timeout(self.request_timeout, self.post(body))
            .await
            .unwrap_or(Err(TransportError::Timeout))
            .map(|_| ())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(session_id) = self.session_id.lock().take() else {
            return;
        };
        let request = self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, &session_id)
            .send();
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(resp)) => {
                tracing::debug!(server = %self.server, status = %resp.status(), "MCP HTTP session deleted");
            }
            Ok(Err(e)) => {
                tracing::debug!(server = %self.server, error = %e, "failed to delete MCP HTTP session");
            }
            Err(_) => {
                tracing::debug!(server = %self.server, "timed out deleting MCP HTTP session");
            }
        }
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}
