use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::event_stream::EventStreamParser;
use super::pending::{await_response, PendingRequests};
use super::{http_client, McpTransport, TransportError};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Legacy HTTP+SSE transport.
///
/// A long-lived GET carries server-to-client messages. Its first event,
/// `endpoint`, names the URL (relative to the stream URL) that accepts the
/// client's POSTed messages. Responses come back on the stream as
/// `message` events and are matched to callers by id.
pub struct SseTransport {
    server: String,
    endpoint: Url,
    client: reqwest::Client,
    pending: Arc<PendingRequests>,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl SseTransport {
    /// Open the event stream and wait for the `endpoint` event.
    pub async fn connect(
        server: impl Into<String>,
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let server = server.into();
        let base = Url::parse(url).map_err(|e| TransportError::Protocol(format!("invalid URL '{url}': {e}")))?;
        let client = http_client(connect_timeout)?;

        let response = tokio::time::timeout(
            connect_timeout,
            client.get(base.clone()).header(ACCEPT, "text/event-stream").send(),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(format!("HTTP {} opening event stream", status.as_u16())));
        }

        let pending = Arc::new(PendingRequests::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(
            server.clone(),
            response,
            endpoint_tx,
            pending.clone(),
            alive.clone(),
        ));

        let endpoint = match tokio::time::timeout(connect_timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(TransportError::Protocol("event stream closed before 'endpoint' event".into()));
            }
            Err(_) => {
                reader.abort();
                return Err(TransportError::Timeout);
            }
        };
        let endpoint = match base.join(endpoint.trim()) {
            Ok(url) => url,
            Err(e) => {
                reader.abort();
                return Err(TransportError::Protocol(format!("invalid endpoint '{endpoint}': {e}")));
            }
        };
        tracing::debug!(server = %server, endpoint = %endpoint, "SSE endpoint announced");

        Ok(Self {
            server,
            endpoint,
            client,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            reader: Mutex::new(Some(reader)),
            request_timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: String) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {} - {}", status.as_u16(), text)));
        }
        Ok(())
    }
}

async fn read_events(
    server: String,
    mut response: reqwest::Response,
    endpoint_tx: oneshot::Sender<String>,
    pending: Arc<PendingRequests>,
    alive: Arc<AtomicBool>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut parser = EventStreamParser::new();

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "SSE stream failed");
                break;
            }
        };
        for event in parser.push(&chunk) {
            match event.event.as_str() {
                "endpoint" => match endpoint_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(event.data);
                    }
                    None => tracing::debug!(server = %server, "ignoring repeated endpoint event"),
                },
                "message" => pending.dispatch_frame(&server, &event.data),
                other => tracing::debug!(server = %server, event = other, "ignoring SSE event"),
            }
        }
    }

    tracing::debug!(server = %server, "SSE stream closed");
    alive.store(false, Ordering::SeqCst);
    pending.fail_all();
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let rx = self.pending.register(id);
        tracing::debug!(server = %self.server, id, method, "sending MCP SSE request");
        if let Err(e) = self.post(body).await {
            self.pending.cancel(id);
            return Err(e);
        }
        let result = await_response(rx, self.request_timeout).await;
        if result.is_err() {
            self.pending.cancel(id);
        }
        result
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        tracing::debug!(server = %self.server, method, "sending MCP SSE notification");
        self.post(body).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.pending.fail_all();
    }

    fn kind(&self) -> &'static str {
        "sse"
    }
}
