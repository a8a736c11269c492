use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::pending::{await_response, PendingRequests};
use super::{McpTransport, TransportError};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket transport: one JSON-RPC message per text frame.
pub struct WebSocketTransport {
    server: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    pending: Arc<PendingRequests>,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl WebSocketTransport {
    /// Perform the websocket handshake, requesting the `mcp` subprotocol.
    pub async fn connect(
        server: impl Into<String>,
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let server = server.into();
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("mcp"));

        let (ws, response) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout)??;
        tracing::debug!(server = %server, status = %response.status(), "websocket connected");

        let (sink, stream) = ws.split();
        let pending = Arc::new(PendingRequests::new());
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_frames(server.clone(), stream, pending.clone(), alive.clone()));

        Ok(Self {
            server,
            sink: Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            alive,
            reader: parking_lot::Mutex::new(Some(reader)),
            request_timeout,
        })
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        self.sink.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }
}

async fn read_frames(
    server: String,
    mut stream: SplitStream<WsStream>,
    pending: Arc<PendingRequests>,
    alive: Arc<AtomicBool>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => pending.dispatch_frame(&server, &text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => pending.dispatch_frame(&server, text),
                Err(_) => tracing::debug!(server = %server, "ignoring non-UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                tracing::debug!(server = %server, ?frame, "websocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "websocket read failed");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    pending.fail_all();
}

#[async_trait]
impl McpTransport for WebSocketTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let rx = self.pending.register(id);
        tracing::debug!(server = %self.server, id, method, "sending MCP websocket request");
        if let Err(e) = self.send_text(text).await {
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
        let text = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.send_text(text).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        if was_alive {
            if let Err(e) = self.sink.lock().await.close().await {
                tracing::debug!(server = %self.server, error = %e, "error closing websocket");
            }
        }
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.pending.fail_all();
    }

    fn kind(&self) -> &'static str {
        "websocket"
    }
}
