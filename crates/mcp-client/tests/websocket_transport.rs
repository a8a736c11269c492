//! Websocket transport against an in-process tungstenite server.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use tb_domain::config::{McpServerConfig, McpTransportKind};
use tb_mcp_client::connect;

/// Accept one connection, insist on the `mcp` subprotocol and answer
/// every request with the canned calculator replies.
async fn spawn_ws_server() -> std::net::SocketAddr {
    let (listener, addr) = common::bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let check_protocol = |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
            let offered = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            assert_eq!(offered, "mcp");
            resp.headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("mcp"));
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, check_protocol)
            .await
            .unwrap();
        let (mut sink, mut source) = ws.split();
        while let Some(Ok(frame)) = source.next().await {
            let Message::Text(text) = frame else { continue };
            let message: Value = serde_json::from_str(&text).unwrap();
            if let Some(reply) = common::respond(&message) {
                sink.send(Message::Text(reply.to_string())).await.unwrap();
            }
        }
    });
    addr
}

#[tokio::test]
async fn websocket_session_roundtrip() {
    let addr = spawn_ws_server().await;
    let server = McpServerConfig {
        name: "ws-calc".into(),
        url: Some(format!("ws://{addr}/mcp")),
        ..Default::default()
    };
    assert_eq!(server.transport_kind(), McpTransportKind::Websocket);

    let session = connect(&server, common::timeouts()).await.unwrap();
    assert_eq!(session.transport_kind(), "websocket");
    assert_eq!(session.tools()[0].name, "calculator");

    let result = session
        .call_tool("calculator", json!({"python_expression": "math.pi * 8 ** 2"}))
        .await
        .unwrap();
    assert_eq!(result.texts(), vec!["201.06192982974676".to_string()]);

    assert!(session.close().await);
    assert!(!session.close().await);
}

#[tokio::test]
async fn websocket_refused_is_connection_error() {
    let (listener, addr) = common::bind().await;
    drop(listener);
    let server = McpServerConfig {
        name: "ws-gone".into(),
        url: Some(format!("ws://{addr}/mcp")),
        transport: Some(McpTransportKind::Websocket),
        ..Default::default()
    };
    let err = connect(&server, common::timeouts()).await.unwrap_err();
    assert!(err.to_string().contains("ws-gone"), "{err}");
}
