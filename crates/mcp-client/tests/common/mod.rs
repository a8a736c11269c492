//! Canned MCP server behaviour shared by the transport tests.

#![allow(dead_code)]

use serde_json::{json, Value};

/// Answer one JSON-RPC message the way a small calculator server would.
/// Notifications get `None`.
pub fn respond(message: &Value) -> Option<Value> {
    let id = message.get("id")?.clone();
    let method = message.get("method").and_then(|m| m.as_str()).unwrap_or_default();

    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "fake-calculator", "version": "1.0.0"}
        }),
        "tools/list" => json!({
            "tools": [{
                "name": "calculator",
                "description": "Evaluate a Python expression",
                "inputSchema": {
                    "type": "object",
                    "properties": {"python_expression": {"type": "string"}},
                    "required": ["python_expression"]
                }
            }]
        }),
        "tools/call" => json!({
            "content": [{"type": "text", "text": "201.06192982974676"}],
            "_meta": {"server": "fake-calculator"},
            "isError": false
        }),
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("unknown method {other}")}
            }))
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

pub async fn bind() -> (tokio::net::TcpListener, std::net::SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub fn timeouts() -> tb_mcp_client::Timeouts {
    tb_mcp_client::Timeouts {
        connect: std::time::Duration::from_secs(5),
        request: std::time::Duration::from_secs(5),
    }
}
