//! JSON-RPC 2.0 framing and the MCP payloads this client uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tb_domain::tool::ToolDefinition;

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A request; the server must answer with the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A notification; no `id`, no answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// `Err` when the server answered with an error object, else the
    /// result (`null` when absent).
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// What a server pushed at us, once decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response(JsonRpcResponse),
    /// A server-initiated request or notification. This client never
    /// answers them.
    ServerMessage { method: String },
}

/// Decode one JSON text frame. Batches (arrays) are flattened.
///
/// Frames that are neither a response nor a server message are dropped
/// with a debug log.
pub fn decode_incoming(text: &str) -> Vec<Incoming> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring non-JSON frame from MCP server");
            return Vec::new();
        }
    };
    match value {
        Value::Array(items) => items.into_iter().filter_map(decode_value).collect(),
        other => decode_value(other).into_iter().collect(),
    }
}

fn decode_value(value: Value) -> Option<Incoming> {
    if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
        return Some(Incoming::ServerMessage {
            method: method.to_string(),
        });
    }
    match serde_json::from_value::<JsonRpcResponse>(value) {
        Ok(resp) => Some(Incoming::Response(resp)),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable JSON-RPC message");
            None
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

/// A tool as declared by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDef {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

impl McpToolDef {
    /// Project into the model-facing definition.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Servers send `"description": null` as often as they omit it.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<McpToolDef>,
}

/// One content block of a `tools/call` result. Non-text blocks keep an
/// empty `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolCallContent>,
    #[serde(default, rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Text of every `text` block, in order.
    pub fn texts(&self) -> Vec<String> {
        self.content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.clone())
            .collect()
    }

    /// A synthetic error result carrying one text block.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolCallContent {
                content_type: "text".into(),
                text: message.into(),
            }],
            meta: None,
            is_error: true,
        }
    }
}

pub fn initialize_params() -> InitializeParams {
    InitializeParams {
        protocol_version: PROTOCOL_VERSION.into(),
        capabilities: serde_json::json!({}),
        client_info: ClientInfo {
            name: "toolbridge".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_params() {
        let json = serde_json::to_value(JsonRpcRequest::new(7, "tools/list", None)).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert!(json.get("params").is_none());
    }

    #[test]
    fn notification_has_no_id() {
        let json =
            serde_json::to_value(JsonRpcNotification::new("notifications/initialized", None))
                .unwrap();
        assert_eq!(json["method"], "notifications/initialized");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn error_response_into_result() {
        let raw = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.to_string(), "JSON-RPC error -32601: Method not found");
    }

    #[test]
    fn decode_skips_server_messages_and_flattens_batches() {
        let frame = r#"[
            {"jsonrpc":"2.0","method":"notifications/progress","params":{}},
            {"jsonrpc":"2.0","id":2,"result":{}}
        ]"#;
        let decoded = decode_incoming(frame);
        assert_eq!(decoded.len(), 2);
        assert_eq!(
            decoded[0],
            Incoming::ServerMessage { method: "notifications/progress".into() }
        );
        assert!(matches!(&decoded[1], Incoming::Response(r) if r.id == 2));
        assert!(decode_incoming("not json").is_empty());
    }

    #[test]
    fn tool_def_projects_to_definition() {
        let raw = r#"{"tools":[{"name":"calculator","description":"Evaluate","inputSchema":{"type":"object","properties":{"python_expression":{"type":"string"}}}},{"name":"ping"},{"name":"echo","description":null}]}"#;
        let list: ToolsListResult = serde_json::from_str(raw).unwrap();
        let def = list.tools[0].to_definition();
        assert_eq!(def.name, "calculator");
        assert_eq!(def.parameters["properties"]["python_expression"]["type"], "string");
        assert_eq!(list.tools[1].description, "");
        assert_eq!(list.tools[1].input_schema["type"], "object");
        assert_eq!(list.tools[2].to_definition().description, "");
    }

    #[test]
    fn null_text_block_reads_as_empty() {
        let raw = r#"{"content":[{"type":"text","text":null},{"type":"text","text":"ok"}]}"#;
        let result: ToolCallResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.texts(), vec![String::new(), "ok".to_string()]);
    }

    #[test]
    fn call_result_keeps_meta_and_error_flag() {
        let raw = r#"{
            "content": [{"type":"text","text":"201.06"},{"type":"image","data":"..."}],
            "_meta": {"elapsed_ms": 3},
            "isError": false
        }"#;
        let result: ToolCallResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.texts(), vec!["201.06".to_string()]);
        assert_eq!(result.meta.unwrap()["elapsed_ms"], 3);
        assert!(!result.is_error);
    }

    #[test]
    fn initialize_params_identify_client() {
        let params = serde_json::to_value(initialize_params()).unwrap();
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(params["clientInfo"]["name"], "toolbridge");
    }
}
