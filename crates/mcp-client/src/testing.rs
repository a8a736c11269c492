//! In-memory transport double for tests (enabled by the `testing` feature).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::protocol::{JsonRpcError, JsonRpcResponse, PROTOCOL_VERSION};
use crate::transport::{McpTransport, TransportError};

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub server: String,
    pub method: String,
    pub params: Option<Value>,
}

/// Shared record of everything sent through one or more scripted
/// transports, including shutdown order.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    inner: Arc<Mutex<(Vec<LogEntry>, Vec<String>)>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().0.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.inner.lock().0.iter().map(|e| e.method.clone()).collect()
    }

    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.inner
            .lock()
            .0
            .iter()
            .rev()
            .find(|e| e.method == method)
            .and_then(|e| e.params.clone())
    }

    /// `(server, tool)` for every `tools/call`, in order.
    pub fn tool_calls(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .0
            .iter()
            .filter(|e| e.method == "tools/call")
            .map(|e| {
                let tool = e
                    .params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string();
                (e.server.clone(), tool)
            })
            .collect()
    }

    pub fn shutdown_order(&self) -> Vec<String> {
        self.inner.lock().1.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.inner.lock().1.len()
    }

    fn record(&self, server: &str, method: &str, params: Option<Value>) {
        self.inner.lock().0.push(LogEntry {
            server: server.to_string(),
            method: method.to_string(),
            params,
        });
    }
}

/// A transport that answers from a script instead of a server.
pub struct ScriptedTransport {
    server: String,
    tools: Value,
    results: HashMap<String, Value>,
    failing: HashSet<String>,
    log: CallLog,
    alive: AtomicBool,
    next_id: AtomicU64,
}

impl ScriptedTransport {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tools: json!([]),
            results: HashMap::new(),
            failing: HashSet::new(),
            log: CallLog::new(),
            alive: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// The `tools` array returned by `tools/list`.
    pub fn with_tools(mut self, tools: Value) -> Self {
        self.tools = tools;
        self
    }

    /// The `tools/call` result returned for `tool`.
    pub fn on_call(mut self, tool: impl Into<String>, result: Value) -> Self {
        self.results.insert(tool.into(), result);
        self
    }

    /// Answer `method` with a JSON-RPC error.
    pub fn fail_method(mut self, method: impl Into<String>) -> Self {
        self.failing.insert(method.into());
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl McpTransport for ScriptedTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        self.log.record(&self.server, method, params.clone());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if self.failing.contains(method) {
            return Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id,
                result: None,
                error: Some(JsonRpcError {
                    code: -32603,
                    message: format!("scripted failure for {method}"),
                    data: None,
                }),
            });
        }

        let result = match method {
            "initialize" => json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": self.server, "version": "0.0.0"}
            }),
            "tools/list" => json!({ "tools": self.tools }),
            "tools/call" => {
                let tool = params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or_default();
                self.results.get(tool).cloned().unwrap_or_else(|| {
                    json!({
                        "content": [{"type": "text", "text": format!("no script for {tool}")}],
                        "isError": true
                    })
                })
            }
            _ => Value::Null,
        };
        Ok(JsonRpcResponse::success(id, result))
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        self.log.record(&self.server, method, params);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.log.inner.lock().1.push(self.server.clone());
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }
}
