//! One initialized connection to one MCP server.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::McpTransport;

/// An open session: transport plus the tools the server declared.
///
/// Created by [`McpSession::establish`], which runs the `initialize`
/// handshake and `tools/list`. Closing is idempotent; any call after
/// [`close`](Self::close) fails with [`McpError::TransportClosed`].
pub struct McpSession {
    name: String,
    transport: Box<dyn McpTransport>,
    tools: Vec<McpToolDef>,
    closed: AtomicBool,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("name", &self.name)
            .field("transport", &self.transport.kind())
            .field("tools", &self.tools.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl McpSession {
    /// Handshake over an already-open transport and discover its tools.
    ///
    /// On failure the transport is shut down before the error is returned.
    pub async fn establish(
        name: impl Into<String>,
        transport: Box<dyn McpTransport>,
    ) -> Result<Self, McpError> {
        let name = name.into();
        match handshake(&name, transport.as_ref()).await {
            Ok(tools) => {
                tracing::info!(
                    server = %name,
                    transport = transport.kind(),
                    tool_count = tools.len(),
                    "MCP server initialized"
                );
                Ok(Self {
                    name,
                    transport,
                    tools,
                    closed: AtomicBool::new(false),
                })
            }
            Err(e) => {
                transport.shutdown().await;
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tools discovered at connect time, in server order.
    pub fn tools(&self) -> &[McpToolDef] {
        &self.tools
    }

    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        !self.is_closed() && self.transport.is_alive()
    }

    /// Query `tools/list` again.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        self.ensure_open()?;
        request_tools(self.transport.as_ref()).await
    }

    /// Invoke a tool. A server-side tool failure is not an error here: it
    /// comes back as a result with `is_error` set.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        self.ensure_open()?;

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });
        let result = self
            .transport
            .send_request("tools/call", Some(params))
            .await?
            .into_result()
            .map_err(|e| McpError::Protocol(format!("tools/call failed: {e}")))?;

        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    /// Release the transport. Returns `true` only for the call that
    /// actually closed the session.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!(server = %self.name, "closing MCP session");
        self.transport.shutdown().await;
        true
    }

    fn ensure_open(&self) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::TransportClosed(self.name.clone()));
        }
        Ok(())
    }
}

async fn handshake(name: &str, transport: &dyn McpTransport) -> Result<Vec<McpToolDef>, McpError> {
    let params = serde_json::to_value(protocol::initialize_params())
        .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

    let init = transport
        .send_request("initialize", Some(params))
        .await?
        .into_result()
        .map_err(|e| McpError::Protocol(format!("initialize failed: {e}")))?;
    tracing::debug!(
        server = %name,
        protocol_version = init.get("protocolVersion").and_then(|v| v.as_str()).unwrap_or("?"),
        "MCP initialize response received"
    );

    transport
        .send_notification("notifications/initialized", None)
        .await?;

    request_tools(transport).await
}

async fn request_tools(transport: &dyn McpTransport) -> Result<Vec<McpToolDef>, McpError> {
    let result = transport
        .send_request("tools/list", None)
        .await?
        .into_result()
        .map_err(|e| McpError::Protocol(format!("tools/list failed: {e}")))?;
    let list: ToolsListResult = serde_json::from_value(result)
        .map_err(|e| McpError::Protocol(format!("failed to parse tools/list result: {e}")))?;
    Ok(list.tools)
}
