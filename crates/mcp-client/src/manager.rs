//! MCP manager: connects configured servers in order, owns the resulting
//! sessions and releases them in reverse order.

use std::sync::Arc;
use std::time::Duration;

use tb_domain::config::{DuplicateToolPolicy, McpConfig, McpServerConfig, McpTransportKind};

use crate::catalog::ToolCatalog;
use crate::error::McpError;
use crate::session::McpSession;
use crate::transport::{
    McpTransport, SseTransport, StdioTransport, StreamableHttpTransport, WebSocketTransport,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Single-server connect
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection deadlines applied to every transport.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Timeouts {
    pub fn from_config(config: &McpConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_timeout_secs),
            request: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Open a channel for `server`, run the handshake and list its tools.
///
/// HTTP descriptors try streamable HTTP first and fall back to legacy SSE
/// on any failure; the error reports both attempts.
pub async fn connect(server: &McpServerConfig, timeouts: Timeouts) -> Result<McpSession, McpError> {
    server.validate().map_err(|reason| connection_error(server, reason))?;

    let kind = server.transport_kind();
    tracing::info!(
        server = %server.name,
        transport = %kind,
        target = %server.target(),
        "connecting to MCP server"
    );

    match kind {
        McpTransportKind::Stdio => {
            let transport = StdioTransport::spawn(server, timeouts.request)
                .map_err(|e| connection_error(server, e))?;
            establish(server, Box::new(transport)).await
        }
        McpTransportKind::Websocket => {
            let transport = WebSocketTransport::connect(
                &server.name,
                server.target(),
                timeouts.connect,
                timeouts.request,
            )
            .await
            .map_err(|e| connection_error(server, e))?;
            establish(server, Box::new(transport)).await
        }
        McpTransportKind::Sse => connect_sse(server, timeouts).await,
        McpTransportKind::Http => match connect_streamable(server, timeouts).await {
            Ok(session) => Ok(session),
            Err(streamable_err) => {
                tracing::info!(
                    server = %server.name,
                    error = %streamable_err,
                    "streamable HTTP failed, falling back to SSE"
                );
                connect_sse(server, timeouts).await.map_err(|sse_err| {
                    connection_error(
                        server,
                        format!("streamable HTTP: {streamable_err}; SSE: {sse_err}"),
                    )
                })
            }
        },
    }
}

async fn connect_streamable(server: &McpServerConfig, timeouts: Timeouts) -> Result<McpSession, McpError> {
    let transport = StreamableHttpTransport::new(
        &server.name,
        server.target(),
        timeouts.connect,
        timeouts.request,
    )?;
    McpSession::establish(&server.name, Box::new(transport)).await
}

async fn connect_sse(server: &McpServerConfig, timeouts: Timeouts) -> Result<McpSession, McpError> {
    let transport = SseTransport::connect(
        &server.name,
        server.target(),
        timeouts.connect,
        timeouts.request,
    )
    .await
    .map_err(|e| connection_error(server, e))?;
    establish(server, Box::new(transport)).await
}

async fn establish(server: &McpServerConfig, transport: Box<dyn McpTransport>) -> Result<McpSession, McpError> {
    McpSession::establish(&server.name, transport)
        .await
        .map_err(|e| match e {
            e @ McpError::Connection { .. } => e,
            other => connection_error(server, other),
        })
}

fn connection_error(server: &McpServerConfig, reason: impl std::fmt::Display) -> McpError {
    McpError::Connection {
        server: server.name.clone(),
        reason: reason.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A server that could not be connected.
#[derive(Debug)]
pub struct ConnectFailure {
    pub server: String,
    pub error: McpError,
}

/// Outcome of [`McpManager::connect_all`].
#[derive(Debug, Default)]
pub struct ConnectReport {
    /// Names of connected servers, in connection order.
    pub connected: Vec<String>,
    pub failed: Vec<ConnectFailure>,
}

impl ConnectReport {
    pub fn configured(&self) -> usize {
        self.connected.len() + self.failed.len()
    }

    pub fn all_failed(&self) -> bool {
        self.connected.is_empty() && !self.failed.is_empty()
    }
}

/// Holds every open session in acquisition order.
pub struct McpManager {
    sessions: Vec<Arc<McpSession>>,
    timeouts: Timeouts,
    duplicate_tools: DuplicateToolPolicy,
}

impl McpManager {
    /// A manager with no sessions yet.
    pub fn new(config: &McpConfig) -> Self {
        Self {
            sessions: Vec::new(),
            timeouts: Timeouts::from_config(config),
            duplicate_tools: config.duplicate_tools,
        }
    }

    /// Connect every configured server, sequentially and in declaration
    /// order. A server that fails is logged and recorded; the rest still
    /// connect.
    pub async fn connect_all(config: &McpConfig) -> (Self, ConnectReport) {
        let mut manager = Self::new(config);
        let mut report = ConnectReport::default();

        for server in &config.servers {
            match manager.connect_one(server).await {
                Ok(_) => report.connected.push(server.name.clone()),
                Err(error) => {
                    tracing::warn!(
                        server = %server.name,
                        error = %error,
                        "failed to connect MCP server, skipping"
                    );
                    report.failed.push(ConnectFailure {
                        server: server.name.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            connected = report.connected.len(),
            failed = report.failed.len(),
            "MCP manager ready"
        );
        (manager, report)
    }

    /// Connect one more server and push it onto the cleanup stack.
    pub async fn connect_one(&mut self, server: &McpServerConfig) -> Result<Arc<McpSession>, McpError> {
        let session = connect(server, self.timeouts).await?;
        Ok(self.adopt(session))
    }

    /// Take ownership of an already established session.
    pub fn adopt(&mut self, session: McpSession) -> Arc<McpSession> {
        let session = Arc::new(session);
        self.sessions.push(Arc::clone(&session));
        session
    }

    /// Open sessions in acquisition order.
    pub fn sessions(&self) -> &[Arc<McpSession>] {
        &self.sessions
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Build the merged catalog and router over the current sessions.
    pub fn catalog(&self) -> Result<ToolCatalog, McpError> {
        ToolCatalog::build(&self.sessions, self.duplicate_tools)
    }

    /// Close every session, most recently acquired first. Each session is
    /// released once; later calls are no-ops. Returns how many sessions
    /// this call closed.
    pub async fn shutdown(&mut self) -> usize {
        let mut closed = 0;
        while let Some(session) = self.sessions.pop() {
            if session.close().await {
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::info!(closed, "MCP sessions released");
        }
        closed
    }
}

impl Drop for McpManager {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            tracing::warn!(
                open = self.sessions.len(),
                "MCP manager dropped without shutdown; transports are released on drop"
            );
        }
    }
}
