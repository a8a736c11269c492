use tb_mcp_client::McpError;

/// Errors that escape the public entry points of the bridge.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The model asked for a tool no connected server declared.
    #[error("unknown tool '{tool}' requested by call {call_id}")]
    UnknownTool { tool: String, call_id: String },

    /// Servers were configured but none could be connected.
    #[error("none of the {configured} configured MCP servers could be connected")]
    NoSessions { configured: usize },

    /// Model endpoint failure (construction, HTTP, stream error).
    #[error("provider: {0}")]
    Provider(#[from] tb_domain::error::Error),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error("tool loop limit reached ({0} rounds)")]
    MaxRounds(usize),

    #[error("query cancelled")]
    Cancelled,

    /// A tool result referenced a call id the transcript never saw.
    #[error("tool result for unknown call id '{0}'")]
    OrphanToolResult(String),
}
