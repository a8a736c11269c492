use crate::transport::TransportError;

/// Errors specific to MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The server could not be reached or did not complete the handshake
    /// on any applicable transport.
    #[error("failed to connect to MCP server '{server}': {reason}")]
    Connection { server: String, reason: String },

    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// The session was used after it was closed.
    #[error("MCP session '{0}' is closed")]
    TransportClosed(String),

    #[error("tool '{tool}' is declared by both '{first}' and '{second}'")]
    DuplicateTool {
        tool: String,
        first: String,
        second: String,
    },
}

impl From<McpError> for tb_domain::error::Error {
    fn from(e: McpError) -> Self {
        tb_domain::error::Error::Other(e.to_string())
    }
}
