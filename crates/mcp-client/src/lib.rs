//! `tb-mcp-client`: MCP (Model Context Protocol) client for toolbridge.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for talking to MCP servers.
//! - Transports over stdio, streamable HTTP, legacy SSE and websocket.
//! - [`McpSession`]: one initialized server connection with its tools.
//! - [`McpManager`]: connects configured servers in order and releases
//!   them in reverse order.
//! - [`ToolCatalog`] / [`ToolRouter`]: the merged tool list and the
//!   name → session routing table.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tb_mcp_client::McpManager;
//!
//! let (mut manager, report) = McpManager::connect_all(&config.mcp).await;
//! let catalog = manager.catalog()?;
//! if let Some(session) = catalog.router().route("calculator") {
//!     let result = session.call_tool("calculator", json!({"python_expression": "2 ** 10"})).await?;
//! }
//! manager.shutdown().await;
//! ```

pub mod catalog;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::{ToolCatalog, ToolCollision, ToolRouter};
pub use error::McpError;
pub use manager::{connect, ConnectFailure, ConnectReport, McpManager, Timeouts};
pub use protocol::{McpToolDef, ToolCallResult};
pub use session::McpSession;
pub use transport::{McpTransport, TransportError};
