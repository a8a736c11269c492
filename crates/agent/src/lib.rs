//! Tool orchestration over MCP servers: connect, let the model call tools
//! until it answers, release every session.

pub mod assembler;
pub mod bridge;
pub mod cli;
pub mod error;
pub mod orchestrator;
pub mod transcript;

pub use assembler::{AssembledResponse, StreamAssembler};
pub use bridge::ToolBridge;
pub use error::AgentError;
pub use orchestrator::{LoopSettings, LoopState, Orchestrator, QueryOutcome};
pub use transcript::Transcript;
