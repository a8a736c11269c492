//! `tb-providers`: LLM completion endpoint adapters.
//!
//! Only the OpenAI chat-completions contract is implemented; it covers
//! OpenAI, DashScope (Qwen), DeepSeek, Ollama, vLLM and LM Studio.

pub mod openai_compat;
pub mod traits;
pub(crate) mod sse;
pub mod util;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
