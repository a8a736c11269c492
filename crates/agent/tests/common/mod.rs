//! Scripted model and MCP sessions shared by the bridge tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use tb_domain::error::{Error, Result};
use tb_domain::stream::{BoxStream, StreamEvent, Usage};
use tb_domain::tool::ToolCall;
use tb_mcp_client::testing::{CallLog, ScriptedTransport};
use tb_mcp_client::McpSession;
use tb_providers::{ChatRequest, ChatResponse, LlmProvider};

pub const AREA: &str = "201.06192982974676";

/// One scripted model round.
pub enum Reply {
    Complete(ChatResponse),
    Stream(Vec<StreamEvent>),
    /// Never answers; used to exercise cancellation.
    Hang,
}

/// A provider that plays back [`Reply`]s in order and records every
/// request it receives.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    fn next(&self, req: &ChatRequest) -> Result<Reply> {
        self.requests.lock().push(req.clone());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Other("script exhausted".into()))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        match self.next(req)? {
            Reply::Complete(resp) => Ok(resp),
            Reply::Stream(_) => Err(Error::Other("stream reply scripted for chat()".into())),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        match self.next(req)? {
            Reply::Stream(events) => Ok(Box::pin(futures_util::stream::iter(
                events.into_iter().map(Ok),
            ))),
            Reply::Complete(_) => Err(Error::Other("complete reply scripted for chat_stream()".into())),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

pub fn usage(prompt: u32, completion: u32) -> Usage {
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
    }
}

/// A round that requests one tool.
pub fn call(id: &str, tool: &str, arguments: Value) -> Reply {
    Reply::Complete(ChatResponse {
        content: None,
        tool_calls: vec![ToolCall::new(id, tool, arguments.to_string())],
        usage: Some(usage(10, 5)),
        model: "scripted".into(),
        finish_reason: Some("tool_calls".into()),
    })
}

/// A round that answers in text.
pub fn answer(text: &str) -> Reply {
    Reply::Complete(ChatResponse {
        content: Some(text.into()),
        tool_calls: Vec::new(),
        usage: Some(usage(20, 8)),
        model: "scripted".into(),
        finish_reason: Some("stop".into()),
    })
}

pub fn calculator_tool() -> Value {
    json!({
        "name": "calculator",
        "description": "Evaluate a Python expression",
        "inputSchema": {
            "type": "object",
            "properties": {"python_expression": {"type": "string"}},
            "required": ["python_expression"]
        }
    })
}

pub fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": false})
}

pub async fn session(name: &str, transport: ScriptedTransport) -> McpSession {
    McpSession::establish(name, Box::new(transport)).await.unwrap()
}

/// A calculator server that answers every call with [`AREA`].
pub fn calculator(log: &CallLog) -> ScriptedTransport {
    ScriptedTransport::new("calculator")
        .with_tools(json!([calculator_tool()]))
        .on_call("calculator", text_result(AREA))
        .with_log(log.clone())
}

/// A server exposing a single `time` tool that reports its own name.
pub fn clock(name: &str, log: &CallLog) -> ScriptedTransport {
    ScriptedTransport::new(name)
        .with_tools(json!([{"name": "time", "description": format!("time from {name}")}]))
        .on_call("time", text_result(&format!("12:00 from {name}")))
        .with_log(log.clone())
}
