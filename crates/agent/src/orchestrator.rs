//! The query loop: model round, tool round, repeat until the model answers
//! without requesting tools.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use tb_domain::config::{AgentConfig, UnknownToolPolicy};
use tb_domain::stream::Usage;
use tb_domain::tool::{Message, ToolCall};
use tb_mcp_client::{ToolCallResult, ToolCatalog};
use tb_providers::{ChatRequest, LlmProvider};

use crate::assembler::{self, AssembledResponse};
use crate::error::AgentError;
use crate::transcript::Transcript;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Settings & results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-query knobs, resolved from `[agent]` plus CLI overrides.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub stream: bool,
    pub max_rounds: usize,
    pub unknown_tool: UnknownToolPolicy,
    pub system_prompt: Option<String>,
    /// Model override; the provider default applies when `None`.
    pub model: Option<String>,
}

impl From<&AgentConfig> for LoopSettings {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            stream: cfg.stream,
            max_rounds: cfg.max_rounds,
            unknown_tool: cfg.unknown_tool,
            system_prompt: cfg.system_prompt.clone(),
            model: None,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    AwaitingModel,
    AwaitingToolResults(Vec<ToolCall>),
    Done,
}

/// Result of one completed query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub run_id: Uuid,
    /// Text of the final assistant message.
    pub answer: String,
    /// Full history, seed messages included.
    pub messages: Vec<Message>,
    pub rounds: usize,
    pub tool_calls: usize,
    pub usage: Usage,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator<'a> {
    provider: &'a dyn LlmProvider,
    catalog: &'a ToolCatalog,
    settings: &'a LoopSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(provider: &'a dyn LlmProvider, catalog: &'a ToolCatalog, settings: &'a LoopSettings) -> Self {
        Self {
            provider,
            catalog,
            settings,
        }
    }

    /// Run one query to completion.
    pub async fn run(&self, query: &str, cancel: &CancellationToken) -> Result<QueryOutcome, AgentError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "query",
            %run_id,
            provider = self.provider.provider_id(),
            tools = self.catalog.len(),
            rounds = tracing::field::Empty,
        );
        self.run_inner(run_id, query, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, AgentError> {
        let mut transcript = Transcript::new();
        if let Some(prompt) = &self.settings.system_prompt {
            transcript.push_system(prompt.clone());
        }
        transcript.push_user(query);

        let mut usage = Usage::default();
        let mut rounds = 0usize;
        let mut tool_calls = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if rounds >= self.settings.max_rounds {
                        tracing::warn!(max_rounds = self.settings.max_rounds, "tool loop limit reached");
                        return Err(AgentError::MaxRounds(self.settings.max_rounds));
                    }
                    rounds += 1;
                    let response = self.call_model(&transcript, rounds, cancel).await?;
                    if let Some(u) = &response.usage {
                        usage.add(u);
                    }
                    let calls = response.tool_calls.clone();
                    transcript.push_assistant(response.message);
                    if calls.is_empty() {
                        LoopState::Done
                    } else {
                        LoopState::AwaitingToolResults(calls)
                    }
                }
                LoopState::AwaitingToolResults(calls) => {
                    for call in &calls {
                        if cancel.is_cancelled() {
                            return Err(AgentError::Cancelled);
                        }
                        let content = self.execute(call, rounds, cancel).await?;
                        transcript.push_tool_result(&call.id, content)?;
                        tool_calls += 1;
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done => break,
            };
        }

        tracing::Span::current().record("rounds", rounds);
        tracing::info!(rounds, tool_calls, total_tokens = usage.total_tokens, "query finished");

        let answer = transcript.final_answer().unwrap_or_default().to_string();
        Ok(QueryOutcome {
            run_id,
            answer,
            messages: transcript.into_messages(),
            rounds,
            tool_calls,
            usage,
        })
    }

    async fn call_model(
        &self,
        transcript: &Transcript,
        round: usize,
        cancel: &CancellationToken,
    ) -> Result<AssembledResponse, AgentError> {
        let req = ChatRequest {
            messages: transcript.messages().to_vec(),
            tools: self.catalog.definitions().to_vec(),
            model: self.settings.model.clone(),
            ..Default::default()
        };

        let span = tracing::info_span!(
            "llm.call",
            "otel.kind" = "CLIENT",
            round,
            model = req.model.as_deref().unwrap_or("default"),
            stream = self.settings.stream,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        );

        let call = async {
            let response = if self.settings.stream {
                let stream = self.provider.chat_stream(&req).await?;
                assembler::assemble_stream(stream).await?
            } else {
                assembler::from_response(self.provider.chat(&req).await?)
            };
            if let Some(u) = &response.usage {
                tracing::Span::current().record("input_tokens", u.prompt_tokens);
                tracing::Span::current().record("output_tokens", u.completion_tokens);
            }
            tracing::debug!(
                tool_calls = response.tool_calls.len(),
                finish_reason = response.finish_reason.as_deref().unwrap_or(""),
                "model round complete"
            );
            Ok::<_, AgentError>(response)
        }
        .instrument(span);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            response = call => response,
        }
    }

    /// Resolve and invoke one tool call; returns the tool message content.
    async fn execute(&self, call: &ToolCall, round: usize, cancel: &CancellationToken) -> Result<String, AgentError> {
        let Some(session) = self.catalog.router().route(call.name()) else {
            return match self.settings.unknown_tool {
                UnknownToolPolicy::Fail => {
                    tracing::warn!(tool = %call.name(), call_id = %call.id, "model requested an unknown tool");
                    Err(AgentError::UnknownTool {
                        tool: call.name().to_string(),
                        call_id: call.id.clone(),
                    })
                }
                UnknownToolPolicy::Report => {
                    tracing::warn!(tool = %call.name(), call_id = %call.id, "unknown tool reported back to the model");
                    let result = ToolCallResult::error(format!("unknown tool '{}'", call.name()));
                    Ok(tool_message_content(&result))
                }
            };
        };

        let span = tracing::info_span!(
            "tool.call",
            "otel.kind" = "CLIENT",
            round,
            server = %session.name(),
            tool = %call.name(),
            call_id = %call.id,
            is_error = tracing::field::Empty,
        );

        let invoke = async {
            let arguments = call.parse_arguments();
            let result = session.call_tool(call.name(), arguments).await?;
            tracing::Span::current().record("is_error", result.is_error);
            if result.is_error {
                tracing::info!("tool reported an error");
            }
            Ok::<_, AgentError>(tool_message_content(&result))
        }
        .instrument(span);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            content = invoke => content,
        }
    }
}

/// Serialize a tool result into the tool-role message content:
/// `{"result": [texts...], "meta": <_meta or null>, "isError": bool}`.
pub fn tool_message_content(result: &ToolCallResult) -> String {
    serde_json::json!({
        "result": result.texts(),
        "meta": result.meta.clone().unwrap_or(serde_json::Value::Null),
        "isError": result.is_error,
    })
    .to_string()
}
