//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, DashScope, DeepSeek, Ollama, vLLM, LM Studio and any
//! other endpoint that follows the chat completions contract.

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key};
use serde_json::Value;
use tb_domain::config::LlmConfig;
use tb_domain::error::{Error, Result};
use tb_domain::stream::{BoxStream, StreamEvent, Usage};
use tb_domain::tool::ToolCall;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider from the `[llm]` config section.
    ///
    /// A missing API key is not fatal: local endpoints (Ollama, vLLM)
    /// usually accept unauthenticated requests.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = match resolve_api_key(&cfg.auth) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "no API key resolved; sending unauthenticated requests");
                None
            }
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "openai_compat".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            auth_header: cfg.auth.header.clone(),
            auth_prefix: cfg.auth.prefix.clone(),
            default_model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header(&self.auth_header, format!("{}{}", self.auth_prefix, key)),
            None => builder,
        }
    }

    // ── Internal: build the JSON body ─────────────────────────────

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Result<Value> {
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": serde_json::to_value(&req.messages)?,
            "stream": stream,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(|t| t.to_function_schema()).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature.or(self.temperature) {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = serde_json::json!(max);
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        Ok(body)
    }

    async fn post_checked(&self, body: &Value) -> Result<reqwest::Response> {
        let url = self.chat_url();
        tracing::debug!(provider = %self.id, url = %url, "chat completions request");

        let resp = self
            .authed_post(&url)
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }
        Ok(resp)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: "openai_compat".into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: "openai_compat".into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .map(String::from);

    let tool_calls = match message.get("tool_calls") {
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|tc| {
                let call = parse_tool_call(tc);
                if call.is_none() {
                    tracing::warn!(
                        id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("<none>"),
                        "dropping malformed tool call (missing id or function name)"
                    );
                }
                call
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(ChatResponse {
        content,
        tool_calls,
        usage: body.get("usage").and_then(parse_openai_usage),
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

/// One entry of `message.tool_calls`, arguments kept as the raw string.
fn parse_tool_call(tc: &Value) -> Option<ToolCall> {
    let id = tc.get("id")?.as_str()?;
    let func = tc.get("function")?;
    let name = func.get("name")?.as_str()?;
    let arguments = match func.get("arguments") {
        Some(Value::String(s)) => s.clone(),
        // A few servers send the arguments already decoded.
        Some(v @ Value::Object(_)) => v.to_string(),
        _ => String::new(),
    };
    let mut call = ToolCall::new(id, name, arguments);
    if let Some(kind) = tc.get("type").and_then(|v| v.as_str()) {
        call.kind = kind.to_string();
    }
    Some(call)
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turn one `data:` payload into stream events.
///
/// A single chunk may carry text, tool-call fragments and a finish reason
/// at once; they are emitted in that order.
fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: None,
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return vec![Ok(StreamEvent::Error { message })];
    }

    let usage = v.get("usage").and_then(parse_openai_usage);
    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    // Usage-only chunk (stream_options.include_usage).
    let Some(choice) = choice else {
        return match usage {
            Some(usage) => vec![Ok(StreamEvent::Done {
                usage: Some(usage),
                finish_reason: None,
            })],
            None => Vec::new(),
        };
    };

    let mut events = Vec::new();
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token {
                text: text.to_string(),
            }));
        }
    }

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let function = tc.get("function");
            let str_field = |obj: Option<&Value>, key: &str| {
                obj.and_then(|o| o.get(key))
                    .and_then(|v| v.as_str())
                    .map(String::from)
            };
            events.push(Ok(StreamEvent::ToolCallFragment {
                index: tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                id: str_field(Some(tc), "id").filter(|id| !id.is_empty()),
                kind: str_field(Some(tc), "type"),
                name: str_field(function, "name"),
                arguments: str_field(function, "arguments"),
            }));
        }
    }

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        events.push(Ok(StreamEvent::Done {
            usage,
            finish_reason: Some(fr.to_string()),
        }));
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_chat_body(req, false)?;
        let resp = self.post_checked(&body).await?;
        let resp_text = resp.text().await.map_err(from_reqwest)?;
        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&resp_json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.build_chat_body(req, true)?;
        let resp = self.post_checked(&body).await?;
        Ok(crate::sse::sse_response_stream(resp, parse_sse_data))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
