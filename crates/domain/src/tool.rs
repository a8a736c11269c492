use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call requested by the model.
///
/// Mirrors the chat-completions wire shape so assistant messages can be
/// echoed back to the endpoint unchanged. `arguments` is kept as the raw
/// string the model produced; use [`ToolCall::parse_arguments`] to decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "d_function")]
    pub kind: String,
    pub function: FunctionCall,
}

/// Name and raw JSON arguments of a requested function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn d_function() -> String {
    "function".into()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: d_function(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Decode the raw argument string.
    ///
    /// Empty or malformed arguments decode to an empty object; the model
    /// still gets a tool result instead of the whole query failing.
    pub fn parse_arguments(&self) -> Value {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Value::Object(Default::default());
        }
        match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    call_id = %self.id,
                    tool = %self.function.name,
                    error = %e,
                    "tool call arguments are not valid JSON; defaulting to empty object"
                );
                Value::Object(Default::default())
            }
        }
    }
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Project into the `{type: "function", function: {...}}` schema the
    /// completion endpoint expects.
    pub fn to_function_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A message in the conversation.
///
/// Serializes directly to the chat-completions message format. Assistant
/// messages carrying tool calls always serialize `content` as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { content: text.into() }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { content: text.into() }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Assistant turn that requests tools. Content is dropped: the endpoint
    /// rejects text alongside tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Plain-text content, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } | Self::Tool { content, .. } => {
                Some(content.as_str())
            }
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }

    /// Tool calls carried by an assistant message (empty otherwise).
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}
