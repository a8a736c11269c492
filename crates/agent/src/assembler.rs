//! Reconstruction of model output into one canonical assistant message.
//!
//! Non-streamed responses already carry complete tool calls. Streamed
//! responses arrive as [`StreamEvent`]s: text tokens are concatenated and
//! tool-call fragments are folded into a single accumulator. A fragment
//! carrying a call id opens the accumulator; fragments without an id
//! append to its arguments. Only one call is tracked at a time: a
//! fragment with a different id replaces the open accumulator, so a
//! stream announcing several calls yields only the last one.

use futures_util::StreamExt;

use tb_domain::error::{Error, Result};
use tb_domain::stream::{BoxStream, StreamEvent, Usage};
use tb_domain::tool::{Message, ToolCall};
use tb_providers::ChatResponse;

/// Canonical form of one model round.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledResponse {
    /// The assistant message to append to the history. `content` is `None`
    /// whenever tool calls are present.
    pub message: Message,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

impl AssembledResponse {
    fn new(text: String, tool_calls: Vec<ToolCall>, usage: Option<Usage>, finish_reason: Option<String>) -> Self {
        let message = if tool_calls.is_empty() {
            Message::assistant(text)
        } else {
            Message::assistant_tool_calls(tool_calls.clone())
        };
        Self {
            message,
            tool_calls,
            usage,
            finish_reason,
        }
    }

    /// Final text of the round, `None` when tools were requested.
    pub fn text(&self) -> Option<&str> {
        self.message.text()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Canonicalize a complete response. Tool calls are taken verbatim.
pub fn from_response(resp: ChatResponse) -> AssembledResponse {
    AssembledResponse::new(
        resp.content.unwrap_or_default(),
        resp.tool_calls,
        resp.usage,
        resp.finish_reason,
    )
}

/// Drain a fragment stream and assemble it.
///
/// A [`StreamEvent::Error`] or a transport error ends assembly with `Err`.
pub async fn assemble_stream(mut stream: BoxStream<'_, Result<StreamEvent>>) -> Result<AssembledResponse> {
    let mut assembler = StreamAssembler::new();
    while let Some(event) = stream.next().await {
        assembler.feed(event?)?;
    }
    Ok(assembler.finish())
}

#[derive(Debug)]
struct Accumulator {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

/// Incremental assembler, fed one event at a time and finished once.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    text: String,
    current: Option<Accumulator>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, event: StreamEvent) -> Result<()> {
        match event {
            StreamEvent::Token { text } => self.text.push_str(&text),
            StreamEvent::ToolCallFragment {
                id,
                kind,
                name,
                arguments,
                ..
            } => self.fold_fragment(id, kind, name, arguments),
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                if usage.is_some() {
                    self.usage = usage;
                }
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason;
                }
            }
            StreamEvent::Error { message } => {
                return Err(Error::Provider {
                    provider: "stream".into(),
                    message,
                })
            }
        }
        Ok(())
    }

    fn fold_fragment(
        &mut self,
        id: Option<String>,
        kind: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) {
        if let Some(id) = id {
            if self.current.as_ref().is_some_and(|c| c.id == id) {
                // Some endpoints repeat the id on every fragment.
                self.append(name, arguments);
                return;
            }
            if let Some(replaced) = self.current.take() {
                tracing::warn!(
                    call_id = %replaced.id,
                    tool = %replaced.name,
                    next_call_id = %id,
                    "stream announced another tool call; only the last one is kept"
                );
            }
            self.current = Some(Accumulator {
                id,
                kind: kind.unwrap_or_else(|| "function".into()),
                name: name.unwrap_or_default(),
                arguments: arguments.unwrap_or_default(),
            });
            return;
        }
        if self.current.is_none() {
            tracing::debug!("tool-call fragment without an open call; ignored");
            return;
        }
        self.append(name, arguments);
    }

    fn append(&mut self, name: Option<String>, arguments: Option<String>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if current.name.is_empty() {
            if let Some(name) = name {
                current.name = name;
            }
        }
        if let Some(arguments) = arguments {
            current.arguments.push_str(&arguments);
        }
    }

    pub fn finish(self) -> AssembledResponse {
        let tool_calls = self
            .current
            .map(|acc| {
                let mut call = ToolCall::new(acc.id, acc.name, acc.arguments);
                call.kind = acc.kind;
                vec![call]
            })
            .unwrap_or_default();
        AssembledResponse::new(self.text, tool_calls, self.usage, self.finish_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(id: Option<&str>, name: Option<&str>, args: &str) -> StreamEvent {
        StreamEvent::ToolCallFragment {
            index: 0,
            id: id.map(String::from),
            kind: id.map(|_| "function".to_string()),
            name: name.map(String::from),
            arguments: Some(args.to_string()),
        }
    }

    #[test]
    fn text_only_stream() {
        let mut asm = StreamAssembler::new();
        asm.feed(StreamEvent::Token { text: "The area is ".into() }).unwrap();
        asm.feed(StreamEvent::Token { text: "201.06".into() }).unwrap();
        asm.feed(StreamEvent::Done {
            usage: Some(Usage { prompt_tokens: 5, completion_tokens: 3, total_tokens: 8 }),
            finish_reason: Some("stop".into()),
        })
        .unwrap();
        let out = asm.finish();
        assert_eq!(out.text(), Some("The area is 201.06"));
        assert!(!out.has_tool_calls());
        assert_eq!(out.usage.unwrap().total_tokens, 8);
    }

    #[test]
    fn fragments_match_non_streamed_arguments() {
        let whole = r#"{"python_expression": "math.pi * 8 ** 2"}"#;
        let mut asm = StreamAssembler::new();
        asm.feed(fragment(Some("call_1"), Some("calculator"), "")).unwrap();
        for piece in [r#"{"python_"#, r#"expression": "#, r#""math.pi * 8"#, r#" ** 2"}"#] {
            asm.feed(fragment(None, None, piece)).unwrap();
        }
        let streamed = asm.finish();

        let plain = from_response(ChatResponse {
            tool_calls: vec![ToolCall::new("call_1", "calculator", whole)],
            ..Default::default()
        });

        assert_eq!(streamed.tool_calls.len(), 1);
        assert_eq!(
            streamed.tool_calls[0].parse_arguments(),
            plain.tool_calls[0].parse_arguments()
        );
        assert_eq!(streamed.tool_calls[0].name(), "calculator");
        assert_eq!(streamed.message, plain.message);
    }

    #[test]
    fn content_is_null_when_tool_called() {
        let mut asm = StreamAssembler::new();
        asm.feed(StreamEvent::Token { text: "Let me compute.".into() }).unwrap();
        asm.feed(fragment(Some("call_9"), Some("calculator"), "{}")).unwrap();
        let out = asm.finish();
        assert_eq!(out.text(), None);
        let wire = serde_json::to_value(&out.message).unwrap();
        assert!(wire["content"].is_null());
        assert_eq!(wire["tool_calls"][0]["id"], "call_9");
    }

    #[test]
    fn new_id_replaces_open_call() {
        let mut asm = StreamAssembler::new();
        asm.feed(fragment(Some("call_a"), Some("time"), "{}")).unwrap();
        asm.feed(fragment(Some("call_b"), Some("calculator"), "{\"python_expression\":")).unwrap();
        asm.feed(fragment(None, None, "\"1+1\"}")).unwrap();
        let out = asm.finish();
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].id, "call_b");
        assert_eq!(out.tool_calls[0].parse_arguments(), json!({"python_expression": "1+1"}));
    }

    #[test]
    fn repeated_id_keeps_appending() {
        let mut asm = StreamAssembler::new();
        asm.feed(fragment(Some("call_a"), Some("calculator"), "{\"python_expression\":")).unwrap();
        asm.feed(fragment(Some("call_a"), None, "\"2**10\"}")).unwrap();
        let out = asm.finish();
        assert_eq!(out.tool_calls[0].parse_arguments()["python_expression"], "2**10");
    }

    #[test]
    fn orphan_fragment_is_ignored() {
        let mut asm = StreamAssembler::new();
        asm.feed(fragment(None, None, "{\"x\":1}")).unwrap();
        assert!(!asm.finish().has_tool_calls());
    }

    #[test]
    fn non_streamed_keeps_every_call() {
        let out = from_response(ChatResponse {
            content: Some("ignored".into()),
            tool_calls: vec![
                ToolCall::new("c1", "time", "{}"),
                ToolCall::new("c2", "calculator", "{}"),
            ],
            ..Default::default()
        });
        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.text(), None);
    }

    #[tokio::test]
    async fn error_event_fails_assembly() {
        let events: Vec<Result<StreamEvent>> = vec![
            Ok(StreamEvent::Token { text: "partial".into() }),
            Ok(StreamEvent::Error { message: "overloaded".into() }),
        ];
        let stream: BoxStream<'static, Result<StreamEvent>> =
            Box::pin(futures_util::stream::iter(events));
        let err = assemble_stream(stream).await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }
}
