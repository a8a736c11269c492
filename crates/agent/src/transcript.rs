use std::collections::HashSet;

use tb_domain::tool::{Message, Role};

use crate::error::AgentError;

/// Append-only conversation history.
///
/// Messages are never modified once pushed. A tool result is accepted only
/// when an earlier assistant message requested that call id.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    requested: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        self.messages.push(Message::system(text));
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append an assistant message and remember the call ids it requests.
    pub fn push_assistant(&mut self, message: Message) {
        debug_assert_eq!(message.role(), Role::Assistant);
        for call in message.tool_calls() {
            self.requested.insert(call.id.clone());
        }
        self.messages.push(message);
    }

    pub fn push_tool_result(
        &mut self,
        tool_call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), AgentError> {
        if !self.requested.contains(tool_call_id) {
            return Err(AgentError::OrphanToolResult(tool_call_id.to_string()));
        }
        self.messages.push(Message::tool_result(tool_call_id, content));
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the last assistant message, if it has any.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::Assistant)
            .and_then(|m| m.text())
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
