use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestration loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Request streamed completions and assemble them incrementally.
    #[serde(default)]
    pub stream: bool,
    /// Upper bound on model rounds for one query.
    #[serde(default = "d_25")]
    pub max_rounds: usize,
    #[serde(default)]
    pub unknown_tool: UnknownToolPolicy,
    /// Optional system message placed before the user query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            stream: false,
            max_rounds: d_25(),
            unknown_tool: UnknownToolPolicy::default(),
            system_prompt: None,
        }
    }
}

/// What to do when the model asks for a tool no server declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownToolPolicy {
    /// Abort the query.
    #[default]
    Fail,
    /// Answer the call with an error tool result and keep going.
    Report,
}

fn d_25() -> usize {
    25
}
