use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM endpoint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Environment variable overriding [`LlmConfig::base_url`].
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
/// Environment variable overriding [`LlmConfig::model`].
pub const MODEL_ENV: &str = "MODEL_NAME";

/// Settings for the OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "d_120")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            model: d_model(),
            auth: AuthConfig::default(),
            temperature: None,
            max_tokens: None,
            timeout_secs: d_120(),
        }
    }
}

impl LlmConfig {
    /// Apply `OPENAI_BASE_URL` / `MODEL_NAME` when they are set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!(base_url = %url, "LLM base URL from environment");
                self.base_url = url;
            }
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                tracing::debug!(model = %model, "LLM model from environment");
                self.model = model;
            }
        }
    }
}

/// How the API key is obtained and sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Plaintext key. Prefer `env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Environment variable holding the key.
    #[serde(default = "d_key_env")]
    pub env: String,
    #[serde(default = "d_header")]
    pub header: String,
    #[serde(default = "d_prefix")]
    pub prefix: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            key: None,
            env: d_key_env(),
            header: d_header(),
            prefix: d_prefix(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "qwen-plus".into()
}
fn d_120() -> u64 {
    120
}
fn d_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_header() -> String {
    "Authorization".into()
}
fn d_prefix() -> String {
    "Bearer ".into()
}
