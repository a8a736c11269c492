mod agent;
mod llm;
mod mcp;
mod observability;

pub use agent::*;
pub use llm::*;
pub use mcp::*;
pub use observability::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse a JSON config.
    ///
    /// Besides the regular layout, a bare `{"mcpServers": {...}}` document
    /// is accepted and becomes the `mcp` section of an otherwise default
    /// config.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        // Sections are deserialized straight from the text: a `Value` map
        // would sort `mcpServers` keys and lose connection order.
        let layout: JsonLayout = serde_json::from_str(raw)?;
        if layout.mcp_servers.is_some() && layout.mcp.is_none() {
            let mcp: McpConfig = serde_json::from_str(raw)?;
            return Ok(Self {
                mcp,
                ..Default::default()
            });
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Load from `path`; `.json` files are parsed as JSON, anything else as
    /// TOML. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw)
        } else {
            toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
        }
    }
}

/// Which top-level keys a JSON config carries.
#[derive(Deserialize)]
struct JsonLayout {
    #[serde(default)]
    mcp: Option<serde::de::IgnoredAny>,
    #[serde(default, rename = "mcpServers")]
    mcp_servers: Option<serde::de::IgnoredAny>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.llm.base_url.trim().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        if self.agent.max_rounds == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "agent.max_rounds".into(),
                message: "max_rounds must be greater than 0".into(),
            });
        }

        if self.mcp.servers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "mcp.servers".into(),
                message: "no MCP servers configured; the model will have no tools".into(),
            });
        }

        let mut seen = HashSet::new();
        for server in &self.mcp.servers {
            let field = format!("mcp.servers.{}", server.name);
            if !seen.insert(server.name.as_str()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: field.clone(),
                    message: "server declared more than once".into(),
                });
            }
            if let Err(message) = server.validate() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field,
                    message,
                });
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_mcp_servers_json_becomes_mcp_section() {
        let raw = r#"{ "mcpServers": { "calculator": { "command": "python", "args": ["calc.py"] } } }"#;
        let cfg = Config::from_json_str(raw).unwrap();
        assert_eq!(cfg.mcp.servers.len(), 1);
        assert_eq!(cfg.mcp.servers[0].name, "calculator");
        assert_eq!(cfg.llm.model, "qwen-plus");
    }

    #[test]
    fn bare_mcp_servers_keep_file_order() {
        let raw = r#"{ "mcpServers": {
            "zeta": { "command": "z" },
            "alpha": { "command": "a" },
            "mid": { "url": "http://localhost:8000/mcp" }
        } }"#;
        let cfg = Config::from_json_str(raw).unwrap();
        let names: Vec<&str> = cfg.mcp.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn full_json_layout_keeps_server_order() {
        let raw = r#"{ "mcp": { "servers": { "b": { "command": "b" }, "a": { "command": "a" } } } }"#;
        let cfg = Config::from_json_str(raw).unwrap();
        assert_eq!(cfg.mcp.servers[0].name, "b");
        assert_eq!(cfg.mcp.servers[1].name, "a");
    }

    #[test]
    fn full_json_layout() {
        let raw = r#"{ "agent": { "stream": true }, "mcp": { "servers": {} } }"#;
        let cfg = Config::from_json_str(raw).unwrap();
        assert!(cfg.agent.stream);
        assert!(cfg.mcp.servers.is_empty());
    }

    #[test]
    fn validate_flags_missing_command() {
        let raw = r#"{ "mcpServers": { "broken": {} } }"#;
        let cfg = Config::from_json_str(raw).unwrap();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "mcp.servers.broken"));
    }

    #[test]
    fn validate_warns_without_servers() {
        let issues = Config::default().validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError {
            severity: ConfigSeverity::Error,
            field: "agent.max_rounds".into(),
            message: "bad".into(),
        };
        assert_eq!(e.to_string(), "[ERROR] agent.max_rounds: bad");
    }
}
