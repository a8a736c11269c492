//! MCP server descriptors.
//!
//! Servers are declared as a map keyed by server name, either under
//! `[mcp.servers.<name>]` in TOML or as the conventional
//! `{"mcpServers": {"<name>": {...}}}` JSON document. Declaration order
//! is preserved: it decides connection order and therefore which server
//! wins a tool-name collision.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Server descriptors in declaration order.
    #[serde(default, alias = "mcpServers", with = "servers_map")]
    pub servers: Vec<McpServerConfig>,

    /// Per-request timeout for JSON-RPC calls.
    #[serde(default = "d_30")]
    pub request_timeout_secs: u64,

    /// Timeout for establishing a channel (HTTP, SSE endpoint, websocket).
    #[serde(default = "d_10")]
    pub connect_timeout_secs: u64,

    /// What to do when two servers declare the same tool name.
    #[serde(default)]
    pub duplicate_tools: DuplicateToolPolicy,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            request_timeout_secs: d_30(),
            connect_timeout_secs: d_10(),
            duplicate_tools: DuplicateToolPolicy::default(),
        }
    }
}

/// Configuration for a single MCP server connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name (the map key it was declared under).
    #[serde(default, skip_serializing)]
    pub name: String,

    /// The command to spawn (e.g. `"uv"`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment variables to set on the spawned process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Endpoint URL for HTTP, SSE and websocket servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Explicit transport. When absent the transport is inferred, see
    /// [`McpServerConfig::transport_kind`].
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub transport: Option<McpTransportKind>,
}

/// Transport kind for connecting to an MCP server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    /// Child process speaking newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// Streamable HTTP, falling back to legacy SSE.
    #[serde(alias = "streamable-http", alias = "streamable_http", alias = "streamableHttp")]
    Http,
    /// Legacy HTTP+SSE only.
    Sse,
    #[serde(alias = "ws")]
    Websocket,
}

impl std::fmt::Display for McpTransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
            Self::Websocket => "websocket",
        };
        f.write_str(s)
    }
}

/// Policy for tool names declared by more than one server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateToolPolicy {
    /// The server connected last owns the name (a warning is logged).
    #[default]
    LastWins,
    /// Refuse to build the catalog.
    Error,
}

impl McpServerConfig {
    /// Resolve the transport for this descriptor.
    ///
    /// An explicit `transport`/`type` wins. Otherwise a `ws://`/`wss://`
    /// URL means websocket, any other URL means HTTP, and no URL means a
    /// subprocess.
    pub fn transport_kind(&self) -> McpTransportKind {
        if let Some(kind) = self.transport {
            return kind;
        }
        match self.url.as_deref() {
            Some(url) if url.starts_with("ws://") || url.starts_with("wss://") => {
                McpTransportKind::Websocket
            }
            Some(_) => McpTransportKind::Http,
            None => McpTransportKind::Stdio,
        }
    }

    /// Check that the parameters required by the resolved transport exist.
    pub fn validate(&self) -> Result<(), String> {
        match self.transport_kind() {
            McpTransportKind::Stdio if self.command.trim().is_empty() => {
                Err(format!("server '{}': stdio transport requires 'command'", self.name))
            }
            McpTransportKind::Http | McpTransportKind::Sse | McpTransportKind::Websocket
                if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) =>
            {
                Err(format!(
                    "server '{}': {} transport requires 'url'",
                    self.name,
                    self.transport_kind()
                ))
            }
            _ => Ok(()),
        }
    }

    /// The command or URL, for log lines.
    pub fn target(&self) -> &str {
        match self.transport_kind() {
            McpTransportKind::Stdio => &self.command,
            _ => self.url.as_deref().unwrap_or(""),
        }
    }
}

fn d_30() -> u64 {
    30
}

fn d_10() -> u64 {
    10
}

/// (De)serialize the server list as a name-keyed map, keeping source order.
mod servers_map {
    use super::McpServerConfig;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(servers: &[McpServerConfig], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(servers.len()))?;
        for server in servers {
            map.serialize_entry(&server.name, server)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<McpServerConfig>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ServersVisitor;

        impl<'de> Visitor<'de> for ServersVisitor {
            type Value = Vec<McpServerConfig>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of server name to server descriptor")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut servers = Vec::new();
                while let Some((name, mut server)) =
                    access.next_entry::<String, McpServerConfig>()?
                {
                    server.name = name;
                    servers.push(server);
                }
                Ok(servers)
            }
        }

        deserializer.deserialize_map(ServersVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.servers.is_empty());
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.duplicate_tools, DuplicateToolPolicy::LastWins);
    }

    #[test]
    fn mcp_servers_json_keeps_declaration_order() {
        let raw = r#"{
            "mcpServers": {
                "zeta": { "command": "uv", "args": ["run", "zeta.py"] },
                "alpha": { "url": "http://localhost:8000/mcp" },
                "maps": { "type": "websocket", "url": "wss://example.com/mcp" }
            }
        }"#;
        let cfg: McpConfig = serde_json::from_str(raw).unwrap();
        let names: Vec<&str> = cfg.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "maps"]);
        assert_eq!(cfg.servers[0].transport_kind(), McpTransportKind::Stdio);
        assert_eq!(cfg.servers[1].transport_kind(), McpTransportKind::Http);
        assert_eq!(cfg.servers[2].transport_kind(), McpTransportKind::Websocket);
    }

    #[test]
    fn toml_servers_table() {
        let raw = r#"
            request_timeout_secs = 5

            [servers.calculator]
            command = "python"
            args = ["calculator.py"]
            env = { PYTHONUNBUFFERED = "1" }

            [servers.remote]
            transport = "sse"
            url = "http://localhost:9000/sse"
        "#;
        let cfg: McpConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.request_timeout_secs, 5);
        assert_eq!(cfg.servers.len(), 2);
        assert_eq!(cfg.servers[0].name, "calculator");
        assert_eq!(cfg.servers[0].env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert_eq!(cfg.servers[1].transport_kind(), McpTransportKind::Sse);
    }

    #[test]
    fn ws_scheme_infers_websocket() {
        let cfg = McpServerConfig {
            url: Some("ws://127.0.0.1:9000".into()),
            ..Default::default()
        };
        assert_eq!(cfg.transport_kind(), McpTransportKind::Websocket);
    }

    #[test]
    fn explicit_transport_overrides_url_inference() {
        let raw = r#"{ "type": "streamable-http", "url": "ws://odd.example" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport_kind(), McpTransportKind::Http);
    }

    #[test]
    fn validate_requires_command_for_stdio() {
        let cfg = McpServerConfig {
            name: "broken".into(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("requires 'command'"));
    }

    #[test]
    fn validate_requires_url_for_sse() {
        let cfg = McpServerConfig {
            name: "remote".into(),
            transport: Some(McpTransportKind::Sse),
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("requires 'url'"));
    }

    #[test]
    fn serialize_back_to_name_keyed_map() {
        let raw = r#"{ "servers": { "a": { "command": "echo" } } }"#;
        let cfg: McpConfig = serde_json::from_str(raw).unwrap();
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["servers"]["a"]["command"], "echo");
        assert!(v["servers"]["a"].get("name").is_none());
    }
}
