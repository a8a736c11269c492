//! Connecting from configuration: partial failures, total failure.

#![cfg(unix)]

mod common;

use serde_json::json;

use common::{answer, call, ScriptedProvider};
use tb_agent::{AgentError, ToolBridge};
use tb_domain::config::{Config, McpServerConfig};
use tb_mcp_client::McpError;

const SERVER_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"sh","version":"1"}}}\n' "$id"
      ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"calculator","description":"Evaluate a Python expression","inputSchema":{"type":"object"}}]}}\n' "$id"
      ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"201.06192982974676"}],"isError":false}}\n' "$id"
      ;;
  esac
done
"#;

fn script_server(dir: &tempfile::TempDir) -> McpServerConfig {
    let path = dir.path().join("calculator.sh");
    std::fs::write(&path, SERVER_SCRIPT).unwrap();
    McpServerConfig {
        name: "calculator".into(),
        command: "sh".into(),
        args: vec![path.to_string_lossy().into_owned()],
        ..Default::default()
    }
}

fn missing_server() -> McpServerConfig {
    McpServerConfig {
        name: "ghost".into(),
        command: "/nonexistent/tb-ghost-server".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn one_missing_server_does_not_block_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.mcp.servers = vec![missing_server(), script_server(&dir)];

    let provider = ScriptedProvider::new([
        call("call_1", "calculator", json!({"python_expression": "math.pi * 8 ** 2"})),
        answer("About 201.06."),
    ]);
    let mut bridge = ToolBridge::connect(&config, provider).await.unwrap();

    let report = bridge.report();
    assert_eq!(report.connected, vec!["calculator"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].server, "ghost");
    assert!(matches!(&report.failed[0].error, McpError::Connection { server, .. } if server == "ghost"));

    let outcome = bridge.process_query("area of a circle with radius 8?").await.unwrap();
    assert_eq!(outcome.answer, "About 201.06.");
    assert_eq!(outcome.tool_calls, 1);

    assert_eq!(bridge.cleanup().await, 1);
}

#[tokio::test]
async fn all_servers_failing_is_an_error() {
    let mut config = Config::default();
    config.mcp.servers = vec![missing_server()];

    let err = ToolBridge::connect(&config, ScriptedProvider::new(Vec::<common::Reply>::new()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AgentError::NoSessions { configured: 1 }), "{err}");
}

#[tokio::test]
async fn no_servers_configured_still_answers() {
    let provider = ScriptedProvider::new([answer("Hello.")]);
    let mut bridge = ToolBridge::connect(&Config::default(), provider.clone()).await.unwrap();

    assert!(bridge.catalog().is_empty());
    let outcome = bridge.process_query("hi").await.unwrap();
    assert_eq!(outcome.answer, "Hello.");
    assert!(provider.requests()[0].tools.is_empty());
    assert_eq!(bridge.cleanup().await, 0);
}
