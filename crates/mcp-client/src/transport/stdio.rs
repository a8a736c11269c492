use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::{McpTransport, TransportError};
use crate::protocol::{decode_incoming, Incoming, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use tb_domain::config::McpServerConfig;

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// How long a child gets to exit after its stdin is closed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Stdio transport: talks to a child process over stdin/stdout.
///
/// Request/response cycles are serialized by `request_lock`, so a reply is
/// always read by the caller that sent the request.
pub struct StdioTransport {
    server: String,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Spawn the configured command. A missing executable fails here with
    /// [`TransportError::Io`].
    pub fn spawn(config: &McpServerConfig, request_timeout: Duration) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| broken_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| broken_pipe("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain(config.name.clone(), stderr);
        }

        tracing::debug!(
            server = %config.name,
            command = %config.command,
            pid = ?child.id(),
            "spawned MCP server process"
        );

        Ok(Self {
            server: config.name.clone(),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            request_timeout,
        })
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdin = self.stdin.lock().await;
        let written = async {
            stdin.write_all(json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Next line that looks like JSON. Empty and non-JSON lines are skipped,
    /// up to [`MAX_SKIP_LINES`].
    async fn read_line(&self) -> Result<String, TransportError> {
        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            if stdout.read_line(&mut line).await? == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                return Ok(trimmed.to_string());
            }
            if trimmed.is_empty() {
                continue;
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Protocol(
                    "too many non-JSON lines on stdout".into(),
                ));
            }
            tracing::debug!(server = %self.server, line = %trimmed, "skipping non-JSON stdout line");
        }
    }

    async fn read_response(&self, id: u64) -> Result<JsonRpcResponse, TransportError> {
        loop {
            let line = self.read_line().await?;
            for incoming in decode_incoming(&line) {
                match incoming {
                    Incoming::Response(resp) if resp.id == id => return Ok(resp),
                    Incoming::Response(resp) => {
                        tracing::debug!(
                            server = %self.server,
                            expected_id = id,
                            got_id = resp.id,
                            "discarding response for another request"
                        );
                    }
                    Incoming::ServerMessage { method } => {
                        tracing::debug!(server = %self.server, method = %method, "ignoring server-initiated message");
                    }
                }
            }
        }
    }
}

fn broken_pipe(stream: &str) -> TransportError {
    TransportError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("failed to capture child {stream}"),
    ))
}

fn spawn_stderr_drain(server: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, "stderr: {line}");
        }
    });
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        tracing::debug!(server = %self.server, id, method, "sending MCP request");
        self.write_line(&json).await?;

        tokio::time::timeout(self.request_timeout, self.read_response(id))
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        let json = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        tracing::debug!(server = %self.server, method, "sending MCP notification");
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(server = %self.server, error = %e, "error closing stdin");
            }
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.server, ?status, "MCP server process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %self.server, error = %e, "error waiting for MCP server process");
            }
            Err(_) => {
                tracing::warn!(server = %self.server, "MCP server process did not exit in time, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(server = %self.server, error = %e, "failed to kill MCP server process");
                }
            }
        }
    }

    fn kind(&self) -> &'static str {
        "stdio"
    }
}
