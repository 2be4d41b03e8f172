//! Stdio transport: one tool-server subprocess per session.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use toolrelay_core::error::ToolServerError;
use toolrelay_core::tool::{ToolServer, ToolSession};
use tracing::{debug, error, info, trace, warn};

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, match_response};
use crate::session::{McpSession, Transport};

/// How long a server gets to exit after stdin closes before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Connector that spawns the configured command for each session.
pub struct StdioToolServer {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl StdioToolServer {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
            cwd: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> Result<StdioTransport, ToolServerError> {
        info!(command = %self.command, args = ?self.args, "Starting MCP server process");

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(command = %self.command, error = %e, "Failed to spawn MCP server process");
            ToolServerError::Spawn(format!("{}: {e}", self.command))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolServerError::Spawn("Failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolServerError::Spawn("Failed to capture stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[MCP server stderr] {}", line);
                }
            });
        }

        Ok(StdioTransport {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

#[async_trait]
impl ToolServer for StdioToolServer {
    fn name(&self) -> &str {
        &self.command
    }

    async fn connect(&self) -> Result<Box<dyn ToolSession>, ToolServerError> {
        let transport = self.spawn()?;
        let session = McpSession::initialize(transport, &self.command, self.timeout).await?;
        Ok(Box::new(session))
    }
}

/// Newline-delimited JSON-RPC over a child's stdin/stdout.
pub struct StdioTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioTransport {
    async fn write_line(&mut self, message: String) -> Result<(), ToolServerError> {
        let stdin = self.stdin.as_mut().ok_or(ToolServerError::Closed)?;
        let line = format!("{message}\n");
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolServerError::Connection(format!("Failed to write: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ToolServerError::Connection(format!("Failed to flush: {e}")))?;
        trace!("Sent: {}", message);
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(
        &mut self,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, ToolServerError> {
        let message =
            serde_json::to_string(request).map_err(|e| ToolServerError::Protocol(e.to_string()))?;
        self.write_line(message).await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| ToolServerError::Connection(format!("Failed to read: {e}")))?
                .ok_or_else(|| {
                    warn!("MCP server stdout closed (EOF)");
                    ToolServerError::Connection("tool server exited".into())
                })?;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            trace!("Received: {}", line);

            if let Some(response) = match_response(line, request.id) {
                return Ok(response);
            }
            debug!(line, "Skipping unrelated MCP server output");
        }
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), ToolServerError> {
        let message = serde_json::to_string(notification)
            .map_err(|e| ToolServerError::Protocol(e.to_string()))?;
        self.write_line(message).await
    }

    async fn shutdown(&mut self) -> Result<(), ToolServerError> {
        // Closing stdin is the stdio transport's shutdown signal.
        self.stdin = None;

        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "MCP server process exited");
                Ok(())
            }
            _ => {
                warn!("MCP server process did not exit gracefully, killing");
                self.child
                    .kill()
                    .await
                    .map_err(|e| ToolServerError::Connection(format!("Failed to kill: {e}")))
            }
        }
    }
}
