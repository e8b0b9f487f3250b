//! STDIO transport for MCP servers.
//!
//! Spawns the server as a child process and exchanges newline-delimited
//! JSON-RPC 2.0 messages over its stdin/stdout.

use crate::core::{LaunchSpec, LifecycleError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC notification (no id, no response)
#[derive(Debug, Clone, Serialize)]
struct JsonRpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// Any message read from the server
#[derive(Debug, Clone, Deserialize)]
struct JsonRpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// STDIO transport (async)
pub struct StdioTransport {
    child: Mutex<Child>,
    next_id: AtomicU64,
    /// Taken on shutdown so the server sees EOF
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn the server described by `launch`
    ///
    /// The child sees exactly `env`; callers merge the ambient environment in.
    pub fn spawn(
        launch: &LaunchSpec,
        env: &HashMap<String, String>,
        working_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Pass stderr through for debugging
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server: {}", launch.command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get stdout"))?;

        Ok(Self {
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }

    /// Send a request and wait for its response
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let line = serde_json::to_string(&request)?;
        tracing::debug!("MCP request: {}", line);
        self.write_line(&line).await?;

        let message = self.read_response(id).await?;
        if let Some(error) = message.error {
            return Err(LifecycleError::Rpc {
                code: error.code,
                message: error.message,
            }
            .into());
        }

        message
            .result
            .ok_or_else(|| anyhow::anyhow!("MCP response missing result"))
    }

    /// Send a notification (no response expected)
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0",
            method,
            params,
        };
        let line = serde_json::to_string(&notification)?;
        tracing::debug!("MCP notification: {}", line);
        self.write_line(&line).await
    }

    /// Close stdin and give the server `grace` to exit, then kill it
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        drop(self.stdin.lock().await.take());

        let mut child = self.child.lock().await;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for MCP server")?;
                tracing::debug!("MCP server exited with {}", status);
                Ok(())
            }
            Err(_) => {
                tracing::debug!("MCP server ignored EOF, killing it");
                child.kill().await.context("Failed to kill MCP server")
            }
        }
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(LifecycleError::TransportClosed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response for `id` arrives, skipping server notifications
    async fn read_response(&self, id: u64) -> Result<JsonRpcMessage> {
        let mut stdout = self.stdout.lock().await;
        loop {
            let mut line = String::new();
            if stdout.read_line(&mut line).await? == 0 {
                return Err(LifecycleError::TransportClosed.into());
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            tracing::debug!("MCP response: {}", trimmed);

            let message: JsonRpcMessage = match serde_json::from_str(trimmed) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!("Skipping non JSON-RPC output: {}", e);
                    continue;
                }
            };
            if message.method.is_some() {
                continue;
            }
            if message.id.as_ref().and_then(Value::as_u64) == Some(id) {
                return Ok(message);
            }
        }
    }
}
