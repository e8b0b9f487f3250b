//! MCP client for connecting to external MCP servers (async).

use super::transport::StdioTransport;
use super::types::{InitializeResult, McpToolDef, ServerCapabilities, PROTOCOL_VERSION};
use crate::core::{LaunchSpec, LifecycleError, McpConnector, McpSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default grace period before a server that ignores EOF is killed
const DEFAULT_DISCONNECT_SECS: u64 = 5;

/// Default bound on spawn + handshake
const DEFAULT_CONNECT_SECS: u64 = 30;

/// A connected MCP client
pub struct McpClient {
    name: String,
    transport: StdioTransport,
    capabilities: ServerCapabilities,
    disconnect_grace: Duration,
    connected: AtomicBool,
}

impl McpClient {
    /// Perform the `initialize` handshake over an already spawned transport
    pub async fn connect(name: &str, transport: StdioTransport) -> Result<Self> {
        let result = transport
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "tools": {},
                        "resources": {}
                    },
                    "clientInfo": {
                        "name": name,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await
            .context("MCP initialize handshake failed")?;

        let init: InitializeResult = match serde_json::from_value(result) {
            Ok(init) => init,
            Err(e) => {
                tracing::warn!("Ignoring malformed initialize result from {}: {}", name, e);
                InitializeResult::default()
            }
        };
        if let Some(info) = &init.server_info {
            tracing::debug!(
                "MCP server {} {} speaks {}",
                info.name,
                info.version.as_deref().unwrap_or("?"),
                init.protocol_version.as_deref().unwrap_or("?")
            );
        }

        transport.notify("notifications/initialized", None).await?;

        Ok(Self {
            name: name.to_string(),
            transport,
            capabilities: init.capabilities,
            disconnect_grace: Duration::from_secs(DEFAULT_DISCONNECT_SECS),
            connected: AtomicBool::new(true),
        })
    }

    /// Set how long a server may take to exit after EOF
    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }
}

#[async_trait]
impl McpSession for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LifecycleError::NotConnected(self.name.clone()).into());
        }
        let result = self.transport.request("tools/list", None).await?;
        let tools = result
            .get("tools")
            .cloned()
            .map(serde_json::from_value::<Vec<McpToolDef>>)
            .transpose()
            .context("Failed to parse tools/list result")?
            .unwrap_or_default();
        Ok(tools)
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.shutdown(self.disconnect_grace).await
    }
}

/// Spawns stdio MCP servers and connects to them
#[derive(Debug, Clone)]
pub struct StdioConnector {
    working_dir: Option<PathBuf>,
    connect_timeout: Duration,
    disconnect_grace: Duration,
}

impl Default for StdioConnector {
    fn default() -> Self {
        Self {
            working_dir: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_SECS),
            disconnect_grace: Duration::from_secs(DEFAULT_DISCONNECT_SECS),
        }
    }
}

impl StdioConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working directory for spawned servers
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Bound on spawn + handshake
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }
}

#[async_trait]
impl McpConnector for StdioConnector {
    async fn connect(
        &self,
        client_name: &str,
        launch: &LaunchSpec,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn McpSession>> {
        let handshake = async {
            let transport = StdioTransport::spawn(launch, env, self.working_dir.as_deref())?;
            McpClient::connect(client_name, transport).await
        };

        let client = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| LifecycleError::Timeout {
                operation: "MCP connect",
                secs: self.connect_timeout.as_secs(),
            })??;

        Ok(Box::new(client.with_disconnect_grace(self.disconnect_grace)))
    }
}
