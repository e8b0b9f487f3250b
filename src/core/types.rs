//! Task context document and the records it holds.
//!
//! Field names follow the on-disk `mcp-config.json` layout: the document itself is
//! camelCase, per-client records are snake_case.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// `ErrorEntry::kind` for a failed connect attempt
pub const CONNECTION_FAILED: &str = "connection_failed";

/// `ErrorEntry::kind` for a failed health probe
pub const HEALTH_CHECK_FAILED: &str = "health_check_failed";

/// Current UTC time as an RFC 3339 string with a `Z` suffix
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Closed set of client categories a task can need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientType {
    Database,
    Filesystem,
    #[serde(alias = "github")]
    VcsIntegration,
    Api,
}

impl ClientType {
    pub const ALL: [ClientType; 4] = [
        ClientType::Database,
        ClientType::Filesystem,
        ClientType::VcsIntegration,
        ClientType::Api,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Filesystem => "filesystem",
            Self::VcsIntegration => "vcs-integration",
            Self::Api => "api",
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to start an MCP server process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Command to run the server
    pub command: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides, applied on top of the ambient environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A detected need for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequirement {
    pub name: String,
    #[serde(rename = "type")]
    pub client_type: ClientType,
    #[serde(flatten)]
    pub launch: LaunchSpec,
}

/// Lifecycle status of a client record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Connected,
    Failed,
    Unhealthy,
    Disconnected,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Unhealthy => "unhealthy",
            Self::Disconnected => "disconnected",
        }
    }

    /// `disconnected` and `failed` end a record's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    #[serde(default)]
    pub name: String,
    /// The requirement this record was created from
    pub config: ClientRequirement,
    pub status: ClientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_task_status: Option<String>,
}

impl ClientRecord {
    /// Record for a client whose handshake succeeded just now
    pub fn connected(config: ClientRequirement) -> Self {
        Self {
            name: config.name.clone(),
            config,
            status: ClientStatus::Connected,
            connected_at: Some(now_timestamp()),
            disconnected_at: None,
            last_error: None,
            final_task_status: None,
        }
    }

    /// Record for a client that never connected
    pub fn failed(config: ClientRequirement, error: impl Into<String>) -> Self {
        Self {
            name: config.name.clone(),
            config,
            status: ClientStatus::Failed,
            connected_at: None,
            disconnected_at: None,
            last_error: Some(error.into()),
            final_task_status: None,
        }
    }
}

/// One append-only entry of the context's error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub client: String,
    pub error: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The persisted document holding all lifecycle state for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default)]
    pub mcp_clients: BTreeMap<String, ClientRecord>,
    #[serde(default)]
    pub active_connections: BTreeSet<String>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Task configuration this crate does not model, carried through saves untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskContext {
    /// Empty context for a task
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Default::default()
        }
    }

    /// Parse a context document, filling record names from their map keys
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        let mut context: TaskContext = serde_json::from_str(content)?;
        for (name, record) in context.mcp_clients.iter_mut() {
            if record.name.is_empty() {
                record.name = name.clone();
            }
        }
        Ok(context)
    }

    /// Append to the error log
    pub fn record_error(&mut self, client: &str, error: impl Into<String>, kind: &str) {
        self.errors.push(ErrorEntry {
            timestamp: now_timestamp(),
            client: client.to_string(),
            error: error.into(),
            kind: kind.to_string(),
        });
    }

    /// Rebuild `activeConnections` from the records currently `connected`
    pub fn refresh_active_connections(&mut self) {
        self.active_connections = self
            .mcp_clients
            .iter()
            .filter(|(_, record)| record.status == ClientStatus::Connected)
            .map(|(name, _)| name.clone())
            .collect();
    }

    /// Every active name refers to a known record
    pub fn active_connections_consistent(&self) -> bool {
        self.active_connections
            .iter()
            .all(|name| self.mcp_clients.contains_key(name))
    }
}
