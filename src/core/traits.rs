//! Core traits for the domain layer
//!
//! These traits define the interfaces that lifecycle components depend on,
//! allowing infrastructure to be injected and tests to use mocks.

use super::errors::StoreError;
use super::types::{LaunchSpec, TaskContext};
use crate::mcp::McpToolDef;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// Write-only documents produced next to a task's context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    ExecutionMetrics,
    CleanupSummary,
    DiagnosticReport,
}

impl DocumentKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::ExecutionMetrics => "execution-metrics.json",
            Self::CleanupSummary => "cleanup-summary.json",
            Self::DiagnosticReport => "diagnostic-report.json",
        }
    }
}

/// Storage for task contexts
///
/// The one seam between components: stages running in one process pass the
/// context by value and persist through the same store that separate
/// invocations read from.
pub trait ContextStore: Send + Sync {
    /// Read a context; `Ok(None)` when the task has no document yet
    ///
    /// The returned context always carries `task_id`, so saving it writes back
    /// to the document it came from.
    fn try_load(&self, task_id: &str) -> Result<Option<TaskContext>, StoreError>;

    /// Replace the whole document
    fn save(&self, context: &TaskContext) -> Result<(), StoreError>;

    /// Write one of the derived documents
    fn write_document(
        &self,
        task_id: &str,
        kind: DocumentKind,
        document: &Value,
    ) -> Result<(), StoreError>;

    /// Whether a context document is present, readable or not
    fn exists(&self, task_id: &str) -> bool;

    /// Directory holding the task's documents, if the store is filesystem backed
    fn workspace(&self, task_id: &str) -> Option<PathBuf>;

    /// Lenient read: a missing or malformed document yields an empty context
    fn load(&self, task_id: &str) -> TaskContext {
        match self.try_load(task_id) {
            Ok(Some(context)) => context,
            Ok(None) => {
                tracing::warn!(task_id, "No task context found, starting empty");
                TaskContext::new(task_id)
            }
            Err(e) => {
                tracing::warn!(task_id, "Ignoring unreadable task context: {}", e);
                TaskContext::new(task_id)
            }
        }
    }
}

/// A live connection to one MCP server
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Lightweight capability listing, used as the health probe
    async fn list_tools(&self) -> Result<Vec<McpToolDef>>;

    /// Graceful shutdown of the connection and its server
    async fn disconnect(&self) -> Result<()>;
}

/// Builds transports and performs the connect handshake
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Start the server described by `launch` with exactly `env` and handshake with it
    ///
    /// `client_name` is the identity announced to the server.
    async fn connect(
        &self,
        client_name: &str,
        launch: &LaunchSpec,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn McpSession>>;
}
