//! Cleanup and execution metrics
//!
//! Runs when a task completes or fails: finalizes the client records in the
//! task context, writes `execution-metrics.json` and `cleanup-summary.json`, and
//! removes transient artifacts from the task directory.

mod metrics;

pub use metrics::{calculate_duration, ClientMetrics, ExecutionMetrics};

use crate::core::{
    now_timestamp, ClientStatus, ContextStore, DocumentKind, StoreError, TaskContext,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Transient files removed from the task directory
pub const TEMP_PATTERNS: &[&str] = &["*.tmp", "*.log", "*.pid", "temp_*"];

/// Contents of `cleanup-summary.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub task_id: String,
    pub cleanup_timestamp: String,
    pub final_status: String,
    /// Every client record of the task, finalized now or earlier
    pub mcp_clients_disconnected: usize,
    pub errors_encountered: usize,
    /// False only when the summary itself could not be written
    pub cleanup_success: bool,
}

/// Everything one cleanup run produced
#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub disconnected: Vec<String>,
    pub metrics: ExecutionMetrics,
    pub metrics_written: bool,
    pub summary: CleanupSummary,
    pub removed_files: Vec<PathBuf>,
}

impl CleanupReport {
    /// Every derived document reached the store
    pub fn success(&self) -> bool {
        self.metrics_written && self.summary.cleanup_success
    }
}

/// Finalizes a task's client lifecycle
pub struct CleanupCollector {
    store: Arc<dyn ContextStore>,
}

impl CleanupCollector {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    /// Full cleanup sequence, reduced to a success flag
    pub fn perform_cleanup(&self, task_id: &str, final_status: &str) -> bool {
        tracing::info!("Starting MCP client cleanup for task {}", task_id);

        match self.run(task_id, final_status) {
            Ok(report) if report.success() => {
                tracing::info!(
                    "MCP client cleanup completed successfully for task {}",
                    task_id
                );
                true
            }
            Ok(_) => {
                tracing::error!(
                    "MCP client cleanup for task {} could not write all documents",
                    task_id
                );
                false
            }
            Err(e) => {
                tracing::error!("MCP client cleanup failed for task {}: {}", task_id, e);
                false
            }
        }
    }

    /// Full cleanup sequence; errors only when the task context cannot be saved
    pub fn run(&self, task_id: &str, final_status: &str) -> Result<CleanupReport, StoreError> {
        let mut context = self.store.load(task_id);
        context.task_id = task_id.to_string();

        let disconnected = self.disconnect_clients(&mut context, final_status)?;

        let metrics = ExecutionMetrics::collect(&context, final_status);
        let metrics_written = match serde_json::to_value(&metrics)
            .map_err(StoreError::from)
            .and_then(|doc| {
                self.store
                    .write_document(task_id, DocumentKind::ExecutionMetrics, &doc)
            }) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save execution metrics: {}", e);
                false
            }
        };

        let summary = self.write_summary(task_id, &context, final_status);
        let removed_files = self.remove_temporary_files(task_id);

        Ok(CleanupReport {
            disconnected,
            metrics,
            metrics_written,
            summary,
            removed_files,
        })
    }

    /// Mark every active client `disconnected` and persist the delta
    ///
    /// A context with no active connections is left untouched.
    pub fn disconnect_clients(
        &self,
        context: &mut TaskContext,
        final_status: &str,
    ) -> Result<Vec<String>, StoreError> {
        if context.active_connections.is_empty() {
            tracing::info!(
                "No active MCP connections found for task {}",
                context.task_id
            );
            return Ok(Vec::new());
        }

        tracing::info!(
            "Disconnecting {} MCP clients for task {}",
            context.active_connections.len(),
            context.task_id
        );

        let now = now_timestamp();
        let mut disconnected = Vec::new();
        for name in std::mem::take(&mut context.active_connections) {
            if let Some(record) = context.mcp_clients.get_mut(&name) {
                record.status = ClientStatus::Disconnected;
                record.disconnected_at = Some(now.clone());
                record.final_task_status = Some(final_status.to_string());
                tracing::info!("Marked MCP client {} as disconnected", name);
                disconnected.push(name);
            }
        }

        context.disconnected_at = Some(now.clone());
        if context.completed_at.is_none() {
            context.completed_at = Some(now);
        }
        self.store.save(context)?;
        Ok(disconnected)
    }

    fn write_summary(
        &self,
        task_id: &str,
        context: &TaskContext,
        final_status: &str,
    ) -> CleanupSummary {
        let mut summary = CleanupSummary {
            task_id: task_id.to_string(),
            cleanup_timestamp: now_timestamp(),
            final_status: final_status.to_string(),
            mcp_clients_disconnected: context.mcp_clients.len(),
            errors_encountered: context.errors.len(),
            cleanup_success: true,
        };

        let written = serde_json::to_value(&summary)
            .map_err(StoreError::from)
            .and_then(|doc| {
                self.store
                    .write_document(task_id, DocumentKind::CleanupSummary, &doc)
            });
        if let Err(e) = written {
            tracing::error!("Failed to save cleanup summary: {}", e);
            summary.cleanup_success = false;
        }
        summary
    }

    /// Remove transient files, tolerating individual failures
    pub fn remove_temporary_files(&self, task_id: &str) -> Vec<PathBuf> {
        let Some(dir) = self.store.workspace(task_id) else {
            return Vec::new();
        };
        remove_matching(&dir, TEMP_PATTERNS)
    }
}

fn remove_matching(dir: &Path, patterns: &[&str]) -> Vec<PathBuf> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let mut removed = Vec::new();

    for pattern in patterns {
        let entries = match glob::glob(&format!("{}/{}", escaped, pattern)) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Invalid temp file pattern {}: {}", pattern, e);
                continue;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Failed to read temp file entry: {}", e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("Removed temporary file: {}", path.display());
                    removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to remove temporary file {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClientRecord, ClientRequirement, ClientType, LaunchSpec, CONNECTION_FAILED};
    use crate::storage::{FileContextStore, MemoryContextStore, CONTEXT_FILE};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn requirement(name: &str) -> ClientRequirement {
        ClientRequirement {
            name: name.to_string(),
            client_type: ClientType::Filesystem,
            launch: LaunchSpec {
                command: "python".to_string(),
                args: Vec::new(),
                env: BTreeMap::new(),
            },
        }
    }

    fn initialized_context(task_id: &str) -> TaskContext {
        let mut context = TaskContext::new(task_id);
        context.started_at = Some("2024-01-01T00:00:00Z".to_string());
        for name in ["a", "b"] {
            context
                .mcp_clients
                .insert(name.into(), ClientRecord::connected(requirement(name)));
        }
        context
            .mcp_clients
            .insert("c".into(), ClientRecord::failed(requirement("c"), "refused"));
        context.record_error("c", "refused", CONNECTION_FAILED);
        context.refresh_active_connections();
        context
    }

    #[test]
    fn test_cleanup_finalizes_records_and_writes_documents() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FileContextStore::new(temp.path()));
        store.save(&initialized_context("t-1")).unwrap();

        let task_dir = temp.path().join("t-1");
        std::fs::write(task_dir.join("server.log"), "log").unwrap();
        std::fs::write(task_dir.join("server.pid"), "42").unwrap();
        std::fs::write(task_dir.join("temp_scratch"), "x").unwrap();
        std::fs::write(task_dir.join("notes.md"), "keep").unwrap();

        let collector = CleanupCollector::new(store.clone());
        let report = collector.run("t-1", "completed").unwrap();

        assert!(report.success());
        assert_eq!(report.disconnected, vec!["a", "b"]);
        assert_eq!(report.summary.mcp_clients_disconnected, 3);
        assert_eq!(report.summary.errors_encountered, 1);
        assert_eq!(report.removed_files.len(), 3);
        assert_eq!(report.metrics.total_clients, 3);
        assert_eq!(report.metrics.successful_connections, 2);
        assert_eq!(report.metrics.failed_connections, 1);

        let context = store.load("t-1");
        assert!(context.active_connections.is_empty());
        assert!(context.disconnected_at.is_some());
        for name in ["a", "b"] {
            let record = &context.mcp_clients[name];
            assert_eq!(record.status, ClientStatus::Disconnected);
            assert_eq!(record.final_task_status.as_deref(), Some("completed"));
        }
        assert!(context.mcp_clients.values().all(|r| r.status.is_terminal()));

        assert!(task_dir.join(CONTEXT_FILE).exists());
        assert!(task_dir.join("execution-metrics.json").exists());
        assert!(task_dir.join("cleanup-summary.json").exists());
        assert!(task_dir.join("notes.md").exists());
        assert!(!task_dir.join("server.log").exists());
    }

    #[test]
    fn test_second_cleanup_leaves_context_unchanged() {
        let store = Arc::new(MemoryContextStore::new());
        store.save(&initialized_context("t-2")).unwrap();
        let collector = CleanupCollector::new(store.clone());

        assert!(collector.perform_cleanup("t-2", "failed"));
        let after_first = store.load("t-2");

        assert!(collector.perform_cleanup("t-2", "completed"));
        let after_second = store.load("t-2");

        assert_eq!(after_first, after_second);
        assert_eq!(after_second.errors.len(), 1);

        // The summary still counts every record of the task
        let summary = store
            .document("t-2", DocumentKind::CleanupSummary)
            .unwrap();
        assert_eq!(summary["mcpClientsDisconnected"], 3);
        assert_eq!(summary["finalStatus"], "completed");
    }

    #[test]
    fn test_cleanup_writes_back_to_the_requested_task() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FileContextStore::new(temp.path()));
        let task_dir = temp.path().join("task-42");
        std::fs::create_dir_all(&task_dir).unwrap();

        let mut context = initialized_context("42");
        context.task_id = "42".to_string();
        std::fs::write(
            task_dir.join(CONTEXT_FILE),
            serde_json::to_string_pretty(&context).unwrap(),
        )
        .unwrap();

        let collector = CleanupCollector::new(store.clone());
        let report = collector.run("task-42", "completed").unwrap();
        assert!(report.success());
        assert_eq!(report.summary.task_id, "task-42");

        assert!(!temp.path().join("42").exists());
        assert!(task_dir.join("cleanup-summary.json").exists());
        assert!(task_dir.join("execution-metrics.json").exists());

        let finished = store.load("task-42");
        assert!(finished.active_connections.is_empty());
        assert_eq!(finished.mcp_clients["a"].status, ClientStatus::Disconnected);
    }

    #[test]
    fn test_cleanup_of_unknown_task_succeeds_with_empty_summary() {
        let store = Arc::new(MemoryContextStore::new());
        let collector = CleanupCollector::new(store.clone());

        let report = collector.run("ghost", "completed").unwrap();
        assert!(report.success());
        assert!(report.disconnected.is_empty());
        assert_eq!(report.summary.mcp_clients_disconnected, 0);

        let summary = store
            .document("ghost", DocumentKind::CleanupSummary)
            .unwrap();
        assert_eq!(summary["cleanupSuccess"], true);
        assert_eq!(summary["taskId"], "ghost");
    }

    /// Store whose derived documents can never be written
    struct ReadOnlyDocuments(MemoryContextStore);

    impl ContextStore for ReadOnlyDocuments {
        fn try_load(&self, task_id: &str) -> Result<Option<TaskContext>, StoreError> {
            self.0.try_load(task_id)
        }

        fn save(&self, context: &TaskContext) -> Result<(), StoreError> {
            self.0.save(context)
        }

        fn write_document(
            &self,
            _task_id: &str,
            kind: DocumentKind,
            _document: &serde_json::Value,
        ) -> Result<(), StoreError> {
            Err(StoreError::io(
                kind.file_name(),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }

        fn exists(&self, task_id: &str) -> bool {
            self.0.exists(task_id)
        }

        fn workspace(&self, _task_id: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn test_unwritable_summary_clears_cleanup_success() {
        let inner = MemoryContextStore::new();
        inner.save(&initialized_context("t-3")).unwrap();
        let store = Arc::new(ReadOnlyDocuments(inner));
        let collector = CleanupCollector::new(store.clone());

        let report = collector.run("t-3", "completed").unwrap();
        assert!(!report.summary.cleanup_success);
        assert!(!report.metrics_written);
        assert!(!collector.perform_cleanup("t-3", "completed"));

        // Client records were still finalized
        assert!(store.load("t-3").active_connections.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_context_is_overall_failure() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = Arc::new(FileContextStore::new(temp.path()));
        store.save(&initialized_context("t-4")).unwrap();

        let task_dir = temp.path().join("t-4");
        std::fs::set_permissions(&task_dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Root ignores directory permissions
        let writable = tempfile::NamedTempFile::new_in(&task_dir).is_ok();

        let collector = CleanupCollector::new(store);
        let success = collector.perform_cleanup("t-4", "completed");

        std::fs::set_permissions(&task_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        if !writable {
            assert!(!success);
        }
    }
}
