//! Persistent storage for task contexts
//!
//! Layout (one directory per task id under the configured root):
//!
//! .magic-vibe/ai/mcp-clients/
//! └── {task_id}/
//!     ├── mcp-config.json            # TaskContext, read/written by every stage
//!     ├── execution-metrics.json     # written on cleanup
//!     ├── cleanup-summary.json       # written on cleanup
//!     └── diagnostic-report.json     # written on diagnosis
//!
//! Every write replaces the whole document through a temp file that is renamed
//! over the target, so a concurrent reader sees either the old or the new file.

mod memory;

pub use memory::MemoryContextStore;

use crate::core::{ContextStore, DocumentKind, StoreError, TaskContext};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the task context document
pub const CONTEXT_FILE: &str = "mcp-config.json";

/// Default root for task directories, relative to the working directory
pub const DEFAULT_ROOT: &str = ".magic-vibe/ai/mcp-clients";

/// Filesystem-backed context store
#[derive(Debug, Clone)]
pub struct FileContextStore {
    root: PathBuf,
    /// Explicit context file for one task, overriding the root layout
    context_file: Option<(String, PathBuf)>,
}

impl FileContextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            context_file: None,
        }
    }

    /// Use `path` as the context document of `task_id`
    ///
    /// Derived documents for that task are written next to `path`.
    pub fn with_context_file(mut self, task_id: &str, path: impl Into<PathBuf>) -> Self {
        self.context_file = Some((task_id.to_string(), path.into()));
        self
    }

    /// Root directory holding all task directories
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a task's documents
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        match &self.context_file {
            Some((id, path)) if id == task_id => path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            _ => self.root.join(task_id),
        }
    }

    /// Path of a task's context document
    pub fn context_path(&self, task_id: &str) -> PathBuf {
        match &self.context_file {
            Some((id, path)) if id == task_id => path.clone(),
            _ => self.task_dir(task_id).join(CONTEXT_FILE),
        }
    }

    /// Strict read used when the caller names a required document
    pub fn load_required(&self, task_id: &str) -> Result<TaskContext, StoreError> {
        self.try_load(task_id)?
            .ok_or_else(|| StoreError::NotFound(self.context_path(task_id)))
    }
}

impl ContextStore for FileContextStore {
    fn try_load(&self, task_id: &str) -> Result<Option<TaskContext>, StoreError> {
        let path = self.context_path(task_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let mut context =
            TaskContext::from_json(&content).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?;
        pin_task_id(&mut context, task_id);
        Ok(Some(context))
    }

    fn save(&self, context: &TaskContext) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(context)?;
        write_atomic(&self.context_path(&context.task_id), content.as_bytes())?;
        tracing::debug!(task_id = %context.task_id, "Saved task context");
        Ok(())
    }

    fn write_document(
        &self,
        task_id: &str,
        kind: DocumentKind,
        document: &Value,
    ) -> Result<(), StoreError> {
        let path = self.task_dir(task_id).join(kind.file_name());
        let content = serde_json::to_string_pretty(document)?;
        write_atomic(&path, content.as_bytes())?;
        tracing::info!("{} saved to {}", kind.file_name(), path.display());
        Ok(())
    }

    fn exists(&self, task_id: &str) -> bool {
        self.context_path(task_id).is_file()
    }

    fn workspace(&self, task_id: &str) -> Option<PathBuf> {
        Some(self.task_dir(task_id))
    }
}

/// A document belongs to the task it was loaded for, whatever its `taskId` says
pub(crate) fn pin_task_id(context: &mut TaskContext, task_id: &str) {
    if context.task_id != task_id {
        if !context.task_id.is_empty() {
            tracing::warn!(
                "Context for task {} names task {}, keeping {}",
                task_id,
                context.task_id,
                task_id
            );
        }
        context.task_id = task_id.to_string();
    }
}

/// Write `content` to a sibling temp file and rename it over `path`
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    file.write_all(content)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| StoreError::io(file.path(), e))?;
    file.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClientRecord, ClientRequirement, ClientType, LaunchSpec};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_context(task_id: &str) -> TaskContext {
        let requirement = ClientRequirement {
            name: "filesystem".to_string(),
            client_type: ClientType::Filesystem,
            launch: LaunchSpec {
                command: "python".to_string(),
                args: vec!["mcp-filesystem-server.py".to_string()],
                env: BTreeMap::from([("MAX_FILE_SIZE".to_string(), "10485760".to_string())]),
            },
        };

        let mut context = TaskContext::new(task_id);
        context.feature = "File upload".to_string();
        context.task_title = "Add storage".to_string();
        context.started_at = Some("2024-01-01T00:00:00Z".to_string());
        context
            .mcp_clients
            .insert("filesystem".into(), ClientRecord::connected(requirement));
        context.refresh_active_connections();
        context.record_error("api", "refused", crate::core::CONNECTION_FAILED);
        context
            .extra
            .insert("owner".to_string(), Value::String("alice".to_string()));
        context
    }

    #[test]
    fn test_context_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileContextStore::new(temp.path());

        let context = sample_context("task-1");
        store.save(&context).unwrap();

        assert!(temp.path().join("task-1").join(CONTEXT_FILE).exists());
        let loaded = store.load("task-1");
        assert_eq!(loaded, context);
    }

    #[test]
    fn test_missing_context_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileContextStore::new(temp.path());

        assert!(store.try_load("nope").unwrap().is_none());
        let context = store.load("nope");
        assert_eq!(context.task_id, "nope");
        assert!(context.mcp_clients.is_empty());
    }

    #[test]
    fn test_malformed_context_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileContextStore::new(temp.path());
        let path = store.context_path("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            store.try_load("broken"),
            Err(StoreError::Parse { .. })
        ));
        assert!(store.exists("broken"));
        assert!(!store.exists("absent"));
        let context = store.load("broken");
        assert_eq!(context, TaskContext::new("broken"));
    }

    #[test]
    fn test_explicit_context_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("custom").join("task.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, r#"{"feature": "sql report"}"#).unwrap();

        let store = FileContextStore::new(temp.path().join("root")).with_context_file("t", &file);
        let context = store.load_required("t").unwrap();
        assert_eq!(context.task_id, "t");
        assert_eq!(context.feature, "sql report");
        assert_eq!(store.task_dir("t"), temp.path().join("custom"));

        // Other tasks keep the root layout
        assert_eq!(
            store.context_path("other"),
            temp.path().join("root").join("other").join(CONTEXT_FILE)
        );
    }

    #[test]
    fn test_loaded_context_keeps_the_requested_task_id() {
        let temp = TempDir::new().unwrap();
        let store = FileContextStore::new(temp.path());
        let path = store.context_path("task-42");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"taskId": "42", "feature": "sql"}"#).unwrap();

        let mut context = store.load("task-42");
        assert_eq!(context.task_id, "task-42");

        context.feature = "sql report".to_string();
        store.save(&context).unwrap();

        assert!(!temp.path().join("42").exists());
        assert_eq!(store.load("task-42").feature, "sql report");
    }

    #[test]
    fn test_load_required_reports_missing_document() {
        let temp = TempDir::new().unwrap();
        let store = FileContextStore::new(temp.path());
        assert!(matches!(
            store.load_required("ghost"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_write_document_creates_task_dir() {
        let temp = TempDir::new().unwrap();
        let store = FileContextStore::new(temp.path());

        store
            .write_document(
                "t-9",
                DocumentKind::CleanupSummary,
                &serde_json::json!({"cleanupSuccess": true}),
            )
            .unwrap();

        let content =
            std::fs::read_to_string(temp.path().join("t-9").join("cleanup-summary.json")).unwrap();
        assert!(content.contains("cleanupSuccess"));
        // No temp files are left behind
        let entries = std::fs::read_dir(temp.path().join("t-9")).unwrap().count();
        assert_eq!(entries, 1);
    }
}
