//! In-process context store for stages that run together.

use super::pin_task_id;
use crate::core::{ContextStore, DocumentKind, StoreError, TaskContext};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Holds serialized documents in memory
///
/// Contexts are stored as JSON text, so a load goes through the same parsing as
/// the file store and a malformed entry degrades the same way.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    contexts: RwLock<HashMap<String, String>>,
    documents: RwLock<HashMap<(String, DocumentKind), Value>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw document, bypassing serialization
    pub fn insert_raw(&self, task_id: &str, content: &str) {
        self.contexts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.to_string(), content.to_string());
    }

    /// A derived document written for a task
    pub fn document(&self, task_id: &str, kind: DocumentKind) -> Option<Value> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(task_id.to_string(), kind))
            .cloned()
    }
}

impl ContextStore for MemoryContextStore {
    fn try_load(&self, task_id: &str) -> Result<Option<TaskContext>, StoreError> {
        let content = self
            .contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_id)
            .cloned();
        let Some(content) = content else {
            return Ok(None);
        };

        let mut context =
            TaskContext::from_json(&content).map_err(|source| StoreError::Parse {
                path: PathBuf::from(format!("memory://{}", task_id)),
                source,
            })?;
        pin_task_id(&mut context, task_id);
        Ok(Some(context))
    }

    fn save(&self, context: &TaskContext) -> Result<(), StoreError> {
        let content = serde_json::to_string(context)?;
        self.contexts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(context.task_id.clone(), content);
        Ok(())
    }

    fn write_document(
        &self,
        task_id: &str,
        kind: DocumentKind,
        document: &Value,
    ) -> Result<(), StoreError> {
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((task_id.to_string(), kind), document.clone());
        Ok(())
    }

    fn exists(&self, task_id: &str) -> bool {
        self.contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(task_id)
    }

    fn workspace(&self, _task_id: &str) -> Option<PathBuf> {
        None
    }
}
