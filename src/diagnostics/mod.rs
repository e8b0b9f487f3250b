//! Error diagnostics for MCP client failures
//!
//! Classifies a free-text error, names the clients likely involved, recommends
//! remediation and snapshots the environment into `diagnostic-report.json`.

mod analyzer;
mod system;

pub use analyzer::{affected_clients, ErrorCategory};
pub use system::{
    FileSystemStatus, NetworkConnectivity, RuntimeInfo, SystemDiagnostics, UNABLE_TO_CHECK,
};

use crate::config::ProbesConfig;
use crate::core::{now_timestamp, ContextStore, DocumentKind, EnvSource, StoreError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on each network probe
const DEFAULT_PROBE_SECS: u64 = 5;

/// Contents of `diagnostic-report.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub task_id: String,
    pub original_error: String,
    pub analysis_timestamp: String,
    pub error_category: ErrorCategory,
    pub root_cause: String,
    pub affected_clients: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub system_diagnostics: SystemDiagnostics,
}

/// Produces diagnostic reports from the persisted task context
pub struct DiagnosticEngine {
    store: Arc<dyn ContextStore>,
    env: Arc<dyn EnvSource>,
    root: PathBuf,
    probes: ProbesConfig,
    probe_timeout: Duration,
}

impl DiagnosticEngine {
    /// `root` is the directory holding per-task subdirectories
    pub fn new(store: Arc<dyn ContextStore>, env: Arc<dyn EnvSource>, root: PathBuf) -> Self {
        Self {
            store,
            env,
            root,
            probes: ProbesConfig::default(),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_SECS),
        }
    }

    pub fn with_probes(mut self, probes: ProbesConfig) -> Self {
        self.probes = probes;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Analyze `error` against the current context of `task_id`
    pub async fn diagnose(&self, task_id: &str, error: &str) -> DiagnosticReport {
        let task_config_exists = self.store.exists(task_id);
        let context = self.store.load(task_id);
        let category = ErrorCategory::classify(error);

        let system_diagnostics = SystemDiagnostics {
            runtime: system::runtime_info(self.env.as_ref()),
            environment_variables: system::environment_variables(self.env.as_ref()),
            file_system_status: system::file_system_status(&self.root, task_config_exists),
            network_connectivity: system::network_connectivity(&self.probes, self.probe_timeout)
                .await,
            mcp_server_status: system::mcp_server_status(&context),
        };

        DiagnosticReport {
            task_id: task_id.to_string(),
            original_error: error.to_string(),
            analysis_timestamp: now_timestamp(),
            error_category: category,
            root_cause: category.root_cause().to_string(),
            affected_clients: affected_clients(&context),
            recommended_actions: category
                .recommended_actions()
                .iter()
                .map(|a| a.to_string())
                .collect(),
            system_diagnostics,
        }
    }

    /// Diagnose, persist the report and log its key findings
    pub async fn generate_report(
        &self,
        task_id: &str,
        error: &str,
    ) -> Result<DiagnosticReport, StoreError> {
        tracing::info!("Generating diagnostic report for task {}", task_id);

        let report = self.diagnose(task_id, error).await;
        let written = serde_json::to_value(&report)
            .map_err(StoreError::from)
            .and_then(|doc| {
                self.store
                    .write_document(task_id, DocumentKind::DiagnosticReport, &doc)
            });
        if let Err(e) = written {
            tracing::error!("Failed to generate diagnostic report: {}", e);
            return Err(e);
        }

        tracing::info!("Error category: {}", report.error_category);
        tracing::info!("Root cause: {}", report.root_cause);
        tracing::info!("Affected clients: {:?}", report.affected_clients);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClientRecord, ClientRequirement, ClientType, LaunchSpec, MapEnv, TaskContext};
    use crate::storage::MemoryContextStore;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Probes aimed at a discard address so tests stay offline
    fn offline_probes() -> ProbesConfig {
        ProbesConfig {
            loopback: "127.0.0.1:9".to_string(),
            external: "127.0.0.1:9".to_string(),
        }
    }

    fn engine(store: Arc<MemoryContextStore>, root: PathBuf) -> DiagnosticEngine {
        DiagnosticEngine::new(store, Arc::new(MapEnv::new("/work")), root)
            .with_probes(offline_probes())
            .with_probe_timeout(Duration::from_millis(500))
    }

    fn seed(store: &MemoryContextStore, task_id: &str) {
        let mut context = TaskContext::new(task_id);
        for name in ["a", "b"] {
            let requirement = ClientRequirement {
                name: name.to_string(),
                client_type: ClientType::Database,
                launch: LaunchSpec {
                    command: "python".to_string(),
                    args: Vec::new(),
                    env: BTreeMap::new(),
                },
            };
            context
                .mcp_clients
                .insert(name.to_string(), ClientRecord::connected(requirement));
        }
        context.refresh_active_connections();
        store.save(&context).unwrap();
    }

    #[tokio::test]
    async fn test_report_for_connected_clients() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryContextStore::new());
        seed(&store, "t-1");

        let report = engine(store.clone(), temp.path().to_path_buf())
            .generate_report("t-1", "Connection timeout to server")
            .await
            .unwrap();

        assert_eq!(report.error_category, ErrorCategory::ConnectionError);
        assert_eq!(report.affected_clients, vec!["a", "b"]);
        assert_eq!(report.recommended_actions.len(), 5);
        assert!(report.system_diagnostics.file_system_status.task_config_exists);
        assert_eq!(
            report.system_diagnostics.mcp_server_status["a"],
            "Command: python, Status: connected"
        );

        let doc = store
            .document("t-1", DocumentKind::DiagnosticReport)
            .unwrap();
        assert_eq!(doc["errorCategory"], "connection_error");
        assert_eq!(doc["originalError"], "Connection timeout to server");
        assert_eq!(
            doc["systemDiagnostics"]["networkConnectivity"]["dnsResolution"],
            UNABLE_TO_CHECK
        );
    }

    #[tokio::test]
    async fn test_unknown_task_yields_empty_diagnosis() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryContextStore::new());

        let report = engine(store, temp.path().join("absent"))
            .diagnose("ghost", "weird")
            .await;

        assert_eq!(report.error_category, ErrorCategory::UnknownError);
        assert!(report.affected_clients.is_empty());
        assert_eq!(report.recommended_actions, vec!["Manual investigation required"]);
        assert!(!report.system_diagnostics.file_system_status.task_config_exists);
        assert!(!report.system_diagnostics.file_system_status.mcp_clients_dir);
    }

    #[tokio::test]
    async fn test_unreadable_context_still_counts_as_present() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryContextStore::new());
        store.insert_raw("t-bad", "{ not json");

        let report = engine(store, temp.path().to_path_buf())
            .diagnose("t-bad", "Permission denied")
            .await;

        assert_eq!(report.error_category, ErrorCategory::PermissionError);
        assert!(report.system_diagnostics.file_system_status.task_config_exists);
        assert!(report.affected_clients.is_empty());
        assert!(report.system_diagnostics.mcp_server_status.is_empty());
    }
}
