//! End-to-end lifecycle over the in-memory store
//!
//! Runs detection, initialization, health check, cleanup and diagnosis in one
//! process, passing the context between stages through `MemoryContextStore`.

use anyhow::Result;
use async_trait::async_trait;
use mcp_lifecycle::config::ProbesConfig;
use mcp_lifecycle::core::{
    ClientStatus, ContextStore, DocumentKind, LaunchSpec, MapEnv, McpConnector, McpSession,
    TaskContext, CONNECTION_FAILED, HEALTH_CHECK_FAILED,
};
use mcp_lifecycle::diagnostics::ErrorCategory;
use mcp_lifecycle::mcp::McpToolDef;
use mcp_lifecycle::{
    CleanupCollector, ClientLifecycleManager, DiagnosticEngine, MemoryContextStore,
    RequirementDetector,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Connector refusing some commands and failing health probes on others
#[derive(Default)]
struct FakeConnector {
    refuse: HashSet<String>,
    sick: HashSet<String>,
    disconnects: Arc<AtomicUsize>,
}

struct FakeSession {
    sick: bool,
    disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl McpSession for FakeSession {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        if self.sick {
            anyhow::bail!("MCP server closed the connection");
        }
        Ok(Vec::new())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl McpConnector for FakeConnector {
    async fn connect(
        &self,
        _client_name: &str,
        launch: &LaunchSpec,
        _env: &HashMap<String, String>,
    ) -> Result<Box<dyn McpSession>> {
        let target = launch.args.first().cloned().unwrap_or_default();
        if self.refuse.contains(&target) {
            anyhow::bail!("Failed to spawn MCP server: {}", target);
        }
        Ok(Box::new(FakeSession {
            sick: self.sick.contains(&target),
            disconnects: self.disconnects.clone(),
        }))
    }
}

fn env() -> Arc<MapEnv> {
    Arc::new(
        MapEnv::new("/work/project")
            .with_var("PATH", "/usr/bin")
            .with_var("GITHUB_TOKEN", "ghp_secret"),
    )
}

#[tokio::test]
async fn test_full_task_lifecycle() {
    let store = Arc::new(MemoryContextStore::new());
    let mut seed = TaskContext::new("task-42");
    seed.feature = "Import SQL data from the REST API".to_string();
    seed.task_title = "Open a pull request on GitHub".to_string();
    store.save(&seed).unwrap();

    // Detection
    let mut context = store.load("task-42");
    let requirements = RequirementDetector::new(env()).detect(&context);
    let names: Vec<_> = requirements.iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["database", "filesystem", "github", "api"]);

    // Initialization: the filesystem server cannot start, the api server goes sick
    let connector = Arc::new(FakeConnector {
        refuse: HashSet::from(["mcp-filesystem-server.py".to_string()]),
        sick: HashSet::from(["mcp-api-server.py".to_string()]),
        ..Default::default()
    });
    let disconnects = connector.disconnects.clone();
    let mut manager =
        ClientLifecycleManager::new("task-42", store.clone(), connector, env())
            .with_health_timeout(Duration::from_millis(100));

    manager
        .initialize_all(&mut context, requirements)
        .await
        .unwrap();
    assert_eq!(context.mcp_clients.len(), 4);
    assert_eq!(context.active_connections.len(), 3);
    assert_eq!(context.errors.len(), 1);
    assert_eq!(context.errors[0].kind, CONNECTION_FAILED);
    assert_eq!(context.errors[0].client, "filesystem");

    // Health
    let health = manager.health_check(&mut context).await.unwrap();
    assert_eq!(health.healthy.len(), 2);
    assert!(health.unhealthy.contains_key("api"));
    assert_eq!(context.errors.last().unwrap().kind, HEALTH_CHECK_FAILED);

    // Diagnosis sees the persisted statuses
    let engine = DiagnosticEngine::new(store.clone(), env(), "/nonexistent/root".into())
        .with_probes(ProbesConfig {
            loopback: "127.0.0.1:9".to_string(),
            external: "127.0.0.1:9".to_string(),
        })
        .with_probe_timeout(Duration::from_millis(500));
    let report = engine
        .generate_report("task-42", "Failed to spawn MCP server: not found")
        .await
        .unwrap();
    assert_eq!(report.error_category, ErrorCategory::ResourceNotFound);
    assert_eq!(report.affected_clients, vec!["api", "filesystem"]);
    assert_eq!(
        report.system_diagnostics.environment_variables["GITHUB_TOKEN"],
        "Set"
    );
    assert!(store
        .document("task-42", DocumentKind::DiagnosticReport)
        .is_some());

    // Teardown
    let disconnected = manager.cleanup().await;
    assert_eq!(disconnected.disconnected.len(), 3);
    assert_eq!(disconnects.load(Ordering::SeqCst), 3);
    assert!(manager.live_clients().is_empty());

    let collector = CleanupCollector::new(store.clone());
    assert!(collector.perform_cleanup("task-42", "completed"));

    let finished = store.load("task-42");
    assert!(finished.active_connections.is_empty());
    assert!(finished.completed_at.is_some());
    assert!(finished
        .mcp_clients
        .values()
        .all(|record| record.status.is_terminal()));
    assert_eq!(
        finished.mcp_clients["api"].status,
        ClientStatus::Disconnected
    );
    assert_eq!(finished.errors.len(), 2);

    let metrics = store
        .document("task-42", DocumentKind::ExecutionMetrics)
        .unwrap();
    assert_eq!(metrics["totalClients"], 4);
    assert_eq!(metrics["successfulConnections"], 3);
    assert_eq!(metrics["failedConnections"], 1);

    let summary = store
        .document("task-42", DocumentKind::CleanupSummary)
        .unwrap();
    assert_eq!(summary["mcpClientsDisconnected"], 4);
    assert_eq!(summary["cleanupSuccess"], true);

    // Second cleanup changes nothing
    assert!(collector.perform_cleanup("task-42", "completed"));
    assert_eq!(store.load("task-42"), finished);
}

#[tokio::test]
async fn test_malformed_context_degrades_to_empty() {
    let store = Arc::new(MemoryContextStore::new());
    store.insert_raw("broken", "{ definitely not json");

    let context = store.load("broken");
    assert_eq!(context, TaskContext::new("broken"));
    assert!(RequirementDetector::new(env()).detect(&context).is_empty());

    let collector = CleanupCollector::new(store.clone());
    assert!(collector.perform_cleanup("broken", "failed"));
}
