//! CLI transport: one runner per `mcpctl` subcommand
//!
//! Each runner wires the file-backed store, the process environment and the
//! stdio connector together, then returns an error for any top-level failure.

use crate::cleanup::CleanupCollector;
use crate::config::Config;
use crate::core::{now_timestamp, EnvSource, ProcessEnv};
use crate::detection::RequirementDetector;
use crate::diagnostics::DiagnosticEngine;
use crate::lifecycle::ClientLifecycleManager;
use crate::mcp::StdioConnector;
use crate::storage::FileContextStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Detect, connect and optionally health-check the clients of a task
///
/// The context at `config_path` must exist and parse; its updated form is
/// written back to the same file.
pub async fn run_init(
    config: &Config,
    task_id: &str,
    config_path: &Path,
    health_check: bool,
) -> Result<()> {
    let store = Arc::new(
        FileContextStore::new(&config.storage.root).with_context_file(task_id, config_path),
    );
    let mut context = store
        .load_required(task_id)
        .with_context(|| format!("Cannot initialize MCP clients for task {}", task_id))?;
    if context.started_at.is_none() {
        context.started_at = Some(now_timestamp());
    }

    let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
    let requirements = RequirementDetector::new(env.clone()).detect(&context);

    let connector = StdioConnector::new()
        .with_working_dir(env.current_dir())
        .with_connect_timeout(config.timeouts.connect())
        .with_disconnect_grace(config.timeouts.disconnect());
    let mut manager =
        ClientLifecycleManager::new(task_id, store, Arc::new(connector), env)
            .with_health_timeout(config.timeouts.health_check());

    manager
        .initialize_all(&mut context, requirements)
        .await
        .context("Failed to persist MCP client state")?;

    if health_check {
        let report = manager
            .health_check(&mut context)
            .await
            .context("Failed to persist health check results")?;
        tracing::info!(
            "Health check: {} healthy, {} unhealthy",
            report.healthy.len(),
            report.unhealthy.len()
        );
    }

    // Servers do not outlive this process; the document keeps their records
    // for the cleanup run.
    manager.cleanup().await;
    Ok(())
}

/// Finalize a task's clients and write metrics and summary documents
pub fn run_cleanup(config: &Config, task_id: &str, final_status: &str) -> Result<()> {
    let store = Arc::new(FileContextStore::new(&config.storage.root));
    let collector = CleanupCollector::new(store);

    if !collector.perform_cleanup(task_id, final_status) {
        anyhow::bail!("MCP client cleanup failed for task {}", task_id);
    }
    Ok(())
}

/// Write a diagnostic report for `error` and print it to stdout
pub async fn run_diagnose(config: &Config, task_id: &str, error: &str) -> Result<()> {
    let store = Arc::new(FileContextStore::new(&config.storage.root));
    let engine = DiagnosticEngine::new(store, Arc::new(ProcessEnv), config.storage.root.clone())
        .with_probes(config.probes.clone())
        .with_probe_timeout(config.timeouts.probe());

    let report = engine
        .generate_report(task_id, error)
        .await
        .with_context(|| format!("Diagnosis failed for task {}", task_id))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
