//! Client lifecycle management
//!
//! Turns requirements into live MCP connections and tracks them until teardown.
//!
//! Per-client state machine:
//!
//! ```text
//! pending -> connecting -> connected | failed
//! connected -> unhealthy | disconnected
//! ```
//!
//! Connection attempts fan out concurrently and rejoin only after every attempt
//! has resolved; a failing client never cancels or aborts its siblings.

use crate::core::{
    ClientRecord, ClientRequirement, ClientStatus, ContextStore, EnvSource, McpConnector,
    McpSession, StoreError, TaskContext, CONNECTION_FAILED, HEALTH_CHECK_FAILED,
};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a health probe
const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;

/// Result of one connection attempt
pub enum ConnectOutcome {
    Connected(Box<dyn McpSession>),
    Failed(String),
}

/// Result of a health pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Client name -> number of tools listed
    pub healthy: BTreeMap<String, usize>,
    /// Client name -> failure text
    pub unhealthy: BTreeMap<String, String>,
}

/// Result of a disconnect pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectReport {
    pub disconnected: Vec<String>,
    /// Client name -> failure text
    pub failed: BTreeMap<String, String>,
}

/// Owns the live handles of one task's clients
pub struct ClientLifecycleManager {
    task_id: String,
    store: Arc<dyn ContextStore>,
    connector: Arc<dyn McpConnector>,
    env: Arc<dyn EnvSource>,
    health_timeout: Duration,
    clients: HashMap<String, Box<dyn McpSession>>,
}

impl ClientLifecycleManager {
    pub fn new(
        task_id: impl Into<String>,
        store: Arc<dyn ContextStore>,
        connector: Arc<dyn McpConnector>,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            store,
            connector,
            env,
            health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
            clients: HashMap::new(),
        }
    }

    /// Set the bounded wait for each health probe
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Names of clients holding a live handle
    pub fn live_clients(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ambient environment with the requirement's overrides on top
    pub fn merged_env(&self, requirement: &ClientRequirement) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = self.env.vars().into_iter().collect();
        env.extend(
            requirement
                .launch
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }

    /// Connect every requirement concurrently and persist the outcome in one save
    ///
    /// A single client's failure is recorded, never returned; the only error is a
    /// failure to persist the context.
    pub async fn initialize_all(
        &mut self,
        context: &mut TaskContext,
        requirements: Vec<ClientRequirement>,
    ) -> Result<(), StoreError> {
        if requirements.is_empty() {
            tracing::info!("No MCP clients required for task {}", self.task_id);
        } else {
            tracing::info!(
                "Initializing {} MCP clients for task {}",
                requirements.len(),
                self.task_id
            );
        }

        let this = &*self;
        let attempts = requirements.iter().map(|requirement| async move {
            (requirement.name.clone(), this.attempt(requirement).await)
        });
        let mut outcomes: HashMap<String, ConnectOutcome> =
            futures::future::join_all(attempts).await.into_iter().collect();

        let attempted = requirements.len();
        let mut successes = 0;
        for requirement in requirements {
            let name = requirement.name.clone();
            let record = match outcomes.remove(&name) {
                Some(ConnectOutcome::Connected(session)) => {
                    successes += 1;
                    self.clients.insert(name.clone(), session);
                    ClientRecord::connected(requirement)
                }
                Some(ConnectOutcome::Failed(error)) => {
                    context.record_error(&name, error.clone(), CONNECTION_FAILED);
                    ClientRecord::failed(requirement, error)
                }
                None => continue,
            };
            context.mcp_clients.insert(name, record);
        }

        if context.task_id.is_empty() {
            context.task_id = self.task_id.clone();
        }
        context.refresh_active_connections();
        self.store.save(context)?;

        tracing::info!(
            "Successfully initialized {}/{} MCP clients",
            successes,
            attempted
        );
        Ok(())
    }

    /// One isolated connection attempt
    async fn attempt(&self, requirement: &ClientRequirement) -> ConnectOutcome {
        tracing::info!("Initializing MCP client: {}", requirement.name);

        let env = self.merged_env(requirement);
        let client_name = format!("task-{}-{}", self.task_id, requirement.name);
        match self
            .connector
            .connect(&client_name, &requirement.launch, &env)
            .await
        {
            Ok(session) => {
                tracing::info!(
                    "Successfully connected to MCP server: {}",
                    requirement.name
                );
                ConnectOutcome::Connected(session)
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::error!(
                    "Failed to initialize MCP client {}: {}",
                    requirement.name,
                    error
                );
                ConnectOutcome::Failed(error)
            }
        }
    }

    /// Probe every connected client; failures mark it `unhealthy` but keep the handle
    pub async fn health_check(
        &mut self,
        context: &mut TaskContext,
    ) -> Result<HealthReport, StoreError> {
        tracing::info!("Performing MCP client health check");

        let mut report = HealthReport::default();
        for name in self.live_clients() {
            let connected = context
                .mcp_clients
                .get(&name)
                .is_some_and(|record| record.status == ClientStatus::Connected);
            let Some(session) = self.clients.get(&name).filter(|_| connected) else {
                continue;
            };

            let probe = tokio::time::timeout(self.health_timeout, session.list_tools()).await;
            let failure = match probe {
                Ok(Ok(tools)) => {
                    tracing::info!(
                        "MCP client {} is healthy ({} tools available)",
                        name,
                        tools.len()
                    );
                    report.healthy.insert(name.clone(), tools.len());
                    None
                }
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(_) => Some(format!(
                    "health check timed out after {}ms",
                    self.health_timeout.as_millis()
                )),
            };

            if let Some(error) = failure {
                tracing::warn!("MCP client {} health check failed: {}", name, error);
                if let Some(record) = context.mcp_clients.get_mut(&name) {
                    record.status = ClientStatus::Unhealthy;
                    record.last_error = Some(error.clone());
                }
                context.record_error(&name, error.clone(), HEALTH_CHECK_FAILED);
                report.unhealthy.insert(name, error);
            }
        }

        self.store.save(context)?;
        Ok(report)
    }

    /// Disconnect every live handle, then drop them all
    ///
    /// Persisting the terminal statuses is left to the cleanup collector.
    pub async fn cleanup(&mut self) -> DisconnectReport {
        tracing::info!("Cleaning up MCP client connections");

        let mut report = DisconnectReport::default();
        for name in self.live_clients() {
            let Some(session) = self.clients.get(&name) else {
                continue;
            };
            match session.disconnect().await {
                Ok(()) => {
                    tracing::info!("Disconnected MCP client: {}", name);
                    report.disconnected.push(name);
                }
                Err(e) => {
                    tracing::error!("Error disconnecting MCP client {}: {:#}", name, e);
                    report.failed.insert(name, format!("{:#}", e));
                }
            }
        }

        self.clients.clear();
        report
    }
}
