//! System snapshot attached to diagnostic reports
//!
//! Every probe resolves to a safe default instead of failing.

use crate::config::ProbesConfig;
use crate::core::{EnvSource, TaskContext};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;

/// Placeholder for checks not performed
pub const UNABLE_TO_CHECK: &str = "Unable to check";

/// Variables holding credentials; reported only as set or not
const SECRET_VARS: &[&str] = &["DB_CONNECTION_STRING", "GITHUB_TOKEN", "API_KEY"];

/// Variables reported by value
const PLAIN_VARS: &[&str] = &["API_BASE_URL", "ALLOWED_PATHS", "MCP_LOG_LEVEL", "PATH", "RUST_LOG"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDiagnostics {
    pub runtime: RuntimeInfo,
    pub environment_variables: BTreeMap<String, String>,
    pub file_system_status: FileSystemStatus,
    pub network_connectivity: NetworkConnectivity,
    pub mcp_server_status: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub version: String,
    pub git_hash: String,
    pub working_directory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemStatus {
    pub mcp_clients_dir: bool,
    pub task_config_exists: bool,
    pub write_permissions: bool,
    pub disk_space: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnectivity {
    pub localhost: bool,
    pub internet_access: bool,
    pub dns_resolution: String,
}

pub fn runtime_info(env: &dyn EnvSource) -> RuntimeInfo {
    RuntimeInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("MCPCTL_GIT_HASH").unwrap_or("unknown").to_string(),
        working_directory: env.current_dir().to_string_lossy().into_owned(),
    }
}

pub fn environment_variables(env: &dyn EnvSource) -> BTreeMap<String, String> {
    let secrets = SECRET_VARS.iter().map(|name| {
        let state = match env.var(name) {
            Some(value) if !value.is_empty() => "Set",
            _ => "Not set",
        };
        (name.to_string(), state.to_string())
    });
    let plain = PLAIN_VARS
        .iter()
        .map(|name| (name.to_string(), env.var_or(name, "Not set")));
    secrets.chain(plain).collect()
}

/// Accessibility of the task root
///
/// `task_config_exists` is supplied by the caller since only the store knows
/// where the context lives.
pub fn file_system_status(root: &Path, task_config_exists: bool) -> FileSystemStatus {
    FileSystemStatus {
        mcp_clients_dir: root.is_dir(),
        task_config_exists,
        write_permissions: root.is_dir() && tempfile::NamedTempFile::new_in(root).is_ok(),
        disk_space: UNABLE_TO_CHECK.to_string(),
    }
}

pub async fn network_connectivity(probes: &ProbesConfig, timeout: Duration) -> NetworkConnectivity {
    let (localhost, internet_access) = tokio::join!(
        reachable(&probes.loopback, timeout),
        reachable(&probes.external, timeout)
    );
    NetworkConnectivity {
        localhost,
        internet_access,
        dns_resolution: UNABLE_TO_CHECK.to_string(),
    }
}

/// TCP connect within `timeout`
pub async fn reachable(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!("Probe {} failed: {}", addr, e);
            false
        }
        Err(_) => {
            tracing::debug!("Probe {} timed out after {:?}", addr, timeout);
            false
        }
    }
}

/// One line per configured client
pub fn mcp_server_status(context: &TaskContext) -> BTreeMap<String, String> {
    context
        .mcp_clients
        .iter()
        .map(|(name, record)| {
            (
                name.clone(),
                format!(
                    "Command: {}, Status: {}",
                    record.config.launch.command, record.status
                ),
            )
        })
        .collect()
}
