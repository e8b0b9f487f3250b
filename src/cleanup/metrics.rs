//! Execution metrics derived from a finalized task context.

use crate::core::{now_timestamp, ClientStatus, ErrorEntry, TaskContext};
use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-client entry of `execution-metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientMetrics {
    pub name: String,
    #[serde(rename = "type")]
    pub client_type: String,
    pub status: String,
    pub connected_at: Option<String>,
    pub disconnected_at: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Contents of `execution-metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub task_id: String,
    pub final_status: String,
    pub started_at: Option<String>,
    pub completed_at: String,
    pub client_connections: BTreeMap<String, ClientMetrics>,
    pub total_clients: usize,
    /// Clients that completed a handshake at some point
    pub successful_connections: usize,
    /// Clients that never connected
    pub failed_connections: usize,
    pub errors: Vec<ErrorEntry>,
}

impl ExecutionMetrics {
    pub fn collect(context: &TaskContext, final_status: &str) -> Self {
        let client_connections: BTreeMap<String, ClientMetrics> = context
            .mcp_clients
            .iter()
            .map(|(name, record)| {
                let metrics = ClientMetrics {
                    name: name.clone(),
                    client_type: record.config.client_type.to_string(),
                    status: record.status.to_string(),
                    connected_at: record.connected_at.clone(),
                    disconnected_at: record.disconnected_at.clone(),
                    duration_seconds: calculate_duration(
                        record.connected_at.as_deref(),
                        record.disconnected_at.as_deref(),
                    ),
                };
                (name.clone(), metrics)
            })
            .collect();

        let failed_connections = context
            .mcp_clients
            .values()
            .filter(|record| {
                record.status == ClientStatus::Failed || record.connected_at.is_none()
            })
            .count();

        Self {
            task_id: context.task_id.clone(),
            final_status: final_status.to_string(),
            started_at: context.started_at.clone(),
            completed_at: context.completed_at.clone().unwrap_or_else(now_timestamp),
            total_clients: context.mcp_clients.len(),
            successful_connections: context.mcp_clients.len() - failed_connections,
            failed_connections,
            client_connections,
            errors: context.errors.clone(),
        }
    }
}

/// Seconds between two timestamps; `None` when either is missing or unparsable
pub fn calculate_duration(start: Option<&str>, end: Option<&str>) -> Option<f64> {
    let start = parse_timestamp(start?)?;
    let end = parse_timestamp(end?)?;
    let millis = (end - start).num_milliseconds();
    Some(millis as f64 / 1000.0)
}

/// RFC 3339, or a naive ISO timestamp read as UTC
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
}
