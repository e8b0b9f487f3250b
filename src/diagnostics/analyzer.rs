//! Error categorization and remediation tables

use crate::core::{ClientStatus, TaskContext};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category assigned to an error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ConnectionError,
    PermissionError,
    ResourceNotFound,
    FormatError,
    ResourceExhaustion,
    SecurityError,
    UnknownError,
}

/// One row of the categorization decision table
struct CategoryRule {
    category: ErrorCategory,
    keywords: &'static [&'static str],
}

/// Evaluated top to bottom; the first row with a matching keyword wins
const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: ErrorCategory::ConnectionError,
        keywords: &["connection", "connect", "timeout", "unreachable"],
    },
    CategoryRule {
        category: ErrorCategory::PermissionError,
        keywords: &["permission", "access", "denied", "unauthorized"],
    },
    CategoryRule {
        category: ErrorCategory::ResourceNotFound,
        keywords: &["not found", "404", "missing"],
    },
    CategoryRule {
        category: ErrorCategory::FormatError,
        keywords: &["syntax", "json", "parse", "format"],
    },
    CategoryRule {
        category: ErrorCategory::ResourceExhaustion,
        keywords: &["memory", "limit", "resource"],
    },
    CategoryRule {
        category: ErrorCategory::SecurityError,
        keywords: &["ssl", "tls", "certificate"],
    },
];

const UNKNOWN_ACTIONS: &[&str] = &["Manual investigation required"];

impl ErrorCategory {
    /// Categorize free error text
    pub fn classify(error: &str) -> Self {
        let error = error.to_lowercase();
        CATEGORY_RULES
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| error.contains(k)))
            .map(|rule| rule.category)
            .unwrap_or(Self::UnknownError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionError => "connection_error",
            Self::PermissionError => "permission_error",
            Self::ResourceNotFound => "resource_not_found",
            Self::FormatError => "format_error",
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::SecurityError => "security_error",
            Self::UnknownError => "unknown_error",
        }
    }

    pub fn root_cause(&self) -> &'static str {
        match self {
            Self::ConnectionError => {
                "MCP server may be down, network issues, or incorrect server configuration"
            }
            Self::PermissionError => {
                "Insufficient permissions or invalid credentials for MCP server access"
            }
            Self::ResourceNotFound => "MCP server endpoint or required resources are missing",
            Self::FormatError => "Invalid configuration format or corrupted data structures",
            Self::ResourceExhaustion => {
                "System resources (memory, CPU, file handles) are exhausted"
            }
            Self::SecurityError => "SSL/TLS configuration issues or certificate problems",
            Self::UnknownError => "Error pattern not recognized, requires manual investigation",
        }
    }

    /// Ordered remediation steps
    pub fn recommended_actions(&self) -> &'static [&'static str] {
        match self {
            Self::ConnectionError => &[
                "Check MCP server status and availability",
                "Verify network connectivity and firewall settings",
                "Restart MCP servers if necessary",
                "Implement retry mechanism with exponential backoff",
                "Check server logs for additional error details",
            ],
            Self::PermissionError => &[
                "Verify MCP server credentials and API keys",
                "Check file system permissions for MCP server access",
                "Ensure proper environment variables are set",
                "Review server access control configurations",
                "Check user account permissions and roles",
            ],
            Self::ResourceNotFound => &[
                "Verify MCP server endpoints and URLs",
                "Check if required MCP server tools are installed",
                "Ensure MCP server configuration files exist",
                "Validate server capability declarations",
                "Check server registration and discovery",
            ],
            Self::FormatError => &[
                "Validate JSON configuration file syntax",
                "Check for proper data type conversions",
                "Verify MCP protocol message formats",
                "Review encoding and character set issues",
                "Regenerate configuration files if corrupted",
            ],
            Self::ResourceExhaustion => &[
                "Monitor system resource usage (CPU, memory, disk)",
                "Increase system resource limits if possible",
                "Implement connection pooling and cleanup",
                "Optimize MCP client initialization timing",
                "Add resource monitoring and alerting",
            ],
            Self::SecurityError => &[
                "Check SSL/TLS certificate validity and expiration",
                "Verify certificate chain and trust store",
                "Update security protocols and cipher suites",
                "Review firewall and security group settings",
                "Check for certificate authority issues",
            ],
            Self::UnknownError => UNKNOWN_ACTIONS,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clients to suspect for a failure
///
/// Unhealthy and failed clients when there are any; otherwise every
/// configured client.
pub fn affected_clients(context: &TaskContext) -> Vec<String> {
    let suspects: Vec<String> = context
        .mcp_clients
        .iter()
        .filter(|(_, record)| {
            matches!(record.status, ClientStatus::Unhealthy | ClientStatus::Failed)
        })
        .map(|(name, _)| name.clone())
        .collect();

    if suspects.is_empty() {
        context.mcp_clients.keys().cloned().collect()
    } else {
        suspects
    }
}
