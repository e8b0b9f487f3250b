//! Domain error types
//!
//! These errors represent failures of the persisted task documents and of the
//! client lifecycle, distinct from the `anyhow` errors used at the CLI boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`ContextStore`](super::traits::ContextStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required document does not exist
    #[error("Document not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Reading or writing a document failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document exists but is not valid JSON for its schema
    #[error("Malformed document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be turned into JSON
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while talking to a single MCP client
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The server process closed its stdout before answering
    #[error("MCP server closed the connection")]
    TransportClosed,

    /// The server answered a request with a JSON-RPC error
    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A bounded wait elapsed
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// The session was already disconnected
    #[error("Client not connected: {0}")]
    NotConnected(String),
}
