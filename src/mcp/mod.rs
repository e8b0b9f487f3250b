//! MCP (Model Context Protocol) client implementation.
//!
//! The lifecycle manager only sees the [`McpConnector`](crate::core::McpConnector)
//! and [`McpSession`](crate::core::McpSession) traits; this module provides the
//! stdio implementation behind them.

pub mod client;
pub mod transport;
pub mod types;

// Re-export main types
pub use client::{McpClient, StdioConnector};
pub use transport::StdioTransport;
pub use types::{McpToolDef, ServerCapabilities};
