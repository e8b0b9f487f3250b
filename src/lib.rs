//! mcp-lifecycle: lifecycle orchestration for the MCP clients of a task
//!
//! This library provides:
//! - Requirement detection from task metadata
//! - Concurrent client connection with per-client failure isolation
//! - Health checks and graceful teardown
//! - Execution metrics and cleanup summaries
//! - Error diagnostics with remediation advice
//!
//! Components share state only through a [`ContextStore`], either file backed
//! for separate `mcpctl` invocations or in memory when stages run together.

pub mod cleanup;
pub mod config;
pub mod core;
pub mod detection;
pub mod diagnostics;
pub mod lifecycle;
pub mod mcp;
pub mod storage;
pub mod transport;

pub use cleanup::CleanupCollector;
pub use config::Config;
pub use crate::core::{ContextStore, TaskContext};
pub use detection::RequirementDetector;
pub use diagnostics::DiagnosticEngine;
pub use lifecycle::ClientLifecycleManager;
pub use storage::{FileContextStore, MemoryContextStore};
