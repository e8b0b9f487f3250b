//! Core domain modules
//!
//! Types, errors and traits shared by every lifecycle component.

pub mod env;
pub mod errors;
pub mod traits;
pub mod types;

pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use errors::{LifecycleError, StoreError};
pub use traits::{ContextStore, DocumentKind, McpConnector, McpSession};
pub use types::{
    now_timestamp, ClientRecord, ClientRequirement, ClientStatus, ClientType, ErrorEntry,
    LaunchSpec, TaskContext, CONNECTION_FAILED, HEALTH_CHECK_FAILED,
};
