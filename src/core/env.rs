//! Environment lookups used by launch specs and diagnostics.

use std::collections::HashMap;
use std::path::PathBuf;

/// Read access to process-wide environment.
///
/// Production code uses [`ProcessEnv`]; tests inject a [`MapEnv`] so detection and
/// environment merging stay deterministic.
pub trait EnvSource: Send + Sync {
    /// Value of a single variable, `None` when unset or not valid unicode
    fn var(&self, key: &str) -> Option<String>;

    /// Every variable visible to spawned children
    fn vars(&self) -> Vec<(String, String)>;

    /// Working directory used as a path fallback
    fn current_dir(&self) -> PathBuf;

    /// Value of `key`, or `default` when unset
    fn var_or(&self, key: &str, default: &str) -> String {
        self.var(key).unwrap_or_else(|| default.to_string())
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }

    fn current_dir(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| ".".into())
    }
}

/// Fixed in-memory environment
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
    cwd: PathBuf,
}

impl MapEnv {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            cwd: cwd.into(),
        }
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn current_dir(&self) -> PathBuf {
        self.cwd.clone()
    }
}
