//! Requirement detection
//!
//! Decides which MCP clients a task needs from its `feature` and `taskTitle`
//! text. Each category is matched independently by case-insensitive substring
//! search; a matching category yields exactly one requirement.

use crate::core::{ClientRequirement, ClientType, EnvSource, LaunchSpec, TaskContext};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keywords that signal database access
const DATABASE_KEYWORDS: &[&str] = &["database", "sql", "query", "migration", "schema", "data"];

/// Keywords that signal filesystem access
const FILESYSTEM_KEYWORDS: &[&str] = &[
    "file",
    "directory",
    "upload",
    "download",
    "storage",
    "import",
    "export",
];

/// Keywords that signal version-control integration
const VCS_KEYWORDS: &[&str] = &[
    "github",
    "repository",
    "commit",
    "branch",
    "pr",
    "pull request",
];

/// Keywords that signal external API access
const API_KEYWORDS: &[&str] = &[
    "api",
    "rest",
    "endpoint",
    "service",
    "integration",
    "webhook",
];

/// 10 MiB cap handed to the filesystem server
const MAX_FILE_SIZE: &str = "10485760";

/// Requests per window allowed to the API server
const API_RATE_LIMIT: &str = "100";

/// Keyword set for a category
pub fn keywords(client_type: ClientType) -> &'static [&'static str] {
    match client_type {
        ClientType::Database => DATABASE_KEYWORDS,
        ClientType::Filesystem => FILESYSTEM_KEYWORDS,
        ClientType::VcsIntegration => VCS_KEYWORDS,
        ClientType::Api => API_KEYWORDS,
    }
}

/// Detects client requirements from task metadata
pub struct RequirementDetector {
    env: Arc<dyn EnvSource>,
}

impl RequirementDetector {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self { env }
    }

    /// Requirements for every category whose keywords appear in the task text
    pub fn detect(&self, context: &TaskContext) -> Vec<ClientRequirement> {
        let feature = context.feature.to_lowercase();
        let title = context.task_title.to_lowercase();

        let requirements: Vec<ClientRequirement> = ClientType::ALL
            .into_iter()
            .filter(|client_type| {
                keywords(*client_type)
                    .iter()
                    .any(|keyword| feature.contains(keyword) || title.contains(keyword))
            })
            .map(|client_type| self.requirement(client_type))
            .collect();

        tracing::debug!(
            task_id = %context.task_id,
            "Detected {} MCP client requirement(s)",
            requirements.len()
        );
        requirements
    }

    /// Fixed launch specification for a category
    pub fn requirement(&self, client_type: ClientType) -> ClientRequirement {
        let env = &self.env;
        let (name, command, args, vars): (&str, &str, &[&str], Vec<(&str, String)>) =
            match client_type {
                ClientType::Database => (
                    "database",
                    "python",
                    &["mcp-database-server.py"],
                    vec![
                        ("DB_CONNECTION_STRING", env.var_or("DB_CONNECTION_STRING", "")),
                        ("DB_READ_ONLY", "true".to_string()),
                        ("DB_TIMEOUT", "30".to_string()),
                    ],
                ),
                ClientType::Filesystem => (
                    "filesystem",
                    "python",
                    &["mcp-filesystem-server.py"],
                    vec![
                        (
                            "ALLOWED_PATHS",
                            env.var("ALLOWED_PATHS").unwrap_or_else(|| {
                                env.current_dir().to_string_lossy().into_owned()
                            }),
                        ),
                        ("MAX_FILE_SIZE", MAX_FILE_SIZE.to_string()),
                    ],
                ),
                ClientType::VcsIntegration => (
                    "github",
                    "npx",
                    &["@modelcontextprotocol/server-github"],
                    vec![(
                        "GITHUB_PERSONAL_ACCESS_TOKEN",
                        env.var_or("GITHUB_TOKEN", ""),
                    )],
                ),
                ClientType::Api => (
                    "api",
                    "python",
                    &["mcp-api-server.py"],
                    vec![
                        ("API_BASE_URL", env.var_or("API_BASE_URL", "")),
                        ("API_KEY", env.var_or("API_KEY", "")),
                        ("RATE_LIMIT", API_RATE_LIMIT.to_string()),
                    ],
                ),
            };

        ClientRequirement {
            name: name.to_string(),
            client_type,
            launch: LaunchSpec {
                command: command.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                env: vars
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect::<BTreeMap<_, _>>(),
            },
        }
    }
}
