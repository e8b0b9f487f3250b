use clap::{Parser, Subcommand};
use mcp_lifecycle::config::Config;
use mcp_lifecycle::transport::{run_cleanup, run_diagnose, run_init};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("MCPCTL_GIT_HASH"),
    " ",
    env!("MCPCTL_BUILD_TIME"),
    ")"
);

#[derive(Parser)]
#[command(name = "mcpctl")]
#[command(author, version, long_version = LONG_VERSION)]
#[command(about = "Manage the MCP clients of a task: connect, tear down, diagnose", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding per-task documents
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and connect the MCP clients a task needs
    Init {
        /// Task identifier
        #[arg(long)]
        task_id: String,

        /// Task context document (mcp-config.json)
        #[arg(long)]
        config_path: PathBuf,

        /// Probe every connected client after initialization
        #[arg(long)]
        health_check: bool,
    },

    /// Disconnect a task's clients and write metrics
    Cleanup {
        /// Task identifier
        #[arg(long)]
        task_id: String,

        /// Final task status (e.g. completed, failed)
        #[arg(long)]
        status: String,
    },

    /// Analyze an MCP error and write a diagnostic report
    Diagnose {
        /// Task identifier
        #[arg(long)]
        task_id: String,

        /// Error message to analyze
        #[arg(long)]
        error: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "mcp_lifecycle=debug,mcpctl=debug"
    } else {
        "mcp_lifecycle=info,mcpctl=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(root) = cli.root {
        config.storage.root = root;
    }

    let result = match cli.command {
        Commands::Init {
            task_id,
            config_path,
            health_check,
        } => run_init(&config, &task_id, &config_path, health_check).await,
        Commands::Cleanup { task_id, status } => run_cleanup(&config, &task_id, &status),
        Commands::Diagnose { task_id, error } => run_diagnose(&config, &task_id, &error).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
