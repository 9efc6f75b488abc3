//! Factory CLI - run plans and inspect workflows
//!
//! Thin front end over the `factory` library: loads configuration, opens the
//! SQLite stores and executes plans produced by an external planner.

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use factory::{Factory, FactoryConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Factory - dependency-aware task orchestration across department agents
#[derive(Parser)]
#[command(name = "factory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Execute department task plans and inspect their event history")]
#[command(long_about = r#"
Runs plans of department tasks (Research, Data, FrontendDevelopment,
BackendDevelopment, Bridge, Integration, Deployment) in order, halting on the
first failure. Workflow state and the event log are kept in SQLite.

Examples:
  factory run plan.json                     # Execute a plan and stream events
  factory status 3f2c...                    # Show a workflow document
  factory history 3f2c... -t task_progress  # Show progress events only
  factory choose --language node --ui       # Which sandbox would be used
"#)]
struct Cli {
    /// Path to config.toml
    #[arg(short, long, env = "FACTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL (overrides the config file)
    #[arg(long)]
    database: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan file and stream its events
    Run {
        /// Plan JSON produced by the planner
        plan: PathBuf,
    },

    /// Show a workflow document
    Status {
        workflow_id: String,
    },

    /// List workflows, newest first
    List,

    /// Show the event log of a workflow
    History {
        workflow_id: String,

        /// Only events of this type (e.g. agent_completed)
        #[arg(short = 't', long)]
        event_type: Option<String>,
    },

    /// Show which sandbox the selection policy picks
    Choose {
        #[arg(short, long)]
        language: String,

        /// Task needs visual feedback
        #[arg(long)]
        ui: bool,

        /// Task must run without network access
        #[arg(long)]
        offline: bool,

        /// Task handles sensitive data
        #[arg(long)]
        sensitive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("factory={},factory_cli={},warn", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Commands::Choose {
        language,
        ui,
        offline,
        sensitive,
    } = &cli.command
    {
        commands::choose(language, *ui, *offline, *sensitive);
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = FactoryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.database {
        config.database_url = url;
    }
    tracing::debug!("Using database {}", config.database_url);
    let factory = Factory::open(config)
        .await
        .context("Failed to open factory stores")?;

    match cli.command {
        Commands::Run { plan } => {
            let succeeded = commands::run(&factory, &plan, cli.verbose).await?;
            return Ok(exit_code(succeeded));
        }
        Commands::Status { workflow_id } => {
            commands::status(&factory, &workflow_id).await?;
        }
        Commands::List => {
            commands::list(&factory).await?;
        }
        Commands::History {
            workflow_id,
            event_type,
        } => {
            commands::history(&factory, &workflow_id, event_type.as_deref(), cli.verbose).await?;
        }
        Commands::Choose { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

/// A failed workflow exits non-zero once the stores have been dropped
fn exit_code(succeeded: bool) -> ExitCode {
    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
