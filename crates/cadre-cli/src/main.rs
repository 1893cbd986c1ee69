mod render;

use anyhow::Context;
use cadre_core::TaskStatus;
use cadre_orchestrator::{Orchestrator, TaskFilter, TeamConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Team file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "cadre.toml";

#[derive(Parser, Debug)]
#[command(name = "cadre", version, about = "cadre: multi-agent task orchestrator")]
struct Cli {
    /// Path to the team file (defaults to ./cadre.toml, then the built-in team)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Restore the task ledger from a previous export before running
    #[arg(long, global = true)]
    import: Option<PathBuf>,

    /// Write the task ledger and message history here after running
    #[arg(long, global = true)]
    export: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute one action on an agent
    Run {
        agent: String,
        action: String,
        /// Free-form task description
        #[arg(num_args = 0.., trailing_var_arg = true)]
        description: Vec<String>,
    },
    /// Run a configured workflow
    Workflow {
        id: String,
        /// Input handed to the first step
        #[arg(num_args = 0.., trailing_var_arg = true)]
        input: Vec<String>,
    },
    /// Show session, task, and message summary
    Status,
    /// List configured agents
    Agents,
    /// Show one agent in detail
    Agent { id: String },
    /// List tasks in the ledger
    Tasks {
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        agent: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Explicit path must exist; otherwise fall back to `./cadre.toml`, then the
/// built-in team.
async fn load_team(explicit: Option<&Path>) -> anyhow::Result<TeamConfig> {
    if let Some(path) = explicit {
        return TeamConfig::load(path)
            .await
            .with_context(|| format!("loading team file '{}'", path.display()));
    }
    let fallback = Path::new(DEFAULT_CONFIG);
    if tokio::fs::try_exists(fallback).await.unwrap_or(false) {
        return Ok(TeamConfig::load(fallback).await?);
    }
    info!("No team file found, using the built-in team");
    Ok(TeamConfig::default_team())
}

fn pretty(value: &impl serde::Serialize) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

async fn dispatch(orchestrator: &Orchestrator, command: Commands) -> anyhow::Result<String> {
    let output = match command {
        Commands::Run {
            agent,
            action,
            description,
        } => {
            let result = orchestrator
                .execute_task(&agent, &action, &description.join(" "))
                .await?;
            pretty(&result)?
        }
        Commands::Workflow { id, input } => {
            let input = if input.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(input.join(" "))
            };
            let outcomes = orchestrator.run_workflow(&id, input).await?;
            pretty(&outcomes)?
        }
        Commands::Status => render::status(&orchestrator.get_status().await),
        Commands::Agents => render::agents(&orchestrator.list_agents()),
        Commands::Agent { id } => render::agent(&orchestrator.show_agent_status(&id).await?),
        Commands::Tasks { status, agent } => {
            let filter = TaskFilter {
                status,
                assignee: agent,
                ..TaskFilter::default()
            };
            render::tasks(&orchestrator.list_tasks(&filter).await)
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let team = load_team(cli.config.as_deref()).await?;
    let mut orchestrator = Orchestrator::with_builtin_roles(team)?;
    orchestrator.initialize().await?;

    if let Some(path) = &cli.import {
        orchestrator
            .import_state(path)
            .await
            .with_context(|| format!("importing state from '{}'", path.display()))?;
    }

    let outcome = dispatch(&orchestrator, cli.command).await;

    // Export even when the command failed so blocked tasks are kept.
    if let Some(path) = &cli.export {
        orchestrator
            .export_state(path)
            .await
            .with_context(|| format!("exporting state to '{}'", path.display()))?;
    }
    orchestrator.shutdown();

    println!("{}", outcome?.trim_end());
    Ok(())
}
