use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::config::{dirs_home, AppConfig};
use weft_core::execution::{Execution, ExecutionStatus, LogLevel};
use weft_core::traits::{CredentialStore, WorkflowStore};
use weft_core::workflow::Workflow;
use weft_engine::{validate, WorkflowEngine, WorkflowService};
use weft_gateway::GatewayServer;
use weft_store::SqliteStore;

#[derive(Parser)]
#[command(name = "weft", version, about = "Workflow execution engine for LLM agents and tools")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "weft.toml")]
    config: PathBuf,

    /// Owner id for stored workflows and executions (defaults to gateway.default_owner)
    #[arg(long, env = "WEFT_OWNER")]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow definition file and record the execution
    Run {
        /// Workflow JSON file
        file: PathBuf,
        /// Input text (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
        /// Print the execution record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Execute a stored workflow by id
    Execute {
        workflow_id: String,
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Import workflow definition files into the store
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Manage stored workflows
    Workflows {
        #[command(subcommand)]
        action: WorkflowsAction,
    },
    /// Manage provider API keys for the owner
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },
    /// Inspect recorded executions
    Executions {
        #[command(subcommand)]
        action: ExecutionsAction,
    },
    /// Show per-day execution counters
    Metrics {
        /// Number of days to look back
        #[arg(long, default_value = "30")]
        days: u32,
    },
    /// Start the HTTP gateway
    Serve,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum WorkflowsAction {
    /// List stored workflows
    List,
    /// Print a stored workflow definition as JSON
    Show { id: String },
    /// Delete a stored workflow
    Delete { id: String },
}

#[derive(Subcommand)]
enum CredentialsAction {
    /// Store an API key for a provider (openai, anthropic, ...)
    Set {
        provider: String,
        /// Secret (read from stdin when omitted)
        secret: Option<String>,
    },
    /// List providers with a stored key
    List,
}

#[derive(Subcommand)]
enum ExecutionsAction {
    /// List recent executions
    List {
        /// Only executions of this workflow
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show one execution with its log
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "weft", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let owner = cli
        .owner
        .clone()
        .unwrap_or_else(|| config.gateway.default_owner.clone());

    let db_path = config.database_path();
    let store = Arc::new(SqliteStore::open(&db_path)?);
    info!(path = %db_path.display(), "Opened store");

    let engine = Arc::new(WorkflowEngine::from_config(&config, store.clone()));
    let service = Arc::new(
        WorkflowService::new(engine.clone(), store.clone(), store.clone(), store.clone())
            .with_default_credentials(config.default_credentials()),
    );

    match cli.command {
        Commands::Run { file, input, json } => {
            let workflow = read_workflow(&file, &owner)?;
            let input = read_input(input)?;
            let credentials = store
                .credentials(&owner)
                .await?
                .merged_over(&config.default_credentials());
            let execution = engine.run(&workflow, &input, &owner, &credentials).await?;
            print_execution(&execution, json)?;
            exit_on_failure(&execution);
        }
        Commands::Execute {
            workflow_id,
            input,
            json,
        } => {
            let input = read_input(input)?;
            let execution = service.execute_workflow(&workflow_id, &input, &owner).await?;
            print_execution(&execution, json)?;
            exit_on_failure(&execution);
        }
        Commands::Import { files } => {
            for file in &files {
                let workflow = read_workflow(file, &owner)?;
                if let Err(e) = validate(&workflow) {
                    warn!(file = %file.display(), error = %e, "Imported workflow will fail to run");
                }
                store.save_workflow(&workflow).await?;
                println!("Imported {} ({})", workflow.id, workflow.name);
            }
        }
        Commands::Workflows { action } => match action {
            WorkflowsAction::List => {
                let workflows = service.list_workflows(&owner).await?;
                if workflows.is_empty() {
                    println!("No workflows stored.");
                }
                for w in &workflows {
                    println!(
                        "{:<24}  {:<9?}  {:>3} nodes  {}",
                        truncate(&w.id, 24),
                        w.status,
                        w.nodes.len(),
                        w.name
                    );
                }
            }
            WorkflowsAction::Show { id } => {
                let workflow = service.get_workflow(&id, &owner).await?;
                println!("{}", serde_json::to_string_pretty(&workflow)?);
            }
            WorkflowsAction::Delete { id } => {
                service.delete_workflow(&id, &owner).await?;
                println!("Deleted {}", id);
            }
        },
        Commands::Credentials { action } => match action {
            CredentialsAction::Set { provider, secret } => {
                let secret = match secret {
                    Some(s) => s,
                    None => read_input(Vec::new())?,
                };
                let secrets = BTreeMap::from([(provider, secret)]);
                let written = service.set_credentials(&owner, &secrets).await?;
                println!("Stored API key for {}", written.join(", "));
            }
            CredentialsAction::List => {
                let credentials = store.credentials(&owner).await?;
                if credentials.is_empty() {
                    println!("No API keys stored for {}.", owner);
                }
                for provider in credentials.providers() {
                    println!("{}", provider);
                }
            }
        },
        Commands::Executions { action } => match action {
            ExecutionsAction::List { workflow, limit } => {
                let executions = service
                    .list_executions(&owner, workflow.as_deref(), Some(limit))
                    .await?;
                if executions.is_empty() {
                    println!("No executions recorded.");
                }
                for e in &executions {
                    println!(
                        "{}  {:<9}  {:<20}  {}  {}",
                        e.id,
                        e.status.as_str(),
                        truncate(&e.workflow_id, 20),
                        e.created_at.format("%Y-%m-%d %H:%M:%S"),
                        e.metrics
                            .duration
                            .map(|d| format!("{}ms", d))
                            .unwrap_or_else(|| "-".into()),
                    );
                }
            }
            ExecutionsAction::Show { id, json } => {
                let execution = service.get_execution(&id, &owner).await?;
                print_execution(&execution, json)?;
            }
        },
        Commands::Metrics { days } => {
            let metrics = service.metrics(&owner, Some(days)).await?;
            println!("Executions (last {} days):", days);
            if metrics.is_empty() {
                println!("  No executions recorded yet.");
            }
            for m in &metrics {
                println!(
                    "  {}  {:>4} runs  {:>4} ok  {:>4} failed  avg {:>8}  {:>8} tokens",
                    m.date,
                    m.count,
                    m.success_count,
                    m.failure_count,
                    m.avg_duration_ms
                        .map(|d| format!("{:.0}ms", d))
                        .unwrap_or_else(|| "-".into()),
                    m.total_tokens,
                );
            }
        }
        Commands::Serve => {
            let server = GatewayServer::new(config.gateway.clone(), service);
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Config | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// `weft.toml`, then `~/.weft/config.toml`, then defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home_config) = dirs_home().map(|h| h.join(".weft").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }
    info!("No config file found, using defaults");
    Ok(AppConfig::default())
}

fn read_workflow(path: &Path, owner: &str) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let mut workflow: Workflow = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid workflow file {}: {}", path.display(), e))?;
    workflow.owner_id = owner.to_string();
    Ok(workflow)
}

fn read_input(words: Vec<String>) -> anyhow::Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let stdin = io::stdin();
    let lines = stdin
        .lock()
        .lines()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

fn print_execution(execution: &Execution, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(execution)?);
        return Ok(());
    }

    println!("Execution {} [{}]", execution.id, execution.status);
    for entry in &execution.logs {
        let marker = match entry.level {
            LogLevel::Info => " ",
            LogLevel::Warning => "!",
            LogLevel::Error => "x",
        };
        println!(
            "  {} {} {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            marker,
            entry.message
        );
    }

    let m = &execution.metrics;
    if let Some(duration) = m.duration {
        println!("Duration: {}ms", duration);
    }
    if let Some(usage) = &m.token_usage {
        println!(
            "Tokens: {} prompt + {} completion = {}",
            usage.prompt, usage.completion, usage.total
        );
    }
    if let Some(cost) = m.cost {
        println!("Estimated cost: ${:.5}", cost);
    }
    if let Some(output) = &execution.output {
        println!();
        println!("{}", output);
    }
    Ok(())
}

fn exit_on_failure(execution: &Execution) {
    if execution.status == ExecutionStatus::Failed {
        std::process::exit(1);
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
