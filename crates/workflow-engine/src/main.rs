//! Thin CLI over the typed [`Orchestrator`]/[`BrainstormService`] surface
//! (spec §6 scope decision: no HTTP/WS server binary, every external
//! operation is a typed method). Grounded on `coordination::main`'s
//! `clap::Parser` argument style and `tracing_subscriber::fmt`
//! initialization pattern.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use coordination::events::EventBus;
use coordination::git::GitIsolation;
use coordination::persistence::Store;
use coordination::state::{Issue, WorkflowState};

use workflow_engine::agents::{Architect, Developer, Reviewer};
use workflow_engine::brainstorm::BrainstormService;
use workflow_engine::driver::Driver;
use workflow_engine::graph::{Graph, ReviewerMode};
use workflow_engine::orchestrator::{
    ApproveRequest, Orchestrator, ResolveBlockerRequest, SetPlanRequest, StartWorkflowRequest,
};
use workflow_engine::sandbox::SandboxDriver;
use workflow_engine::{prompts, OrchestratorConfig};

mod env_keys {
    pub const WORKER_COMMAND: &str = "WORKFLOW_SANDBOX_WORKER_COMMAND";
    pub const WORKER_ARGS: &str = "WORKFLOW_SANDBOX_WORKER_ARGS";
    pub const WORKER_MODEL: &str = "WORKFLOW_SANDBOX_WORKER_MODEL";
    pub const REPO_ROOT: &str = "WORKFLOW_REPO_ROOT";
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Orchestrates an issue-to-PR agent workflow", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new workflow from an issue description.
    Start {
        /// JSON file with `{"id": ..., "title": ..., "body": ...}`.
        #[arg(long)]
        issue_file: PathBuf,
        #[arg(long, default_value = "default")]
        profile: String,
        #[arg(long)]
        worktree_path: Option<String>,
        /// Poll and print events until the workflow reaches a terminal state.
        #[arg(long, default_value_t = false)]
        follow: bool,
    },
    /// Print a workflow's current state and recent events.
    Status {
        #[arg(long)]
        workflow_id: Uuid,
    },
    /// List every known workflow.
    List,
    /// Approve or reject the currently pending batch.
    Approve {
        #[arg(long)]
        workflow_id: Uuid,
        #[arg(long, default_value_t = true)]
        approved: bool,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Resolve the currently reported blocker.
    ResolveBlocker {
        #[arg(long)]
        workflow_id: Uuid,
        #[arg(long)]
        resolution: String,
    },
    /// Replace a workflow's plan before (or, with --force, during) execution.
    SetPlan {
        #[arg(long)]
        workflow_id: Uuid,
        #[arg(long)]
        plan_file: Option<String>,
        #[arg(long)]
        plan_content: Option<String>,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Cancel a running or paused workflow.
    Cancel {
        #[arg(long)]
        workflow_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Resume every workflow left in-progress after a crash or restart.
    ResumeAll,
    /// Set a server-wide setting (retention/concurrency/timeout override),
    /// applied on top of env config at the next start.
    SetSetting {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// Brainstorm subsystem operations (spec component I).
    Brainstorm {
        #[command(subcommand)]
        command: BrainstormCommand,
    },
}

#[derive(Subcommand, Debug)]
enum BrainstormCommand {
    Create {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        topic: Option<String>,
    },
    Send {
        #[arg(long)]
        session_id: Uuid,
        #[arg(long)]
        message: String,
    },
    Handoff {
        #[arg(long)]
        session_id: Uuid,
        #[arg(long)]
        artifact_path: String,
        #[arg(long, default_value = "default")]
        profile: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = OrchestratorConfig::from_env()?;
    let store = Store::connect(&config.database_url)
        .await
        .context("failed to connect to the store")?;
    store.initialize_prompts(&prompts::defaults()).await?;
    config.apply_overrides(&store.all_settings().await?);

    let driver = build_driver();
    let orchestrator = build_orchestrator(config, store.clone(), driver.clone())?;
    let bus = EventBus::shared(coordination::events::DEFAULT_BUS_CAPACITY);
    let brainstorm = BrainstormService::new(store, bus, driver, orchestrator.clone());

    match args.command {
        Command::Start { issue_file, profile, worktree_path, follow } => {
            let issue: Issue = serde_json::from_str(&std::fs::read_to_string(&issue_file)?)
                .with_context(|| format!("{} is not a valid issue JSON file", issue_file.display()))?;
            let response = orchestrator
                .start_workflow(StartWorkflowRequest { issue, profile, worktree_path })
                .await?;
            println!("started workflow {}", response.workflow_id);
            if follow {
                follow_workflow(&orchestrator, response.workflow_id).await?;
            }
        }
        Command::Status { workflow_id } => {
            let view = orchestrator.get_workflow(workflow_id).await?;
            print_state(&view.state);
        }
        Command::List => {
            for state in orchestrator.list_workflows().await? {
                println!("{}  {}  {}", state.workflow_id, state.workflow_status, state.issue_id);
            }
        }
        Command::Approve { workflow_id, approved, feedback } => {
            orchestrator.approve_batch(workflow_id, ApproveRequest { approved, feedback }).await?;
            println!("recorded approval={approved} for workflow {workflow_id}");
        }
        Command::ResolveBlocker { workflow_id, resolution } => {
            orchestrator.resolve_blocker(workflow_id, ResolveBlockerRequest { resolution }).await?;
            println!("resolved blocker for workflow {workflow_id}");
        }
        Command::SetPlan { workflow_id, plan_file, plan_content, force } => {
            orchestrator
                .set_workflow_plan(workflow_id, SetPlanRequest { plan_file, plan_content, force })
                .await?;
            println!("updated plan for workflow {workflow_id}");
        }
        Command::Cancel { workflow_id, reason } => {
            orchestrator.cancel_workflow(workflow_id, reason).await?;
            println!("cancelled workflow {workflow_id}");
        }
        Command::ResumeAll => {
            let resumed = orchestrator.resume_incomplete_workflows().await?;
            println!("resumed {} workflow(s)", resumed.len());
            for workflow_id in resumed {
                println!("  {workflow_id}");
            }
        }
        Command::SetSetting { key, value } => {
            store.set_setting(&key, &value).await?;
            println!("set {key}={value}");
        }
        Command::Brainstorm { command } => run_brainstorm_command(&brainstorm, command).await?,
    }

    Ok(())
}

async fn run_brainstorm_command(brainstorm: &BrainstormService, command: BrainstormCommand) -> Result<()> {
    match command {
        BrainstormCommand::Create { profile, topic } => {
            let session = brainstorm.create_session(profile, topic).await?;
            println!("created brainstorm session {}", session.id);
        }
        BrainstormCommand::Send { session_id, message } => {
            let turn = brainstorm.send_message(session_id, message).await?;
            println!("{}", turn.message.content);
            for artifact in turn.artifacts {
                println!("artifact created: {} ({})", artifact.path, artifact.artifact_type);
            }
        }
        BrainstormCommand::Handoff { session_id, artifact_path, profile } => {
            let response = brainstorm.handoff_to_implementation(session_id, &artifact_path, profile).await?;
            println!("handed off to workflow {}", response.workflow_id);
        }
    }
    Ok(())
}

fn build_driver() -> Arc<dyn Driver> {
    let worker_command = std::env::var(env_keys::WORKER_COMMAND).unwrap_or_else(|_| "sandbox-worker".to_string());
    let worker_args = std::env::var(env_keys::WORKER_ARGS)
        .ok()
        .and_then(|raw| shlex::split(&raw))
        .unwrap_or_default();
    let model = std::env::var(env_keys::WORKER_MODEL).unwrap_or_else(|_| "default".to_string());
    Arc::new(SandboxDriver::new(worker_command, worker_args, model))
}

fn build_orchestrator(config: OrchestratorConfig, store: Store, driver: Arc<dyn Driver>) -> Result<Orchestrator> {
    let repo_root = std::env::var(env_keys::REPO_ROOT)
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().expect("current directory must be readable"));

    let git = Arc::new(GitIsolation::new(config.worktree_base_dir.clone(), &repo_root)?);
    let graph = Graph::new(
        Architect::new(driver.clone()),
        Developer::new(driver.clone()),
        ReviewerMode::Single(Reviewer::new(driver.clone())),
        git.clone(),
    );
    let bus = EventBus::shared(config.event_bus_capacity);
    Ok(Orchestrator::new(config, store, bus, git, graph))
}

async fn follow_workflow(orchestrator: &Orchestrator, workflow_id: Uuid) -> Result<()> {
    let mut seen = 0u64;
    loop {
        let view = orchestrator.get_workflow(workflow_id).await?;
        for event in view.latest_events.iter().filter(|e| e.sequence > seen) {
            seen = event.sequence;
            println!(
                "[{}] {:?}{}",
                event.agent,
                event.event_type,
                event.message.as_ref().map(|m| format!(": {m}")).unwrap_or_default()
            );
        }
        if view.state.workflow_status.is_terminal() {
            print_state(&view.state);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

fn print_state(state: &WorkflowState) {
    println!("workflow {}  status={}", state.workflow_id, state.workflow_status);
    println!("  issue: {}", state.issue_id);
    if let Some(blocker) = &state.current_blocker {
        println!("  blocked: {}", blocker.error_message);
    }
}
