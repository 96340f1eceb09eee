//! `corun`: a thin CLI wrapping the run-orchestration core for manual
//! exercising, demo scripting, and as a living example of wiring the core's
//! traits together (§10.5).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use corun_domain::{AgentManifest, FinishReason, RunId, RunStatus, StreamPart, SystemClock};
use corun_runtime::cancel_action::{cancel_action, CancelDeps};
use corun_runtime::cancel_signal::FileCancellationSignalStore;
use corun_runtime::config::{CancelOptions, RuntimeConfig};
use corun_runtime::observers::ObserverChain;
use corun_runtime::orchestrator::{orchestrate_run, signal_cancellation, Deps, OrchestrateInput};
use corun_runtime::run_lock::InMemoryRunLock;
use corun_runtime::state_store::{FileStateStore, StateStore};
use corun_runtime::{ScriptedLlmClient, ScriptedToolExecutor};

#[derive(Parser)]
#[command(name = "corun", about = "Run-orchestration core demo CLI")]
struct Cli {
    /// Directory holding run records and cancellation signals.
    #[arg(long, global = true, default_value = ".corun")]
    data_dir: PathBuf,

    /// Optional TOML config overriding `data_dir` and agent manifests.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a fresh run against a manifest with an initial prompt.
    Run {
        manifest: String,
        prompt: String,
    },
    /// Out-of-band cancel: classify the run's state and apply the right effect.
    Cancel {
        run_id: RunId,
        #[arg(long)]
        recursive: bool,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Write a cancellation signal without classifying the run's state.
    SignalCancel {
        run_id: RunId,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Approve a pending tool-call approval, resuming the run.
    Approve { run_id: RunId, approval_id: String },
    /// Deny a pending tool-call approval, resuming the run with a denial.
    Deny {
        run_id: RunId,
        approval_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Print a run record as JSON.
    Show { run_id: RunId },
}

fn build_deps(data_dir: &PathBuf) -> Arc<Deps> {
    let clock = Arc::new(SystemClock);
    Arc::new(Deps {
        state_store: Arc::new(FileStateStore::new(data_dir.join("runs"))),
        signal_store: Arc::new(FileCancellationSignalStore::new(data_dir.join("signals"))),
        lock: Arc::new(InMemoryRunLock::new(clock.clone())),
        clock,
        llm: Arc::new(ScriptedLlmClient::new(vec![vec![StreamPart::Finish {
            finish_reason: FinishReason::Stop,
            total_usage: None,
        }]])),
        tool_executor: Arc::new(ScriptedToolExecutor::new()),
        observers: Arc::new(ObserverChain::new()),
    })
}

fn demo_manifest(id: &str) -> AgentManifest {
    AgentManifest {
        id: id.to_string(),
        version: "1".into(),
        system_prompt: "you are a demo agent".into(),
        tool_policy: Default::default(),
        limits: Default::default(),
        allowed_sub_agents: vec![],
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RuntimeConfig { state_dir: cli.data_dir.clone(), ..RuntimeConfig::default() },
    };
    let deps = build_deps(&config.state_dir);

    match cli.command {
        Command::Run { manifest, prompt } => {
            let manifest = config
                .agents
                .get(&manifest)
                .cloned()
                .unwrap_or_else(|| demo_manifest(&manifest));
            let handle = orchestrate_run(
                OrchestrateInput::Request { prompt, manifest },
                config.run_options.clone(),
                deps,
            )
            .await?;
            println!("run {} started", handle.run_id);
            let record = handle.result.await??;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Cancel { run_id, recursive, reason } => {
            let cancel_deps = CancelDeps {
                state_store: deps.state_store.clone(),
                signal_store: deps.signal_store.clone(),
                lock: deps.lock.clone(),
                clock: deps.clock.clone(),
            };
            let options = CancelOptions { recursive, reason, lock_ttl_ms: None };
            let outcome = cancel_action(run_id, &options, &cancel_deps).await?;
            println!("{outcome:?}");
        }
        Command::SignalCancel { run_id, reason } => {
            signal_cancellation(run_id, reason, deps).await?;
            println!("signaled");
        }
        Command::Approve { run_id, approval_id } => {
            let handle = orchestrate_run(
                OrchestrateInput::Approval { run_id, approval_id, approved: true, reason: None },
                config.run_options.clone(),
                deps,
            )
            .await?;
            let record = handle.result.await??;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Deny { run_id, approval_id, reason } => {
            let handle = orchestrate_run(
                OrchestrateInput::Approval { run_id, approval_id, approved: false, reason },
                config.run_options.clone(),
                deps,
            )
            .await?;
            let record = handle.result.await??;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Show { run_id } => {
            let record = deps
                .state_store
                .get(run_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such run"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.status == RunStatus::Suspended {
                eprintln!("run is suspended pending approval(s)");
            }
        }
    }

    Ok(())
}

fn load_config(path: &std::path::Path) -> anyhow::Result<RuntimeConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(RuntimeConfig::load_from_str(&text)?)
}
