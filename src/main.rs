use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::info;

use crosscheck_worker::checker::jplag::JplagChecker;
use crosscheck_worker::checker::Checker;
use crosscheck_worker::config::{WorkerConfig, FIRST_POLL_DELAY};
use crosscheck_worker::engine::fetcher::SubmissionFetcher;
use crosscheck_worker::engine::ledger::{ArtifactLedger, StoreLayout};
use crosscheck_worker::engine::quota::QuotaEnforcer;
use crosscheck_worker::engine::reconcile::TaskReconciler;
use crosscheck_worker::engine::stats::WorkerStats;
use crosscheck_worker::engine::worker::{PollIntervals, Worker, WorkerEvent};
use crosscheck_worker::source::http_source::HttpArchiveSource;
use crosscheck_worker::source::rpc_client::HttpOrchestrator;
use crosscheck_worker::source::traits::{ArchiveSource, Orchestrator};
use crosscheck_worker::telemetry;

/// Cross-check worker - downloads submissions, runs the similarity engine and reports matches
#[derive(Parser, Debug)]
#[command(name = "crosscheck-worker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Load the whole configuration from a TOML file instead of flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker directory (store, engine scratch space)
    #[arg(long, env = "workdir")]
    work_dir: Option<PathBuf>,

    /// Path to the analysis engine jar
    #[arg(long, env = "checkerPath")]
    checker_path: Option<PathBuf>,

    /// Storage budget for downloaded works in MB
    #[arg(long, env = "storageSize")]
    storage_size: Option<u64>,

    /// Orchestrator base URL
    #[arg(long, env = "mainServerHost")]
    orchestrator_url: Option<String>,

    /// Key sent to the orchestrator in the authorization header
    #[arg(long, env = "mainServerKey", hide_env_values = true)]
    orchestrator_key: Option<String>,

    /// Java launcher used to run the engine
    #[arg(long, default_value = "java")]
    java_bin: String,

    /// Source language passed to the engine
    #[arg(long, default_value = "csharp")]
    language: String,
}

impl Args {
    fn into_config(self) -> Result<WorkerConfig> {
        if let Some(path) = &self.config {
            return WorkerConfig::from_toml_file(path)
                .with_context(|| format!("cannot load config {}", path.display()));
        }

        let defaults = WorkerConfig::default();
        Ok(WorkerConfig {
            work_dir: self.work_dir.unwrap_or_default(),
            checker_path: self.checker_path.unwrap_or_default(),
            java_bin: self.java_bin,
            language: self.language,
            storage_size_mb: self.storage_size.unwrap_or(defaults.storage_size_mb),
            orchestrator_url: self.orchestrator_url.unwrap_or_default(),
            orchestrator_key: self.orchestrator_key.unwrap_or_default(),
            ..defaults
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Args::parse().into_config()?;
    cfg.validate().context("invalid configuration")?;

    info!(work_dir = %cfg.work_dir.display(), "initializing worker");

    let layout = StoreLayout::new(cfg.storage_root());
    let ledger = ArtifactLedger::open(layout.clone())
        .with_context(|| format!("cannot open store at {}", layout.root().display()))?;
    let orphans = ledger.sweep_orphans().context("cannot sweep orphan artifacts")?;
    if !orphans.is_empty() {
        info!(removed = orphans.len(), "orphan artifacts reclaimed");
    }

    let stats = Arc::new(WorkerStats::new());
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(HttpOrchestrator::new(
        cfg.orchestrator_url.clone(),
        cfg.orchestrator_key.clone(),
    ));
    let source: Arc<dyn ArchiveSource> = Arc::new(HttpArchiveSource::new());
    let fetcher = SubmissionFetcher::new(orchestrator.clone(), source, stats.clone());
    let reconciler = TaskReconciler::new(orchestrator.clone(), fetcher, stats.clone());
    let checker: Arc<dyn Checker> = Arc::new(JplagChecker::from_config(&cfg, layout));
    let quota = QuotaEnforcer::new(cfg.storage_limit_bytes());

    let worker = Worker::new(
        orchestrator,
        reconciler,
        checker,
        ledger,
        quota,
        stats,
        PollIntervals {
            first: FIRST_POLL_DELAY,
            idle: cfg.idle_poll_interval(),
            busy: cfg.busy_poll_interval(),
        },
    );

    let (tx, rx) = mpsc::channel::<WorkerEvent>(8);
    let signal_tx = tx.clone();
    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT")?;
    let mut sighup = signal(SignalKind::hangup()).context("failed to register SIGHUP")?;
    let mut sigquit = signal(SignalKind::quit()).context("failed to register SIGQUIT")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sighup.recv() => info!("Received SIGHUP"),
            _ = sigquit.recv() => info!("Received SIGQUIT"),
        }
        let _ = signal_tx.send(WorkerEvent::Shutdown).await;
    });

    worker.run(tx, rx).await;
    Ok(())
}
