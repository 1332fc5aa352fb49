// Event-driven worker loop: polls, analyzes and reports batches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ledger::ArtifactLedger;
use super::quota::QuotaEnforcer;
use super::reconcile::{group_batches, ReconcileOutcome, TaskBatch, TaskReconciler};
use super::stats::WorkerStats;
use crate::checker::Checker;
use crate::error::Result;
use crate::source::traits::Orchestrator;

/// Inputs to the loop. Both are consumed only while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    Tick,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Polling,
    Reconciling,
    Analyzing,
    Reporting,
    Closing,
    Stopped,
}

/// What one poll cycle did, which decides the next poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    NoTasks,
    Processed { batches: usize },
}

/// How a claimed batch ended before it was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Skipped,
    Reported { pairs: usize, failed_reports: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub first: Duration,
    pub idle: Duration,
    pub busy: Duration,
}

pub struct Worker {
    orchestrator: Arc<dyn Orchestrator>,
    reconciler: TaskReconciler,
    checker: Arc<dyn Checker>,
    ledger: ArtifactLedger,
    quota: QuotaEnforcer,
    stats: Arc<WorkerStats>,
    intervals: PollIntervals,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        reconciler: TaskReconciler,
        checker: Arc<dyn Checker>,
        ledger: ArtifactLedger,
        quota: QuotaEnforcer,
        stats: Arc<WorkerStats>,
        intervals: PollIntervals,
    ) -> Self {
        Self {
            orchestrator,
            reconciler,
            checker,
            ledger,
            quota,
            stats,
            intervals,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn ledger(&self) -> &ArtifactLedger {
        &self.ledger
    }

    pub fn next_delay(&self, outcome: CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::NoTasks => self.intervals.idle,
            CycleOutcome::Processed { .. } => self.intervals.busy,
        }
    }

    /// Drive the loop until a `Shutdown` event is consumed.
    ///
    /// `events` must be the receiving half of `sender`; the timer posts its
    /// ticks through `sender`, and the signal observer posts `Shutdown`.
    pub async fn run(
        mut self,
        sender: mpsc::Sender<WorkerEvent>,
        mut events: mpsc::Receiver<WorkerEvent>,
    ) {
        let timers = CancellationToken::new();
        schedule_tick(&sender, self.intervals.first, timers.clone());

        info!("worker started");
        while let Some(event) = events.recv().await {
            // Cycles run inline, so every event is consumed while idle.
            match event {
                WorkerEvent::Tick => {
                    let outcome = self.run_cycle().await;
                    let delay = self.next_delay(outcome);
                    debug!(?outcome, delay_ms = delay.as_millis() as u64, "next poll scheduled");
                    schedule_tick(&sender, delay, timers.clone());
                }
                WorkerEvent::Shutdown => {
                    info!("shutdown requested, stopping worker");
                    break;
                }
            }
        }

        timers.cancel();
        self.state = WorkerState::Stopped;
        info!("worker stopped");
    }

    /// One poll: fetch tasks and run every resulting batch to completion.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = WorkerState::Polling;
        let tasks = match self.orchestrator.poll_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("poll failed: {}", e);
                self.state = WorkerState::Idle;
                return CycleOutcome::NoTasks;
            }
        };

        if tasks.is_empty() {
            debug!("no new tasks");
            self.state = WorkerState::Idle;
            return CycleOutcome::NoTasks;
        }

        let batches = group_batches(tasks);
        let count = batches.len();
        for batch in &batches {
            self.handle_batch(batch).await;
        }

        self.state = WorkerState::Idle;
        CycleOutcome::Processed { batches: count }
    }

    /// Process a claimed batch and acknowledge it exactly once.
    pub async fn handle_batch(&mut self, batch: &TaskBatch) {
        info!(
            group_id = batch.group_id,
            works = ?batch.work_ids(),
            "processing batch"
        );

        let outcome = self.execute_batch(batch).await;

        self.state = WorkerState::Closing;
        let succeeded = outcome.is_ok();
        match &outcome {
            Ok(BatchOutcome::Skipped) => info!(group_id = batch.group_id, "nothing to compare, closing batch"),
            Ok(BatchOutcome::Reported { pairs, failed_reports }) => info!(
                group_id = batch.group_id,
                pairs,
                failed_reports,
                "batch reported"
            ),
            Err(e) => error!(group_id = batch.group_id, "batch failed: {}", e),
        }

        if let Err(e) = self
            .orchestrator
            .close_tasks(&batch.task_ids(), succeeded)
            .await
        {
            error!(group_id = batch.group_id, succeeded, "cannot close tasks: {}", e);
        }
        self.stats.record_batch(succeeded);

        if succeeded {
            self.enforce_quota();
        }

        let snap = self.stats.snapshot();
        info!(
            completed = snap.batches_completed,
            failed = snap.batches_failed,
            downloaded = snap.works_downloaded,
            download_bps = snap.download_bps,
            cache_hit_rate = snap.cache_hit_rate,
            evicted = snap.works_evicted,
            "worker stats"
        );
        self.state = WorkerState::Idle;
    }

    async fn execute_batch(&mut self, batch: &TaskBatch) -> Result<BatchOutcome> {
        self.state = WorkerState::Reconciling;
        let reconciliation = match self.reconciler.reconcile(&mut self.ledger, batch).await? {
            ReconcileOutcome::NothingToCompare { resolved } => {
                debug!(group_id = batch.group_id, resolved, "analysis skipped");
                return Ok(BatchOutcome::Skipped);
            }
            ReconcileOutcome::Ready(reconciliation) => reconciliation,
        };

        self.state = WorkerState::Analyzing;
        let reports = self
            .checker
            .run(&reconciliation.new_works, &reconciliation.old_works)
            .await?;

        self.state = WorkerState::Reporting;
        let mut failed_reports = 0usize;
        for report in &reports {
            if let Err(e) = self.orchestrator.submit_report(report).await {
                warn!(
                    work1_id = report.work1_id,
                    work2_id = report.work2_id,
                    "cannot submit report: {}",
                    e
                );
                failed_reports += 1;
            }
        }

        Ok(BatchOutcome::Reported {
            pairs: reports.len(),
            failed_reports,
        })
    }

    fn enforce_quota(&mut self) {
        match self.quota.check(&mut self.ledger) {
            Ok(report) => self.stats.record_evicted(report.evicted.len() as u64),
            Err(e) => error!("{}", e),
        }
    }
}

fn schedule_tick(sender: &mpsc::Sender<WorkerEvent>, delay: Duration, timers: CancellationToken) {
    let tx = sender.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let _ = tx.send(WorkerEvent::Tick).await;
            }
            _ = timers.cancelled() => {}
        }
    });
}
