// Task reconciliation: splits a group's membership into newly assigned and known works.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::fetcher::SubmissionFetcher;
use super::ledger::ArtifactLedger;
use super::stats::WorkerStats;
use super::store::WorkEntry;
use crate::error::Result;
use crate::source::traits::{GroupId, Orchestrator, Task, TaskId, WorkId};

/// Tasks of one poll that share a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBatch {
    pub group_id: GroupId,
    pub tasks: Vec<Task>,
}

impl TaskBatch {
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    pub fn work_ids(&self) -> Vec<WorkId> {
        self.tasks.iter().map(|t| t.work_id).collect()
    }
}

/// Split polled tasks into one batch per group, keeping first-seen order.
pub fn group_batches(tasks: Vec<Task>) -> Vec<TaskBatch> {
    let mut batches: Vec<TaskBatch> = Vec::new();
    for task in tasks {
        match batches.iter_mut().find(|b| b.group_id == task.group_id) {
            Some(batch) => batch.tasks.push(task),
            None => batches.push(TaskBatch {
                group_id: task.group_id,
                tasks: vec![task],
            }),
        }
    }
    batches
}

/// A group ready for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub group_id: GroupId,
    /// Paths of works named by the current batch.
    pub new_works: Vec<PathBuf>,
    /// Paths of the remaining group members.
    pub old_works: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// At most one member resolved; there is nothing to compare.
    NothingToCompare { resolved: usize },
    Ready(Reconciliation),
}

pub struct TaskReconciler {
    orchestrator: Arc<dyn Orchestrator>,
    fetcher: SubmissionFetcher,
    stats: Arc<WorkerStats>,
}

impl TaskReconciler {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        fetcher: SubmissionFetcher,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            orchestrator,
            fetcher,
            stats,
        }
    }

    /// Resolve every member of the batch's group and partition them.
    ///
    /// Fails only when the group listing fails or the store is inconsistent.
    /// Works that cannot be downloaded are left out.
    pub async fn reconcile(
        &self,
        ledger: &mut ArtifactLedger,
        batch: &TaskBatch,
    ) -> Result<ReconcileOutcome> {
        let listed = self
            .orchestrator
            .list_group_submissions(batch.group_id)
            .await?;

        let mut seen = HashSet::new();
        let members: Vec<WorkId> = listed.into_iter().filter(|id| seen.insert(*id)).collect();

        let members = self.resolve_members(ledger, &members).await?;
        info!(
            group_id = batch.group_id,
            resolved = members.len(),
            "group membership resolved"
        );

        if members.len() <= 1 {
            return Ok(ReconcileOutcome::NothingToCompare {
                resolved: members.len(),
            });
        }

        let assigned: HashSet<WorkId> = batch.work_ids().into_iter().collect();
        let (new, old): (Vec<WorkEntry>, Vec<WorkEntry>) = members
            .into_iter()
            .partition(|entry| assigned.contains(&entry.work_id));

        Ok(ReconcileOutcome::Ready(Reconciliation {
            group_id: batch.group_id,
            new_works: new.into_iter().map(|e| e.path).collect(),
            old_works: old.into_iter().map(|e| e.path).collect(),
        }))
    }

    /// Cache hits first (touched in bulk), then downloads for the misses.
    async fn resolve_members(
        &self,
        ledger: &mut ArtifactLedger,
        work_ids: &[WorkId],
    ) -> Result<Vec<WorkEntry>> {
        let mut found = Vec::with_capacity(work_ids.len());
        let mut missing = Vec::new();
        for &work_id in work_ids {
            match ledger.lookup(work_id)? {
                Some(entry) => found.push(entry),
                None => missing.push(work_id),
            }
        }
        self.stats
            .record_lookup(found.len() as u64, missing.len() as u64);

        let hit_ids: Vec<WorkId> = found.iter().map(|e| e.work_id).collect();
        let now = Utc::now();
        match ledger.touch(&hit_ids, now) {
            Ok(()) => found.iter_mut().for_each(|e| e.last_access = now),
            Err(e) => warn!("cannot refresh access time of cached works: {}", e),
        }

        if !missing.is_empty() {
            let outcome = self.fetcher.fetch_all(ledger, &missing).await;
            if let Some(e) = &outcome.last_error {
                warn!(
                    missing = missing.len(),
                    fetched = outcome.entries.len(),
                    "some group members could not be fetched: {}",
                    e
                );
            }
            found.extend(outcome.entries);
        }

        Ok(found)
    }
}
