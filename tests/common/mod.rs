#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crosscheck_worker::checker::Checker;
use crosscheck_worker::engine::fetcher::SubmissionFetcher;
use crosscheck_worker::engine::ledger::{ArtifactLedger, StoreLayout};
use crosscheck_worker::engine::quota::QuotaEnforcer;
use crosscheck_worker::engine::reconcile::TaskReconciler;
use crosscheck_worker::engine::stats::WorkerStats;
use crosscheck_worker::engine::worker::{PollIntervals, Worker};
use crosscheck_worker::report::model::ReportItem;
use crosscheck_worker::source::traits::{ArchiveSource, GroupId, Orchestrator, Task, TaskId, WorkId};
use crosscheck_worker::{Result, WorkerError};

/// Build an in-memory zip archive from `(name, contents)` pairs.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, files: &[(&str, &str)]) {
    std::fs::write(path, zip_bytes(files)).unwrap();
}

pub fn task(id: TaskId, group_id: GroupId, work_id: WorkId) -> Task {
    Task {
        id,
        group_id,
        work_id,
    }
}

pub fn link(work_id: WorkId) -> String {
    format!("mem://works/{}", work_id)
}

/// In-memory orchestrator that records every call it receives.
#[derive(Default)]
pub struct FakeOrchestrator {
    pub polls: Mutex<Vec<Vec<Task>>>,
    pub groups: Mutex<HashMap<GroupId, Vec<WorkId>>>,
    pub links: Mutex<HashMap<WorkId, String>>,
    pub fail_group_listing: Mutex<bool>,
    pub fail_reports: Mutex<bool>,
    pub resolve_calls: Mutex<Vec<Vec<WorkId>>>,
    pub reports: Mutex<Vec<ReportItem>>,
    pub closed: Mutex<Vec<(Vec<TaskId>, bool)>>,
}

impl FakeOrchestrator {
    pub fn with_group(group_id: GroupId, members: &[WorkId]) -> Self {
        let fake = Self::default();
        fake.groups.lock().insert(group_id, members.to_vec());
        for id in members {
            fake.links.lock().insert(*id, link(*id));
        }
        fake
    }

    pub fn queue_poll(&self, tasks: Vec<Task>) {
        self.polls.lock().push(tasks);
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn poll_tasks(&self) -> Result<Vec<Task>> {
        let mut polls = self.polls.lock();
        if polls.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(polls.remove(0))
        }
    }

    async fn list_group_submissions(&self, group_id: GroupId) -> Result<Vec<WorkId>> {
        if *self.fail_group_listing.lock() {
            return Err(WorkerError::TransientRpc {
                call: "ListGroupSubmissions",
                message: "unavailable".into(),
            });
        }
        Ok(self.groups.lock().get(&group_id).cloned().unwrap_or_default())
    }

    async fn resolve_download_links(&self, work_ids: &[WorkId]) -> Result<HashMap<WorkId, String>> {
        self.resolve_calls.lock().push(work_ids.to_vec());
        let links = self.links.lock();
        Ok(work_ids
            .iter()
            .filter_map(|id| links.get(id).map(|url| (*id, url.clone())))
            .collect())
    }

    async fn submit_report(&self, report: &ReportItem) -> Result<()> {
        if *self.fail_reports.lock() {
            return Err(WorkerError::TransientRpc {
                call: "SubmitReport",
                message: "rejected".into(),
            });
        }
        self.reports.lock().push(report.clone());
        Ok(())
    }

    async fn close_tasks(&self, task_ids: &[TaskId], succeeded: bool) -> Result<()> {
        self.closed.lock().push((task_ids.to_vec(), succeeded));
        Ok(())
    }
}

/// Serves submission archives from memory, keyed by URL.
#[derive(Default)]
pub struct MemorySource {
    pub archives: Mutex<HashMap<String, Vec<u8>>>,
    pub downloads: Mutex<Vec<WorkId>>,
}

impl MemorySource {
    /// One small C# file per work.
    pub fn for_works(work_ids: &[WorkId]) -> Self {
        let source = Self::default();
        for id in work_ids {
            let body = format!("class Work{} {{}}\n", id);
            source
                .archives
                .lock()
                .insert(link(*id), zip_bytes(&[("Program.cs", body.as_str())]));
        }
        source
    }
}

#[async_trait]
impl ArchiveSource for MemorySource {
    async fn download(&self, work_id: WorkId, url: &str) -> Result<Bytes> {
        self.downloads.lock().push(work_id);
        match self.archives.lock().get(url) {
            Some(data) => Ok(Bytes::from(data.clone())),
            None => Err(WorkerError::NotAvailable { work_id }),
        }
    }
}

/// Checker that records its inputs and returns canned reports.
#[derive(Default)]
pub struct FakeChecker {
    pub reports: Mutex<Vec<ReportItem>>,
    pub fail: Mutex<bool>,
    pub calls: Mutex<Vec<(Vec<PathBuf>, Vec<PathBuf>)>>,
}

#[async_trait]
impl Checker for FakeChecker {
    async fn run(&self, new_works: &[PathBuf], old_works: &[PathBuf]) -> Result<Vec<ReportItem>> {
        self.calls
            .lock()
            .push((new_works.to_vec(), old_works.to_vec()));
        if *self.fail.lock() {
            return Err(WorkerError::EngineInvocation("engine exited with 1".into()));
        }
        Ok(self.reports.lock().clone())
    }
}

pub fn pair(work1_id: WorkId, work2_id: WorkId) -> ReportItem {
    ReportItem {
        work1_id,
        work2_id,
        avg_similarity: 0.5,
        max_similarity: 0.75,
        matches: Vec::new(),
    }
}

pub fn open_ledger(root: &Path) -> ArtifactLedger {
    ArtifactLedger::open(StoreLayout::new(root)).unwrap()
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub orchestrator: Arc<FakeOrchestrator>,
    pub source: Arc<MemorySource>,
    pub checker: Arc<FakeChecker>,
    pub stats: Arc<WorkerStats>,
}

impl Harness {
    pub fn new(orchestrator: FakeOrchestrator, source: MemorySource) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            orchestrator: Arc::new(orchestrator),
            source: Arc::new(source),
            checker: Arc::new(FakeChecker::default()),
            stats: Arc::new(WorkerStats::new()),
        }
    }

    pub fn store_root(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    pub fn fetcher(&self) -> SubmissionFetcher {
        SubmissionFetcher::new(
            self.orchestrator.clone(),
            self.source.clone(),
            self.stats.clone(),
        )
    }

    pub fn reconciler(&self) -> TaskReconciler {
        TaskReconciler::new(self.orchestrator.clone(), self.fetcher(), self.stats.clone())
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            self.orchestrator.clone(),
            self.reconciler(),
            self.checker.clone(),
            open_ledger(&self.store_root()),
            QuotaEnforcer::new(u64::MAX),
            self.stats.clone(),
            PollIntervals {
                first: Duration::from_millis(10),
                idle: Duration::from_millis(50),
                busy: Duration::from_millis(5),
            },
        )
    }
}
