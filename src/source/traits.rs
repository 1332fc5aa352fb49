use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::model::ReportItem;

pub type WorkId = u64;
pub type TaskId = u64;
pub type GroupId = u64;

/// A server-assigned unit naming one submission for the next comparison run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub group_id: GroupId,
    pub work_id: WorkId,
}

/// Remote calls the worker makes against the task orchestrator.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn poll_tasks(&self) -> Result<Vec<Task>>;
    async fn list_group_submissions(&self, group_id: GroupId) -> Result<Vec<WorkId>>;
    /// IDs without an available link are absent from the returned map.
    async fn resolve_download_links(&self, work_ids: &[WorkId]) -> Result<HashMap<WorkId, String>>;
    async fn submit_report(&self, report: &ReportItem) -> Result<()>;
    async fn close_tasks(&self, task_ids: &[TaskId], succeeded: bool) -> Result<()>;
}

/// Where submission archives come from.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Download the archive behind `url`. Anything but a 200 is `NotAvailable`.
    async fn download(&self, work_id: WorkId, url: &str) -> Result<Bytes>;
}
