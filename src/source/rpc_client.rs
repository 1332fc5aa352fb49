// JSON-over-HTTP client for the task orchestrator.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{GroupId, Orchestrator, Task, TaskId, WorkId};
use crate::error::{Result, WorkerError};
use crate::report::model::ReportItem;

const AUTHORIZATION: &str = "authorization";

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct GroupWorksResponse {
    #[serde(default)]
    work_ids: Vec<WorkId>,
}

#[derive(Debug, Serialize)]
struct LinksRequest<'a> {
    work_ids: &'a [WorkId],
}

#[derive(Debug, Deserialize)]
struct LinkItem {
    work_id: WorkId,
    #[serde(default)]
    download_link: String,
}

#[derive(Debug, Deserialize)]
struct LinksResponse {
    #[serde(default)]
    items: Vec<Option<LinkItem>>,
}

#[derive(Debug, Serialize)]
struct CloseRequest<'a> {
    task_ids: &'a [TaskId],
    succeeded: bool,
}

pub struct HttpOrchestrator {
    client: Client,
    base_url: String,
    key: String,
}

impl HttpOrchestrator {
    pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            key: key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        if self.key.is_empty() {
            req
        } else {
            req.header(AUTHORIZATION, self.key.as_str())
        }
    }

    async fn send(&self, call: &'static str, req: RequestBuilder) -> Result<reqwest::Response> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| WorkerError::rpc(call, e))?;
        let status = resp.status();
        debug!(call, status = status.as_u16(), "orchestrator response");
        if !status.is_success() {
            return Err(WorkerError::rpc(call, format!("HTTP {}", status.as_u16())));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Orchestrator for HttpOrchestrator {
    async fn poll_tasks(&self) -> Result<Vec<Task>> {
        let req = self
            .client
            .post(self.url("/tasks/poll"))
            .json(&serde_json::json!({}));
        let resp = self.send("PollTasks", req).await?;
        let body: PollResponse = resp
            .json()
            .await
            .map_err(|e| WorkerError::rpc("PollTasks", e))?;
        Ok(body.tasks)
    }

    async fn list_group_submissions(&self, group_id: GroupId) -> Result<Vec<WorkId>> {
        let req = self
            .client
            .get(self.url(&format!("/groups/{}/works", group_id)));
        let resp = self.send("ListGroupSubmissions", req).await?;
        let body: GroupWorksResponse = resp
            .json()
            .await
            .map_err(|e| WorkerError::rpc("ListGroupSubmissions", e))?;
        Ok(body.work_ids)
    }

    async fn resolve_download_links(&self, work_ids: &[WorkId]) -> Result<HashMap<WorkId, String>> {
        let req = self
            .client
            .post(self.url("/works/links"))
            .json(&LinksRequest { work_ids });
        let resp = self.send("ResolveDownloadLinks", req).await?;
        let body: LinksResponse = resp
            .json()
            .await
            .map_err(|e| WorkerError::rpc("ResolveDownloadLinks", e))?;

        Ok(body
            .items
            .into_iter()
            .flatten()
            .filter(|item| !item.download_link.is_empty())
            .map(|item| (item.work_id, item.download_link))
            .collect())
    }

    async fn submit_report(&self, report: &ReportItem) -> Result<()> {
        let req = self.client.post(self.url("/reports")).json(report);
        self.send("SubmitReport", req).await?;
        Ok(())
    }

    async fn close_tasks(&self, task_ids: &[TaskId], succeeded: bool) -> Result<()> {
        let req = self
            .client
            .post(self.url("/tasks/close"))
            .json(&CloseRequest {
                task_ids,
                succeeded,
            });
        self.send("CloseTasks", req).await?;
        Ok(())
    }
}
