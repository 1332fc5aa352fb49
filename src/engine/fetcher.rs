// Submission fetcher: resolves download links, downloads, unpacks and registers works.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::ledger::ArtifactLedger;
use super::stats::WorkerStats;
use super::store::WorkEntry;
use crate::error::{Result, WorkerError};
use crate::fsutil;
use crate::source::traits::{ArchiveSource, Orchestrator, WorkId};

/// Result of a partial-success bulk fetch.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub entries: Vec<WorkEntry>,
    /// The last failure seen, if any work could not be fetched.
    pub last_error: Option<WorkerError>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.last_error.is_none()
    }
}

pub struct SubmissionFetcher {
    orchestrator: Arc<dyn Orchestrator>,
    source: Arc<dyn ArchiveSource>,
    stats: Arc<WorkerStats>,
}

impl SubmissionFetcher {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        source: Arc<dyn ArchiveSource>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            orchestrator,
            source,
            stats,
        }
    }

    /// Ask the orchestrator where each work can be downloaded from.
    pub async fn resolve(&self, work_ids: &[WorkId]) -> Result<HashMap<WorkId, String>> {
        if work_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.orchestrator.resolve_download_links(work_ids).await
    }

    /// Download one work, unpack it into its own directory and record it.
    pub async fn fetch(
        &self,
        ledger: &mut ArtifactLedger,
        work_id: WorkId,
        url: &str,
    ) -> Result<WorkEntry> {
        let data = self.source.download(work_id, url).await?;
        self.stats.record_download(data.len() as u64);

        let dest = ledger.prepare_extraction(work_id)?;
        let files = fsutil::extract_zip(&data, &dest)?;
        debug!(work_id, files, bytes = data.len(), "work unpacked");

        let now = Utc::now();
        match ledger.register(work_id, now) {
            Ok(entry) => Ok(entry),
            Err(WorkerError::Conflict(_)) => {
                warn!(work_id, "work was already indexed, refreshing its record");
                ledger.touch(&[work_id], now)?;
                Ok(WorkEntry {
                    work_id,
                    path: ledger.layout().work_dir(work_id),
                    last_access: now,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch every work in turn. One failure never discards the others.
    pub async fn fetch_all(&self, ledger: &mut ArtifactLedger, work_ids: &[WorkId]) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        if work_ids.is_empty() {
            return outcome;
        }

        let urls = match self.resolve(work_ids).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("cannot resolve download links: {}", e);
                outcome.last_error = Some(e);
                return outcome;
            }
        };

        for &work_id in work_ids {
            let Some(url) = urls.get(&work_id) else {
                debug!(work_id, "no download link, skipping");
                continue;
            };

            match self.fetch(ledger, work_id, url).await {
                Ok(entry) => outcome.entries.push(entry),
                Err(e) => {
                    if e.is_not_available() {
                        debug!(work_id, url = url.as_str(), "work not available");
                    } else {
                        warn!(work_id, url = url.as_str(), "cannot fetch work: {}", e);
                    }
                    outcome.last_error = Some(e);
                }
            }
        }

        info!(
            requested = work_ids.len(),
            fetched = outcome.entries.len(),
            "works downloaded"
        );
        outcome
    }
}
