// Keeps the store under its byte budget by evicting least recently used works.

use tracing::{debug, info, warn};

use super::ledger::{ArtifactLedger, EvictError};
use crate::config::EVICTION_BATCH_SIZE;
use crate::error::{Result, WorkerError};
use crate::fsutil;
use crate::source::traits::WorkId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaReport {
    pub initial_bytes: u64,
    pub final_bytes: u64,
    pub evicted: Vec<WorkId>,
    pub reclaimed_bytes: u64,
}

pub struct QuotaEnforcer {
    limit_bytes: u64,
    batch_size: usize,
}

impl QuotaEnforcer {
    pub fn new(limit_bytes: u64) -> Self {
        Self {
            limit_bytes,
            batch_size: EVICTION_BATCH_SIZE,
        }
    }

    /// Evict until the store root fits the limit or nothing is left to evict.
    ///
    /// Running out of records while still over the limit is not an error.
    pub fn check(&self, ledger: &mut ArtifactLedger) -> Result<QuotaReport> {
        let root = ledger.layout().root().to_path_buf();
        let initial = fsutil::dir_size(&root)
            .map_err(|e| WorkerError::QuotaEnforcement(format!("cannot measure {}: {}", root.display(), e)))?;

        let mut report = QuotaReport {
            initial_bytes: initial,
            final_bytes: initial,
            ..QuotaReport::default()
        };
        let mut size = initial;

        while size > self.limit_bytes {
            let victims = ledger
                .oldest(self.batch_size)
                .map_err(|e| WorkerError::QuotaEnforcement(e.to_string()))?;
            if victims.is_empty() {
                warn!(
                    size,
                    limit = self.limit_bytes,
                    "store still over quota with no works left to evict"
                );
                break;
            }

            for entry in &victims {
                let freed = match fsutil::dir_size(&entry.path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(work_id = entry.work_id, "cannot measure work directory: {}", e);
                        0
                    }
                };

                match ledger.evict(entry) {
                    Ok(()) => {
                        debug!(work_id = entry.work_id, bytes = freed, "evicted work");
                        size = size.saturating_sub(freed);
                        report.reclaimed_bytes += freed;
                        report.evicted.push(entry.work_id);
                    }
                    Err(EvictError::Tree(e)) => {
                        warn!(work_id = entry.work_id, "record dropped but directory kept: {}", e);
                        report.evicted.push(entry.work_id);
                    }
                    Err(EvictError::Index(e)) => {
                        return Err(WorkerError::QuotaEnforcement(format!(
                            "cannot evict work {}: {}",
                            entry.work_id, e
                        )));
                    }
                }
            }
        }

        report.final_bytes = size;
        if !report.evicted.is_empty() {
            info!(
                evicted = report.evicted.len(),
                reclaimed = report.reclaimed_bytes,
                size = report.final_bytes,
                limit = self.limit_bytes,
                "store quota enforced"
            );
        }
        Ok(report)
    }
}
