// Error taxonomy for the worker pipeline.

use thiserror::Error;

use crate::source::traits::WorkId;

pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// An orchestrator call failed. Retried naturally on the next tick.
    #[error("orchestrator call {call} failed: {message}")]
    TransientRpc { call: &'static str, message: String },

    /// A single submission could not be downloaded.
    #[error("work {work_id} is not available for download")]
    NotAvailable { work_id: WorkId },

    #[error("cannot decode {entry}: {message}")]
    Decode { entry: String, message: String },

    #[error("analysis engine failed: {0}")]
    EngineInvocation(String),

    #[error("quota enforcement failed: {0}")]
    QuotaEnforcement(String),

    #[error("work {0} is already stored")]
    Conflict(WorkId),

    /// The index holds a record whose extracted tree is gone.
    #[error("work {0} is indexed but its directory is missing")]
    Inconsistent(WorkId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl WorkerError {
    pub(crate) fn rpc(call: &'static str, message: impl std::fmt::Display) -> Self {
        Self::TransientRpc {
            call,
            message: message.to_string(),
        }
    }

    pub(crate) fn decode(entry: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            entry: entry.into(),
            message: message.to_string(),
        }
    }

    /// True when the failure is scoped to a single submission.
    pub fn is_not_available(&self) -> bool {
        matches!(self, Self::NotAvailable { .. })
    }
}
