use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WorkerError};

/// Delay before the first poll after startup.
pub const FIRST_POLL_DELAY: Duration = Duration::from_secs(5);

/// Smallest storage budget accepted at startup (MB).
pub const MIN_STORAGE_SIZE_MB: u64 = 50;

/// Number of cache records evicted per quota round.
pub const EVICTION_BATCH_SIZE: usize = 10;

/// Name of the engine result archive inside the check directory.
pub const RESULT_ARCHIVE_NAME: &str = "result.zip";

const MB: u64 = 1024 * 1024;

/// Top-level configuration for the worker, built once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Root directory holding the store and engine scratch space.
    pub work_dir: PathBuf,
    /// Path to the analysis engine jar.
    pub checker_path: PathBuf,
    /// Java launcher used to run the engine.
    pub java_bin: String,
    /// Source language passed to the engine.
    pub language: String,
    /// Storage budget for downloaded works, in MB.
    pub storage_size_mb: u64,
    /// Base URL of the task orchestrator.
    pub orchestrator_url: String,
    /// Key sent in the `authorization` header of every orchestrator call.
    pub orchestrator_key: String,
    /// Poll interval after a cycle that found no tasks.
    pub idle_poll_interval_ms: u64,
    /// Poll interval after a cycle that processed tasks.
    pub busy_poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::new(),
            checker_path: PathBuf::new(),
            java_bin: "java".to_string(),
            language: "csharp".to_string(),
            storage_size_mb: 1024,
            orchestrator_url: String::new(),
            orchestrator_key: String::new(),
            idle_poll_interval_ms: 5_000,
            busy_poll_interval_ms: 100,
        }
    }
}

impl WorkerConfig {
    /// Load a configuration from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| WorkerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(WorkerError::Config("work_dir is not set".into()));
        }
        if self.checker_path.as_os_str().is_empty() {
            return Err(WorkerError::Config("checker_path is not set".into()));
        }
        if self.orchestrator_url.trim().is_empty() {
            return Err(WorkerError::Config("orchestrator_url is not set".into()));
        }
        if self.storage_size_mb < MIN_STORAGE_SIZE_MB {
            return Err(WorkerError::Config(format!(
                "storage size {} MB is below the minimum of {} MB",
                self.storage_size_mb, MIN_STORAGE_SIZE_MB
            )));
        }
        Ok(())
    }

    pub fn storage_root(&self) -> PathBuf {
        self.work_dir.join("storage")
    }

    pub fn check_dir(&self) -> PathBuf {
        self.work_dir.join("check").join("01")
    }

    pub fn storage_limit_bytes(&self) -> u64 {
        self.storage_size_mb.saturating_mul(MB)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn busy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.busy_poll_interval_ms)
    }
}
