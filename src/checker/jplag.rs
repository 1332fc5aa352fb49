use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::Checker;
use crate::config::{WorkerConfig, RESULT_ARCHIVE_NAME};
use crate::engine::ledger::StoreLayout;
use crate::error::{Result, WorkerError};
use crate::report::decoder::ResultDecoder;
use crate::report::model::ReportItem;

/// Runs the JPlag jar as a subprocess and decodes its result archive.
pub struct JplagChecker {
    java_bin: String,
    jar_path: PathBuf,
    language: String,
    work_dir: PathBuf,
    decoder: ResultDecoder,
}

impl JplagChecker {
    pub fn new(
        java_bin: impl Into<String>,
        jar_path: impl Into<PathBuf>,
        language: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        layout: StoreLayout,
    ) -> Self {
        Self {
            java_bin: java_bin.into(),
            jar_path: jar_path.into(),
            language: language.into(),
            work_dir: work_dir.into(),
            decoder: ResultDecoder::new(layout),
        }
    }

    pub fn from_config(cfg: &WorkerConfig, layout: StoreLayout) -> Self {
        Self::new(
            cfg.java_bin.clone(),
            cfg.checker_path.clone(),
            cfg.language.clone(),
            cfg.check_dir(),
            layout,
        )
    }

    fn result_path(&self) -> PathBuf {
        self.work_dir.join(RESULT_ARCHIVE_NAME)
    }

    /// Engine arguments for one run.
    pub fn command_args(&self, new_works: &[PathBuf], old_works: &[PathBuf], result: &Path) -> Vec<String> {
        let mut args = vec![
            "-jar".to_string(),
            self.jar_path.display().to_string(),
            "-new".to_string(),
            join_paths(new_works),
            "-l".to_string(),
            self.language.clone(),
            "-r".to_string(),
            result.display().to_string(),
        ];
        if !old_works.is_empty() {
            args.push("-old".to_string());
            args.push(join_paths(old_works));
        }
        args
    }

    async fn exec(&self, new_works: &[PathBuf], old_works: &[PathBuf], result: &Path) -> Result<()> {
        if new_works.is_empty() {
            return Err(WorkerError::EngineInvocation("no new works to check".into()));
        }
        if old_works.is_empty() && new_works.len() == 1 {
            return Err(WorkerError::EngineInvocation("nothing to compare against".into()));
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        remove_if_present(result).await?;

        let args = self.command_args(new_works, old_works, result);
        debug!(bin = self.java_bin.as_str(), ?args, "starting analysis engine");
        let output = Command::new(&self.java_bin)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| WorkerError::EngineInvocation(format!("cannot start {}: {}", self.java_bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::EngineInvocation(format!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Checker for JplagChecker {
    async fn run(&self, new_works: &[PathBuf], old_works: &[PathBuf]) -> Result<Vec<ReportItem>> {
        let result = self.result_path();
        let outcome = match self.exec(new_works, old_works, &result).await {
            Ok(()) => self.decoder.decode(&result),
            Err(e) => Err(e),
        };

        if let Err(e) = remove_if_present(&result).await {
            warn!(path = %result.display(), "cannot remove result archive: {}", e);
        }

        let reports = outcome?;
        info!(
            new = new_works.len(),
            old = old_works.len(),
            pairs = reports.len(),
            "analysis finished"
        );
        Ok(reports)
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
