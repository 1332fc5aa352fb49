// Artifact ledger: sequences index records and extracted trees as one unit.
//
// Records are created after their tree is complete and removed before their
// tree is deleted, so a crash can strand an orphan directory but never leave
// a record pointing at nothing. Orphans are reclaimed by `sweep_orphans`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::store::{WorkEntry, WorkIndex};
use crate::error::{Result, WorkerError};
use crate::fsutil;
use crate::source::traits::WorkId;

const WORKS_DIR: &str = "works";
const INDEX_FILE: &str = "data.db";

/// Path arithmetic for the store root.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn works_dir(&self) -> PathBuf {
        self.root.join(WORKS_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Registered path of a work: `<root>/works/<id>`.
    pub fn work_dir(&self, work_id: WorkId) -> PathBuf {
        self.works_dir().join(work_id.to_string())
    }

    /// Directory the submission archive is unpacked into: `<root>/works/<id>/<id>`.
    pub fn extraction_root(&self, work_id: WorkId) -> PathBuf {
        self.work_dir(work_id).join(work_id.to_string())
    }
}

pub struct ArtifactLedger {
    layout: StoreLayout,
    index: WorkIndex,
}

impl ArtifactLedger {
    pub fn open(layout: StoreLayout) -> Result<Self> {
        fs::create_dir_all(layout.works_dir())?;
        let index = WorkIndex::open(layout.index_path())?;
        Ok(Self { layout, index })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn get(&self, work_id: WorkId) -> Result<Option<WorkEntry>> {
        self.index.get(work_id)
    }

    /// Look up a cached work, checking that its tree is still on disk.
    ///
    /// A record without a directory is dropped and reported as `Inconsistent`,
    /// so the next attempt downloads the work again.
    pub fn lookup(&mut self, work_id: WorkId) -> Result<Option<WorkEntry>> {
        let Some(entry) = self.index.get(work_id)? else {
            return Ok(None);
        };
        let root = self.layout.extraction_root(work_id);
        if root.is_dir() {
            return Ok(Some(entry));
        }
        warn!(work_id, path = %root.display(), "indexed work has no extracted tree, dropping record");
        self.index.delete(&[work_id])?;
        Err(WorkerError::Inconsistent(work_id))
    }

    pub fn touch(&mut self, work_ids: &[WorkId], ts: DateTime<Utc>) -> Result<()> {
        self.index.touch(work_ids, ts)
    }

    pub fn oldest(&self, n: usize) -> Result<Vec<WorkEntry>> {
        self.index.oldest(n)
    }

    pub fn len(&self) -> Result<usize> {
        self.index.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.index.is_empty()
    }

    /// Empty (or create) the extraction directory for a work about to be unpacked.
    pub fn prepare_extraction(&self, work_id: WorkId) -> Result<PathBuf> {
        let dir = self.layout.extraction_root(work_id);
        fsutil::reset_dir(&dir)?;
        Ok(dir)
    }

    /// Record a fully unpacked work. The extracted tree must already exist.
    pub fn register(&self, work_id: WorkId, ts: DateTime<Utc>) -> Result<WorkEntry> {
        let path = self.layout.work_dir(work_id);
        self.index.save(work_id, &path, ts)?;
        Ok(WorkEntry {
            work_id,
            path,
            last_access: ts,
        })
    }

    /// Drop the record, then the tree. The record is gone even if the tree
    /// could not be removed.
    pub fn evict(&mut self, entry: &WorkEntry) -> Result<(), EvictError> {
        self.index
            .delete(&[entry.work_id])
            .map_err(EvictError::Index)?;
        fsutil::remove_tree(&entry.path).map_err(EvictError::Tree)
    }

    /// Delete directories under `works/` that have no index record.
    pub fn sweep_orphans(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for dirent in fs::read_dir(self.layout.works_dir())? {
            let dirent = dirent?;
            let path = dirent.path();
            let indexed = match dirent.file_name().to_str().and_then(|s| s.parse::<WorkId>().ok()) {
                Some(work_id) => self.index.contains(work_id)?,
                None => false,
            };
            if indexed {
                continue;
            }

            let result = if dirent.file_type()?.is_dir() {
                fsutil::remove_tree(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    info!(path = %path.display(), "removed orphan artifact");
                    removed.push(path);
                }
                Err(e) => warn!(path = %path.display(), "cannot remove orphan artifact: {}", e),
            }
        }
        Ok(removed)
    }
}

/// Which half of an eviction failed.
#[derive(Debug, Error)]
pub enum EvictError {
    #[error("cannot drop index record: {0}")]
    Index(WorkerError),
    #[error("cannot remove directory: {0}")]
    Tree(io::Error),
}
