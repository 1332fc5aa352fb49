// Result decoder: turns the engine's result archive into pairwise reports.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};
use zip::ZipArchive;

use super::model::{MatchItem, MatchRecord, PairRecord, ReportItem};
use super::positions::{locate_in_file, Region, Span};
use crate::engine::ledger::StoreLayout;
use crate::error::{Result, WorkerError};
use crate::source::traits::WorkId;

/// Archive members that carry no pair data.
const AUXILIARY_FILES: &[&str] = &[
    "options.json",
    "overview.json",
    "README.txt",
    "submissionFileIndex.json",
];
const AUXILIARY_PREFIX: &str = "files";

pub struct ResultDecoder {
    layout: StoreLayout,
}

impl ResultDecoder {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Decode every pair record in the archive at `path`.
    ///
    /// Only an archive that cannot be opened is an error; malformed members
    /// are logged and skipped.
    pub fn decode(&self, path: &Path) -> Result<Vec<ReportItem>> {
        let entry_name = path.display().to_string();
        let file = File::open(path).map_err(|e| WorkerError::decode(entry_name.as_str(), e))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| WorkerError::decode(entry_name.as_str(), e))?;

        let mut reports = Vec::new();
        for i in 0..archive.len() {
            let mut member = match archive.by_index(i) {
                Ok(member) => member,
                Err(e) => {
                    warn!(index = i, "skipping unreadable result entry: {}", e);
                    continue;
                }
            };
            let name = member.name().to_string();
            if member.is_dir() || is_auxiliary(&name) {
                continue;
            }

            let mut raw = Vec::new();
            if let Err(e) = member.read_to_end(&mut raw) {
                warn!(entry = name.as_str(), "cannot read result entry: {}", e);
                continue;
            }

            match self.decode_pair(&name, &raw) {
                Ok(report) => reports.push(report),
                Err(e) => warn!("skipping result entry: {}", e),
            }
        }

        debug!(pairs = reports.len(), "result archive decoded");
        Ok(reports)
    }

    fn decode_pair(&self, name: &str, raw: &[u8]) -> Result<ReportItem> {
        let record: PairRecord =
            serde_json::from_slice(raw).map_err(|e| WorkerError::decode(name, e))?;

        let work1_id = parse_work_id(&record.id1).ok_or_else(|| {
            WorkerError::decode(name, format!("bad submission id {:?}", record.id1))
        })?;
        let work2_id = parse_work_id(&record.id2).ok_or_else(|| {
            WorkerError::decode(name, format!("bad submission id {:?}", record.id2))
        })?;

        let matches = record
            .matches
            .iter()
            .map(|m| self.decode_match(&record, work1_id, work2_id, m))
            .collect();

        Ok(ReportItem {
            work1_id,
            work2_id,
            avg_similarity: record.similarities.avg,
            max_similarity: record.similarities.max,
            matches,
        })
    }

    fn decode_match(
        &self,
        record: &PairRecord,
        work1_id: WorkId,
        work2_id: WorkId,
        m: &MatchRecord,
    ) -> MatchItem {
        let work1_file = strip_submission_prefix(&m.file1, &record.id1);
        let work2_file = strip_submission_prefix(&m.file2, &record.id2);

        let first = self.locate_side(
            work1_id,
            &work1_file,
            Span::new(m.start1, m.start1_col, m.end1, m.end1_col),
        );
        let second = self.locate_side(
            work2_id,
            &work2_file,
            Span::new(m.start2, m.start2_col, m.end2, m.end2_col),
        );

        MatchItem {
            work1_file,
            work1_offset: first.offset,
            work1_length: first.length,
            work2_file,
            work2_offset: second.offset,
            work2_length: second.length,
        }
    }

    fn locate_side(&self, work_id: WorkId, relative: &str, span: Span) -> Region {
        let path = self.layout.extraction_root(work_id).join(relative);
        match locate_in_file(&path, span) {
            Ok(region) => {
                if region == Region::default() {
                    debug!(work_id, file = relative, ?span, "span starts past end of file");
                }
                region
            }
            Err(e) => {
                warn!(work_id, path = %path.display(), "cannot read matched file: {}", e);
                Region::default()
            }
        }
    }
}

fn is_auxiliary(name: &str) -> bool {
    name.starts_with(AUXILIARY_PREFIX) || AUXILIARY_FILES.contains(&name)
}

/// Numeric work ID in front of the first `_` of a composite submission ID.
pub fn parse_work_id(composite: &str) -> Option<WorkId> {
    composite.split('_').next()?.parse().ok()
}

/// Drop the `<composite id><separator>` prefix the engine puts on file paths.
///
/// Paths shorter than the prefix are returned unchanged.
pub fn strip_submission_prefix(file: &str, composite: &str) -> String {
    let skip = composite.chars().count() + 1;
    match file.char_indices().nth(skip) {
        Some((byte_idx, _)) => file[byte_idx..].to_string(),
        None if file.chars().count() == skip => String::new(),
        None => file.to_string(),
    }
}
