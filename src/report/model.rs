use serde::{Deserialize, Serialize};

use crate::source::traits::WorkId;

/// Similarity result for one analyzed pair of works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportItem {
    pub work1_id: WorkId,
    pub work2_id: WorkId,
    pub avg_similarity: f64,
    pub max_similarity: f64,
    pub matches: Vec<MatchItem>,
}

/// One matched region per side, in code points from the start of each file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchItem {
    pub work1_file: String,
    pub work1_offset: u64,
    pub work1_length: u64,

    pub work2_file: String,
    pub work2_offset: u64,
    pub work2_length: u64,
}

/// A per-pair record as written by the engine.
#[derive(Debug, Deserialize)]
pub(crate) struct PairRecord {
    pub id1: String,
    pub id2: String,
    pub similarities: Similarities,
    #[serde(default)]
    pub matches: Vec<MatchRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Similarities {
    #[serde(rename = "AVG")]
    pub avg: f64,
    #[serde(rename = "MAX")]
    pub max: f64,
}

/// 1-based line/column span on each side of a match.
#[derive(Debug, Deserialize)]
pub(crate) struct MatchRecord {
    pub file1: String,
    pub file2: String,
    pub start1: u64,
    pub start1_col: u64,
    pub end1: u64,
    pub end1_col: u64,
    pub start2: u64,
    pub start2_col: u64,
    pub end2: u64,
    pub end2_col: u64,
}
