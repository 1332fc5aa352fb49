// Converts the engine's 1-based line/column spans into absolute code-point offsets.

use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

/// A line/column span as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start_line: u64,
    pub start_col: u64,
    pub end_line: u64,
    pub end_col: u64,
}

impl Span {
    pub fn new(start_line: u64, start_col: u64, end_line: u64, end_col: u64) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

/// Absolute region in code points. `(0, 0)` when the span starts past the end of the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub offset: u64,
    pub length: u64,
}

/// Read `path` and locate `span` in it.
pub fn locate_in_file(path: &Path, span: Span) -> io::Result<Region> {
    let content = fs::read(path)?;
    let text = String::from_utf8_lossy(&content);
    let chars: Vec<char> = text.chars().collect();
    Ok(locate(&chars, span))
}

/// Locate `span` in already decoded text.
///
/// Columns on the first line are not shifted down by one while columns on
/// every later line are; the engine's output depends on this.
pub fn locate(chars: &[char], span: Span) -> Region {
    let len = chars.len();
    let mut idx = 0usize;
    let mut lines_to_start = span.start_line;
    let mut lines_to_end = span.end_line;

    while idx < len && lines_to_start > 1 {
        if chars[idx] == '\n' {
            lines_to_start -= 1;
            lines_to_end = lines_to_end.saturating_sub(1);
        }
        idx += 1;
    }
    if idx == len {
        return Region::default();
    }

    let Some(mut start) = (idx as u64).checked_add(span.start_col) else {
        warn!(?span, "start column out of range");
        return Region::default();
    };
    if span.start_line != 1 {
        start = start.saturating_sub(1);
    }

    let mut end_line_start = start;
    while (end_line_start as usize) < len && lines_to_end > 1 {
        if chars[end_line_start as usize] == '\n' {
            lines_to_end -= 1;
        }
        end_line_start += 1;
    }

    let Some(end) = end_line_start.checked_add(span.end_col) else {
        warn!(?span, "end column out of range");
        return Region::default();
    };
    Region {
        offset: start,
        length: end.saturating_sub(start),
    }
}
