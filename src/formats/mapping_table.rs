//! Synteny mapping-table adapter
//!
//! Tab-separated rows, 1-based inclusive coordinates. The columns used are
//!
//! | column | content |
//! |---|---|
//! | 0 | chromosome (same name on both sides) |
//! | 4, 5, 6 | destination fragment start, insertion marker, end |
//! | 8, 9, 10 | source fragment start, insertion marker, end |
//!
//! An insertion marker of `\N` means "no insertion". Rows whose raw source
//! start and end fields are equal carry no fragment and are skipped.

use crate::core::io::RecordLines;
use crate::core::{EngineError, Result};
use std::io::BufRead;
use std::ops::Range;
use std::path::Path;

const CHROM_FIELD: usize = 0;
const DESTINATION_START: usize = 4;
const DESTINATION_INSERTION: usize = 5;
const DESTINATION_END: usize = 6;
const SOURCE_START: usize = 8;
const SOURCE_INSERTION: usize = 9;
const SOURCE_END: usize = 10;

/// Marker for "no insertion"
pub const NO_INSERTION: &str = "\\N";

/// One fragment row, converted to 0-based half-open ranges
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRow {
    /// 1-based line number in the table
    pub line: usize,
    pub chrom: String,
    pub destination: Range<usize>,
    pub source: Range<usize>,
    /// Both insertion markers are `\N`
    pub aligned: bool,
}

impl MappingRow {
    /// Parse one row; `Ok(None)` for rows without a source fragment
    pub fn parse(line: &str, line_number: usize) -> std::result::Result<Option<Self>, String> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= SOURCE_END {
            return Err(format!("expected at least {} columns, found {}", SOURCE_END + 1, fields.len()));
        }
        if fields[SOURCE_START] == fields[SOURCE_END] {
            return Ok(None);
        }

        let position = |idx: usize| -> std::result::Result<usize, String> {
            let value: usize = fields[idx]
                .trim()
                .parse()
                .map_err(|_| format!("invalid position '{}' in column {}", fields[idx], idx))?;
            if value == 0 {
                return Err(format!("position 0 in column {} of a 1-based table", idx));
            }
            Ok(value)
        };
        let range = |start: usize, end: usize| -> std::result::Result<Range<usize>, String> {
            let (s, e) = (position(start)?, position(end)?);
            if e + 1 < s {
                return Err(format!("fragment end {} precedes start {}", e, s));
            }
            Ok(s - 1..e)
        };

        Ok(Some(Self {
            line: line_number,
            chrom: fields[CHROM_FIELD].to_string(),
            destination: range(DESTINATION_START, DESTINATION_END)?,
            source: range(SOURCE_START, SOURCE_END)?,
            aligned: fields[DESTINATION_INSERTION] == NO_INSERTION && fields[SOURCE_INSERTION] == NO_INSERTION,
        }))
    }

    /// Aligned rows must have fragments of equal length
    pub fn check_lengths(&self) -> Result<()> {
        if self.aligned && self.source.len() != self.destination.len() {
            return Err(EngineError::FragmentSizeMismatch {
                line: self.line,
                source_len: self.source.len(),
                destination_len: self.destination.len(),
            });
        }
        Ok(())
    }
}

/// Streaming reader of mapping-table rows
pub struct MappingTableReader<R: BufRead> {
    lines: RecordLines<R>,
}

impl MappingTableReader<Box<dyn BufRead + Send>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { lines: RecordLines::open(path, "mapping table")? })
    }
}

impl<R: BufRead> MappingTableReader<R> {
    pub fn new(reader: R, path: impl Into<String>) -> Self {
        Self {
            lines: RecordLines::new(reader, "mapping table", path),
        }
    }
}

impl<R: BufRead> Iterator for MappingTableReader<R> {
    type Item = Result<MappingRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line_number = self.lines.line_number() + 1;
            let parsed = match self.lines.next_text()? {
                Err(e) => return Some(Err(e)),
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => MappingRow::parse(line, line_number),
            };
            match parsed {
                Ok(Some(row)) => return Some(Ok(row)),
                Ok(None) => continue,
                Err(message) => return Some(Err(self.lines.error(message))),
            }
        }
    }
}
