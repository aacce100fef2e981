//! Bowtie alignment-summary adapter
//!
//! Two tab-separated layouts are accepted:
//!
//! ```text
//! chrom  strand  start  sequence                  (4 columns)
//! read   strand  chrom  start  sequence  ...      (bowtie's default output)
//! ```
//!
//! `start` is 0-based and the aligned interval is `[start, start + len(sequence))`.

use crate::core::io::RecordLines;
use crate::core::{Result, Strand};
use crate::formats::IntervalRecord;
use std::io::BufRead;
use std::path::Path;

const FORMAT: &str = "bowtie";

/// Streaming reader of bowtie alignments
pub struct BowtieReader<R: BufRead> {
    lines: RecordLines<R>,
}

impl BowtieReader<Box<dyn BufRead + Send>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { lines: RecordLines::open(path, FORMAT)? })
    }
}

fn parse_line(line: &str) -> std::result::Result<IntervalRecord, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    let (strand, chrom, start, sequence) = match fields.len() {
        4 => (fields[1], fields[0], fields[2], fields[3]),
        n if n >= 5 => (fields[1], fields[2], fields[3], fields[4]),
        n => return Err(format!("expected 4 or at least 5 columns, found {}", n)),
    };
    let strand = Strand::from_field(strand).ok_or_else(|| format!("invalid strand '{}'", strand))?;
    let start: i64 = start
        .parse()
        .map_err(|_| format!("invalid start position '{}'", start))?;
    let end = start + sequence.len() as i64;
    Ok(IntervalRecord::new(chrom, start, end, Some(strand)))
}

impl<R: BufRead> BowtieReader<R> {
    pub fn new(reader: R, path: impl Into<String>) -> Self {
        Self {
            lines: RecordLines::new(reader, FORMAT, path),
        }
    }
}

impl<R: BufRead> Iterator for BowtieReader<R> {
    type Item = Result<IntervalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let parsed = match self.lines.next_text()? {
                Err(e) => return Some(Err(e)),
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => parse_line(line.trim_end()),
            };
            return Some(parsed.map_err(|message| self.lines.error(message)));
        }
    }
}
