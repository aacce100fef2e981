//! BED format adapter
//!
//! Reads BED-like interval files (`chrom start end [name score strand ...]`)
//! with zero-copy field splitting, and writes runs of equal signal as BED
//! regions.

use crate::core::io::{create_text, RecordLines};
use crate::core::{Layout, Result, SignalTable, Strand};
use crate::core::element::Element;
use crate::formats::IntervalRecord;
use memchr::memchr;
use std::io::{BufRead, Write};
use std::path::Path;

/// Zero-copy BED record view for parsing
/// Only parses coordinate fields immediately, other fields are kept as byte slices
pub struct BedRecordView<'a> {
    line: &'a [u8],
    pub chrom: &'a str,
    pub start: i64,
    pub end: i64,
    field_bounds: Vec<(usize, usize)>,
}

impl<'a> BedRecordView<'a> {
    /// Parse a BED line with minimal allocation
    pub fn parse(line: &'a [u8]) -> std::result::Result<Self, BedParseError> {
        if line.is_empty() {
            return Err(BedParseError::EmptyLine);
        }

        let mut field_bounds = Vec::with_capacity(6);
        let mut start_pos = 0;
        while let Some(tab_pos) = memchr(b'\t', &line[start_pos..]) {
            field_bounds.push((start_pos, start_pos + tab_pos));
            start_pos += tab_pos + 1;
        }
        field_bounds.push((start_pos, line.len()));

        if field_bounds.len() < 3 {
            return Err(BedParseError::TooFewFields {
                expected: 3,
                found: field_bounds.len(),
            });
        }

        let field = |i: usize, name: &'static str| {
            let (s, e) = field_bounds[i];
            std::str::from_utf8(&line[s..e]).map_err(|_| BedParseError::InvalidUtf8(name))
        };
        let chrom = field(0, "chrom")?;
        let start_str = field(1, "start")?;
        let start: i64 = start_str
            .trim()
            .parse()
            .map_err(|_| BedParseError::InvalidNumber("start", start_str.to_string()))?;
        let end_str = field(2, "end")?;
        let end: i64 = end_str
            .trim()
            .parse()
            .map_err(|_| BedParseError::InvalidNumber("end", end_str.to_string()))?;

        Ok(Self {
            line,
            chrom,
            start,
            end,
            field_bounds,
        })
    }

    pub fn field_count(&self) -> usize {
        self.field_bounds.len()
    }

    /// Get field as string slice (lazy access)
    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.field_bounds
            .get(index)
            .and_then(|(start, end)| std::str::from_utf8(&self.line[*start..*end]).ok())
    }

    pub fn name(&self) -> Option<&'a str> {
        self.field(3)
    }

    /// Strand column (field 5); `None` when absent
    pub fn strand_field(&self) -> Option<&'a str> {
        self.field(5)
    }
}

/// BED parsing error
#[derive(Debug, thiserror::Error)]
pub enum BedParseError {
    #[error("Empty line")]
    EmptyLine,

    #[error("Too few fields: expected at least {expected}, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("Invalid UTF-8 in field: {0}")]
    InvalidUtf8(&'static str),

    #[error("Invalid {0} value: {1}")]
    InvalidNumber(&'static str, String),

    #[error("Invalid strand '{0}', expected '+', '-' or '.'")]
    InvalidStrand(String),
}

fn is_header(line: &[u8]) -> bool {
    line.starts_with(b"#") || line.starts_with(b"track") || line.starts_with(b"browser")
}

/// Streaming reader of BED-like interval records
pub struct BedReader<R: BufRead> {
    lines: RecordLines<R>,
}

impl BedReader<Box<dyn BufRead + Send>> {
    /// Open a (possibly compressed) BED file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { lines: RecordLines::open(path, "BED")? })
    }
}

impl<R: BufRead> BedReader<R> {
    pub fn new(reader: R, path: impl Into<String>) -> Self {
        Self {
            lines: RecordLines::new(reader, "BED", path),
        }
    }
}

impl<R: BufRead> Iterator for BedReader<R> {
    type Item = Result<IntervalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let parsed = match self.lines.next_bytes()? {
                Err(e) => return Some(Err(e)),
                Ok(line) if line.is_empty() || is_header(line) => continue,
                Ok(line) => BedRecordView::parse(line).and_then(|view| {
                    let strand = match view.strand_field() {
                        None | Some(".") => None,
                        Some(s) => Some(
                            Strand::from_field(s.trim()).ok_or_else(|| BedParseError::InvalidStrand(s.to_string()))?,
                        ),
                    };
                    Ok(IntervalRecord::new(view.chrom, view.start, view.end, strand))
                }),
            };
            return Some(parsed.map_err(|e| self.lines.error(e)));
        }
    }
}

/// Write maximal runs of equal positive value as BED regions
///
/// Each run becomes `chrom start end {prefix}_{n} value`. Returns the
/// number of regions written.
pub fn export_bed_runs<T: Element, P: AsRef<Path>>(table: &SignalTable<T>, path: P, prefix: &str) -> Result<usize> {
    table.require(Layout::Unstranded)?;
    let mut out = create_text(path.as_ref())?;
    let mut count = 0usize;

    for (chrom, channels) in table.iter() {
        let values = channels[0].as_slice();
        let mut i = 0;
        while i < values.len() {
            let v = values[i].to_f64();
            if v > 0.0 {
                let start = i;
                while i < values.len() && values[i].to_f64() == v {
                    i += 1;
                }
                count += 1;
                writeln!(out, "{}\t{}\t{}\t{}_{}\t{}", chrom, start, i, prefix, count, v)?;
            } else {
                i += 1;
            }
        }
    }
    out.flush()?;
    log::info!("Wrote {} regions to {}", count, path.as_ref().display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Assembly, ChromDialect, EngineError};
    use tempfile::TempDir;

    fn read_all(data: &[u8]) -> Vec<Result<IntervalRecord>> {
        BedReader::new(data, "test.bed").collect()
    }

    #[test]
    fn test_parse_bed6() {
        let view = BedRecordView::parse(b"chr1\t100\t200\tread1\t0\t-").unwrap();
        assert_eq!(view.chrom, "chr1");
        assert_eq!((view.start, view.end), (100, 200));
        assert_eq!(view.name(), Some("read1"));
        assert_eq!(view.strand_field(), Some("-"));
    }

    #[test]
    fn test_parse_too_few_fields() {
        assert!(matches!(
            BedRecordView::parse(b"chr1\t100"),
            Err(BedParseError::TooFewFields { found: 2, .. })
        ));
    }

    #[test]
    fn test_reader_skips_headers() {
        let records = read_all(b"track name=x\n#c\nchr1\t0\t10\tr\t0\t+\n\nchr2\t5\t6\n");
        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.strand, Some(Strand::Plus));
        assert_eq!(records[1].as_ref().unwrap().strand, None);
    }

    #[test]
    fn test_reader_reports_line() {
        let records = read_all(b"chr1\t0\t10\nchr1\tx\t10\n");
        match &records[1] {
            Err(EngineError::Record(e)) => {
                assert_eq!(e.line, 2);
                assert_eq!(e.path, "test.bed");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_export_runs() {
        let asm = Assembly::from_lengths("t", [("chr1", 8)], &ChromDialect::AsIs);
        let mut table = SignalTable::<f32>::create("t", &asm, ChromDialect::AsIs, Layout::Unstranded);
        table
            .channel_mut("chr1", None)
            .unwrap()
            .copy_from_slice(&[0.0, 1.0, 1.0, 2.0, 0.0, 0.0, 1.0, 1.0]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.bed");
        assert_eq!(export_bed_runs(&table, &path, "peak").unwrap(), 3);
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "chr1\t1\t3\tpeak_1\t1");
        assert_eq!(lines[1], "chr1\t3\t4\tpeak_2\t2");
        assert_eq!(lines[2], "chr1\t6\t8\tpeak_3\t1");
    }
}
