//! Tag directory adapter
//!
//! A tag directory holds one `*.tags.tsv` file per chromosome. Each line is
//!
//! ```text
//! chrom  position  strand  count  length
//! ```
//!
//! with a 1-based `position` of the read's 5' end, strand `0` (`+`) or `1`
//! (`-`), a (possibly fractional) read `count` and the read `length`. A `+`
//! tag covers `[position - 1, position - 1 + length)`; a `-` tag covers
//! `[position - length, position)`, so its 5' end is the last base.

use crate::core::io::RecordLines;
use crate::core::{Result, Strand};
use crate::formats::IntervalRecord;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Suffix of the per-chromosome tag files
pub const TAG_FILE_SUFFIX: &str = ".tags.tsv";

/// Tag files of a directory in sorted order
pub fn tag_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(TAG_FILE_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn parse_line(line: &str) -> std::result::Result<IntervalRecord, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return Err(format!("expected 5 columns, found {}", fields.len()));
    }
    let position: i64 = fields[1]
        .parse()
        .map_err(|_| format!("invalid position '{}'", fields[1]))?;
    let strand = match fields[2] {
        "0" => Strand::Plus,
        "1" => Strand::Minus,
        other => return Err(format!("invalid strand '{}', expected 0 or 1", other)),
    };
    let weight: f64 = fields[3]
        .parse()
        .map_err(|_| format!("invalid tag count '{}'", fields[3]))?;
    let length: i64 = fields[4]
        .parse()
        .map_err(|_| format!("invalid tag length '{}'", fields[4]))?;

    let (start, end) = match strand {
        Strand::Plus => (position - 1, position - 1 + length),
        Strand::Minus => (position - length, position),
    };
    Ok(IntervalRecord::new(fields[0], start, end, Some(strand)).with_weight(weight))
}

/// Streaming reader of one tag file
pub struct TagReader<R: BufRead> {
    lines: RecordLines<R>,
}

impl TagReader<Box<dyn BufRead + Send>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { lines: RecordLines::open(path, "tags")? })
    }
}

impl<R: BufRead> TagReader<R> {
    pub fn new(reader: R, path: impl Into<String>) -> Self {
        Self {
            lines: RecordLines::new(reader, "tags", path),
        }
    }
}

impl<R: BufRead> Iterator for TagReader<R> {
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

/// Every record of every tag file in a directory, file by file
pub fn read_tag_directory<P: AsRef<Path>>(dir: P) -> Result<impl Iterator<Item = Result<IntervalRecord>>> {
    let files = tag_files(dir.as_ref())?;
    log::debug!("{} tag files in {}", files.len(), dir.as_ref().display());
    Ok(files.into_iter().flat_map(|path| {
        let reader: Box<dyn Iterator<Item = Result<IntervalRecord>>> = match TagReader::open(&path) {
            Ok(reader) => {
                log::debug!("Processing tag file {}", path.display());
                Box::new(reader)
            }
            Err(e) => Box::new(std::iter::once(Err(e))),
        };
        reader
    }))
}
