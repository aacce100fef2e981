//! Wiggle/BigWig format adapter
//!
//! Imports `variableStep`, `fixedStep` and bedGraph-style lines into an
//! unstranded table, exports a table as `fixedStep` or `variableStep` WIG,
//! and imports BigWig files through bigtools.
//!
//! WIG positions are 1-based; bedGraph lines are 0-based half-open. Every
//! [`WigDataPoint`] is 0-based half-open.

use crate::core::dialect::{natural_sort, ChromDialect};
use crate::core::element::Element;
use crate::core::io::{create_text, RecordLines};
use crate::core::{EngineError, Layout, RecordError, Result, SignalTable};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::Path;

/// Wiggle parsing error
#[derive(Debug, Clone, thiserror::Error)]
pub enum WigParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Missing chrom parameter")]
    MissingChrom,

    #[error("Missing start parameter")]
    MissingStart,

    #[error("Data line before any declaration")]
    NoDeclaration,
}

/// Wiggle format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WigFormat {
    VariableStep,
    FixedStep,
}

impl WigFormat {
    pub fn keyword(&self) -> &'static str {
        match self {
            WigFormat::VariableStep => "variableStep",
            WigFormat::FixedStep => "fixedStep",
        }
    }
}

impl std::str::FromStr for WigFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixedStep" | "fixed" => Ok(WigFormat::FixedStep),
            "variableStep" | "variable" => Ok(WigFormat::VariableStep),
            other => Err(EngineError::InvalidParameter(format!(
                "unknown WIG style '{}', expected fixedStep or variableStep",
                other
            ))),
        }
    }
}

/// Wiggle declaration line parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WigDeclaration {
    pub format: WigFormat,
    pub chrom: String,
    pub span: u64,
    /// 1-based first position, `fixedStep` only
    pub start: Option<u64>,
    /// `fixedStep` only; defaults to 1
    pub step: Option<u64>,
}

impl WigDeclaration {
    /// Parse a declaration line (variableStep or fixedStep)
    pub fn parse(line: &str) -> std::result::Result<Self, WigParseError> {
        let line = line.trim();

        let (format, rest) = if let Some(rest) = line.strip_prefix("variableStep") {
            (WigFormat::VariableStep, rest)
        } else if let Some(rest) = line.strip_prefix("fixedStep") {
            (WigFormat::FixedStep, rest)
        } else {
            return Err(WigParseError::InvalidFormat(
                "Expected variableStep or fixedStep".to_string(),
            ));
        };

        let number = |key: &str, value: &str| -> std::result::Result<u64, WigParseError> {
            value
                .parse()
                .map_err(|_| WigParseError::InvalidNumber(format!("{}: {}", key, value)))
        };

        let mut chrom = None;
        let mut span = 1u64;
        let mut start = None;
        let mut step = None;

        for part in rest.split_whitespace() {
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "chrom" => chrom = Some(value.to_string()),
                    "span" => span = number(key, value)?,
                    "start" => start = Some(number(key, value)?),
                    "step" => step = Some(number(key, value)?),
                    _ => {}
                }
            }
        }

        let chrom = chrom.ok_or(WigParseError::MissingChrom)?;
        if format == WigFormat::FixedStep && start.is_none() {
            return Err(WigParseError::MissingStart);
        }
        if span == 0 {
            return Err(WigParseError::InvalidNumber("span: 0".to_string()));
        }

        Ok(Self {
            format,
            chrom,
            span,
            start,
            step,
        })
    }
}

/// A single Wiggle data point
#[derive(Debug, Clone, PartialEq)]
pub struct WigDataPoint {
    pub chrom: String,
    /// 0-based
    pub start: u64,
    /// 0-based, exclusive
    pub end: u64,
    pub value: f64,
}

/// Parse a Wiggle file and yield data points
pub struct WigReader<R: BufRead> {
    lines: RecordLines<R>,
    current_decl: Option<WigDeclaration>,
    /// 0-based position of the next fixedStep value
    current_pos: u64,
}

impl WigReader<Box<dyn BufRead + Send>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_lines(RecordLines::open(path, "WIG")?))
    }
}

impl<R: BufRead> WigReader<R> {
    pub fn new(reader: R, path: impl Into<String>) -> Self {
        Self::with_lines(RecordLines::new(reader, "WIG", path))
    }

    fn with_lines(lines: RecordLines<R>) -> Self {
        Self {
            lines,
            current_decl: None,
            current_pos: 0,
        }
    }

    fn parse_data(&mut self, line: &str) -> std::result::Result<WigDataPoint, WigParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 4 {
            if let (Ok(start), Ok(end), Ok(value)) =
                (parts[1].parse::<u64>(), parts[2].parse::<u64>(), parts[3].parse::<f64>())
            {
                return Ok(WigDataPoint {
                    chrom: parts[0].to_string(),
                    start,
                    end,
                    value,
                });
            }
        }

        let decl = self.current_decl.as_ref().ok_or(WigParseError::NoDeclaration)?;
        match decl.format {
            WigFormat::VariableStep => {
                if parts.len() != 2 {
                    return Err(WigParseError::InvalidFormat(format!(
                        "Expected position and value: {}",
                        line
                    )));
                }
                let pos: u64 = parts[0]
                    .parse()
                    .map_err(|_| WigParseError::InvalidNumber(parts[0].to_string()))?;
                if pos == 0 {
                    return Err(WigParseError::InvalidNumber("position 0 in 1-based WIG".to_string()));
                }
                let value: f64 = parts[1]
                    .parse()
                    .map_err(|_| WigParseError::InvalidNumber(parts[1].to_string()))?;
                Ok(WigDataPoint {
                    chrom: decl.chrom.clone(),
                    start: pos - 1,
                    end: pos - 1 + decl.span,
                    value,
                })
            }
            WigFormat::FixedStep => {
                if parts.len() != 1 {
                    return Err(WigParseError::InvalidFormat(format!("Expected a single value: {}", line)));
                }
                let value: f64 = parts[0]
                    .parse()
                    .map_err(|_| WigParseError::InvalidNumber(parts[0].to_string()))?;
                let start = self.current_pos;
                self.current_pos += decl.step.unwrap_or(1);
                Ok(WigDataPoint {
                    chrom: decl.chrom.clone(),
                    start,
                    end: start + decl.span,
                    value,
                })
            }
        }
    }
}

impl<R: BufRead> Iterator for WigReader<R> {
    type Item = Result<WigDataPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next_text()? {
                Err(e) => return Some(Err(e)),
                Ok(line) => line.trim().to_string(),
            };

            if line.is_empty() || line.starts_with('#') || line.starts_with("track") || line.starts_with("browser") {
                continue;
            }

            let parsed = if line.starts_with("variableStep") || line.starts_with("fixedStep") {
                match WigDeclaration::parse(&line) {
                    Ok(decl) => {
                        if let Some(start) = decl.start {
                            self.current_pos = start.saturating_sub(1);
                        }
                        self.current_decl = Some(decl);
                        continue;
                    }
                    Err(e) => Err(e),
                }
            } else {
                self.parse_data(&line)
            };

            return Some(parsed.map_err(|e| self.lines.error(e)));
        }
    }
}

/// Outcome of a value import
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueImportReport {
    /// Data points written into the table
    pub points: usize,
    /// Positions assigned (overlaps counted twice)
    pub populated: usize,
    /// Chromosomes present in the input but not in the table
    pub missing_chromosomes: BTreeSet<String>,
}

/// Assign data points to an unstranded table
///
/// Each point overwrites `[start, end)` with its value; an end past the
/// chromosome is clipped, a start past it is `OutOfBounds`.
pub fn assign_points<T, I>(table: &mut SignalTable<T>, points: I) -> Result<ValueImportReport>
where
    T: Element,
    I: IntoIterator<Item = Result<WigDataPoint>>,
{
    table.require(Layout::Unstranded)?;
    let mut report = ValueImportReport::default();

    for point in points {
        let point = point?;
        if !table.contains(&point.chrom) {
            report.missing_chromosomes.insert(point.chrom);
            continue;
        }
        let values = table.channel_mut(&point.chrom, None)?;
        let len = values.len();
        if point.start >= len as u64 || point.end < point.start {
            return Err(EngineError::OutOfBounds {
                chrom: point.chrom,
                start: point.start as i64,
                end: point.end as i64,
                length: len,
            });
        }
        let start = point.start as usize;
        let end = (point.end as usize).min(len);
        values[start..end].fill(T::from_f64(point.value));
        report.points += 1;
        report.populated += end - start;
    }

    if !report.missing_chromosomes.is_empty() {
        log::warn!(
            "{} chromosomes not present in {}: {}",
            report.missing_chromosomes.len(),
            table.name(),
            report.missing_chromosomes.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(report)
}

/// Populate an unstranded table from a WIG or bedGraph file
pub fn import_wig<T: Element, P: AsRef<Path>>(table: &mut SignalTable<T>, path: P) -> Result<ValueImportReport> {
    let start_time = std::time::Instant::now();
    log::info!("Populating {} from WIG file {}", table.name(), path.as_ref().display());
    let report = assign_points(table, WigReader::open(path.as_ref())?)?;
    log::info!(
        "{} values added ({:.4} of genome, assuming no overlaps) in {:.2}s",
        report.populated,
        report.populated as f64 / table.genome_size().max(1) as f64,
        start_time.elapsed().as_secs_f64()
    );
    Ok(report)
}

/// Write an unstranded table as WIG
///
/// Each chromosome with any nonzero value gets one declaration covering the
/// span from its first to its last nonzero position; chromosomes are written
/// in natural order and renamed into `dialect`. Returns the number of data
/// lines written.
pub fn export_wig<T: Element, P: AsRef<Path>>(
    table: &SignalTable<T>,
    path: P,
    style: WigFormat,
    description: &str,
    dialect: ChromDialect,
) -> Result<usize> {
    table.require(Layout::Unstranded)?;
    let start_time = std::time::Instant::now();
    let mut out = create_text(path.as_ref())?;
    writeln!(
        out,
        "track type=wiggle_0 name={} description={}",
        table.name().replace(' ', "_"),
        description.replace(' ', "_")
    )?;

    let mut chroms: Vec<&str> = table.chromosomes().collect();
    natural_sort(&mut chroms);

    let mut written = 0usize;
    for chrom in chroms {
        let values = table.channel(chrom, None)?;
        let first = values.iter().position(|v| v.to_f64() != 0.0);
        let last = values.iter().rposition(|v| v.to_f64() != 0.0);
        let (first, last) = match (first, last) {
            (Some(f), Some(l)) => (f, l),
            _ => {
                log::debug!("No non-zero entries for {} of length {}", chrom, values.len());
                continue;
            }
        };
        log::debug!("Non-zero region of {}: {}-{}", chrom, first, last);

        let name = dialect.translate(chrom);
        match style {
            WigFormat::FixedStep => {
                writeln!(out, "fixedStep chrom={} start={} step=1", name, first + 1)?;
                for v in &values[first..=last] {
                    writeln!(out, "{}", v.to_f64())?;
                }
            }
            WigFormat::VariableStep => {
                writeln!(out, "variableStep chrom={}", name)?;
                for (pos, v) in values[first..=last].iter().enumerate() {
                    writeln!(out, "{} {}", first + pos + 1, v.to_f64())?;
                }
            }
        }
        written += last - first + 1;
    }
    out.flush()?;
    log::info!(
        "Wrote {} WIG lines to {} in {:.2}s",
        written,
        path.as_ref().display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(written)
}

/// BigWig support module
pub mod bigwig {
    use super::*;
    use bigtools::BigWigRead;

    /// Read intervals from a BigWig file
    pub fn read_bigwig_intervals<P: AsRef<Path>>(path: P) -> Result<Vec<WigDataPoint>> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| EngineError::InvalidParameter(format!("non UTF-8 path {}", path.display())))?;
        let bigwig_error = |e: &dyn std::fmt::Display| -> EngineError {
            RecordError::new("BigWig", path_str.to_string(), 0, e.to_string()).into()
        };

        let mut reader = BigWigRead::open_file(path_str).map_err(|e| bigwig_error(&e))?;
        let chroms = reader.chroms().to_vec();
        let mut points = Vec::new();

        for chrom_info in chroms {
            let intervals = reader
                .get_interval(&chrom_info.name, 0, chrom_info.length)
                .map_err(|e| bigwig_error(&e))?;
            for interval in intervals {
                let interval = interval.map_err(|e| bigwig_error(&e))?;
                points.push(WigDataPoint {
                    chrom: chrom_info.name.clone(),
                    start: interval.start as u64,
                    end: interval.end as u64,
                    value: interval.value as f64,
                });
            }
        }

        Ok(points)
    }

    /// Populate an unstranded table from a BigWig file
    pub fn import_bigwig<T: Element, P: AsRef<Path>>(
        table: &mut SignalTable<T>,
        path: P,
    ) -> Result<ValueImportReport> {
        log::info!("Populating {} from BigWig file {}", table.name(), path.as_ref().display());
        let points = read_bigwig_intervals(path)?;
        assign_points(table, points.into_iter().map(Ok))
    }
}
