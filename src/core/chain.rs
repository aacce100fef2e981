//! Chain file parsing
//!
//! Parses UCSC chain format files used for liftover.
//!
//! # Chain File Format
//!
//! ```text
//! chain score tName tSize tStrand tStart tEnd qName qSize qStrand qStart qEnd id
//! size dt dq
//! size dt dq
//! size
//! ```
//!
//! The `t` side is the reference assembly (where signal is written) and the
//! `q` side is the query assembly (where signal is read from). Each data line
//! is an ungapped block of `size` bases followed by a gap of `dt` bases on
//! the reference and `dq` bases on the query.

use crate::core::io::open_text;
use crate::core::strand::Strand;
use std::io::BufRead;
use std::path::Path;

/// Error type for chain file parsing
#[derive(Debug, Clone)]
pub struct ChainParseError {
    pub message: String,
    /// 1-based line number
    pub line_number: Option<usize>,
    pub kind: ChainParseErrorKind,
    /// The offending line, truncated
    pub content: Option<String>,
}

/// Specific kinds of chain parsing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainParseErrorKind {
    InvalidHeader,
    /// Data line with a field count other than 1 or 3, or a zero block size
    InvalidDataLine,
    InvalidStrand,
    InvalidNumber,
    /// Data line before any header
    OrphanDataLine,
    /// The gaps walk past the end declared in the header
    InvalidCoordinates,
    IoError,
}

impl std::fmt::Display for ChainParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line_number {
            Some(line) => write!(f, "Line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ChainParseError {}

impl ChainParseError {
    pub fn with_context(
        message: impl Into<String>,
        line_number: usize,
        kind: ChainParseErrorKind,
        content: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            line_number: Some(line_number),
            kind,
            content,
        }
    }

    pub fn invalid_header(message: impl Into<String>, line_number: usize, content: &str) -> Self {
        Self::with_context(
            message,
            line_number,
            ChainParseErrorKind::InvalidHeader,
            Some(content.chars().take(100).collect()),
        )
    }

    pub fn invalid_data_line(message: impl Into<String>, line_number: usize, content: &str) -> Self {
        Self::with_context(
            message,
            line_number,
            ChainParseErrorKind::InvalidDataLine,
            Some(content.chars().take(100).collect()),
        )
    }

    pub fn invalid_strand(strand: &str, line_number: usize) -> Self {
        Self::with_context(
            format!("Invalid strand '{}', expected '+' or '-'", strand),
            line_number,
            ChainParseErrorKind::InvalidStrand,
            None,
        )
    }

    pub fn invalid_number(field: &str, value: &str, line_number: usize) -> Self {
        Self::with_context(
            format!("Invalid {} value '{}': expected a non-negative integer", field, value),
            line_number,
            ChainParseErrorKind::InvalidNumber,
            None,
        )
    }

    pub fn invalid_coordinates(message: impl Into<String>, line_number: usize) -> Self {
        Self::with_context(message, line_number, ChainParseErrorKind::InvalidCoordinates, None)
    }

    pub fn is_kind(&self, kind: ChainParseErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<std::io::Error> for ChainParseError {
    fn from(e: std::io::Error) -> Self {
        Self {
            message: format!("IO error: {}", e),
            line_number: None,
            kind: ChainParseErrorKind::IoError,
            content: None,
        }
    }
}

fn parse_u64(field: &str, value: &str, line_number: usize) -> Result<u64, ChainParseError> {
    value
        .parse::<u64>()
        .map_err(|_| ChainParseError::invalid_number(field, value, line_number))
}

fn parse_strand(value: &str, line_number: usize) -> Result<Strand, ChainParseError> {
    Strand::from_field(value).ok_or_else(|| ChainParseError::invalid_strand(value, line_number))
}

/// Parsed chain header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHeader {
    pub score: u64,
    pub reference_name: String,
    pub reference_size: u64,
    pub reference_strand: Strand,
    pub reference_start: u64,
    pub reference_end: u64,
    pub query_name: String,
    pub query_size: u64,
    pub query_strand: Strand,
    pub query_start: u64,
    pub query_end: u64,
    pub chain_id: String,
}

impl ChainHeader {
    /// Parse a header line
    ///
    /// `start`/`end` on a `-` side are coordinates on the reverse strand, as
    /// in the UCSC format.
    pub fn parse(line: &str, line_number: usize) -> Result<Self, ChainParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields.len() < 12 {
            return Err(ChainParseError::invalid_header(
                format!("Expected 12+ fields, got {}", fields.len()),
                line_number,
                line,
            ));
        }
        if fields[0] != "chain" {
            return Err(ChainParseError::invalid_header(
                format!("Expected 'chain' keyword, got '{}'", fields[0]),
                line_number,
                line,
            ));
        }

        let header = Self {
            score: fields[1]
                .parse::<f64>()
                .ok()
                .filter(|s| *s >= 0.0)
                .map(|s| s as u64)
                .ok_or_else(|| ChainParseError::invalid_number("score", fields[1], line_number))?,
            reference_name: fields[2].to_string(),
            reference_size: parse_u64("reference size", fields[3], line_number)?,
            reference_strand: parse_strand(fields[4], line_number)?,
            reference_start: parse_u64("reference start", fields[5], line_number)?,
            reference_end: parse_u64("reference end", fields[6], line_number)?,
            query_name: fields[7].to_string(),
            query_size: parse_u64("query size", fields[8], line_number)?,
            query_strand: parse_strand(fields[9], line_number)?,
            query_start: parse_u64("query start", fields[10], line_number)?,
            query_end: parse_u64("query end", fields[11], line_number)?,
            chain_id: fields.get(12).map(|s| s.to_string()).unwrap_or_default(),
        };

        for (side, start, end, size) in [
            ("Reference", header.reference_start, header.reference_end, header.reference_size),
            ("Query", header.query_start, header.query_end, header.query_size),
        ] {
            if start > end {
                return Err(ChainParseError::invalid_coordinates(
                    format!("{} start ({}) > {} end ({})", side, start, side.to_lowercase(), end),
                    line_number,
                ));
            }
            if end > size {
                return Err(ChainParseError::invalid_coordinates(
                    format!("{} end ({}) > {} size ({})", side, end, side.to_lowercase(), size),
                    line_number,
                ));
            }
        }

        Ok(header)
    }

    /// Aligned span on the reference side
    pub fn reference_span(&self) -> u64 {
        self.reference_end - self.reference_start
    }

    /// Aligned span on the query side
    pub fn query_span(&self) -> u64 {
        self.query_end - self.query_start
    }
}

/// One data line: an ungapped block followed by gaps on both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStep {
    pub size: u64,
    pub reference_gap: u64,
    pub query_gap: u64,
}

impl ChainStep {
    /// Parse a data line (3 fields, or 1 field for the last line of a chain)
    pub fn parse(line: &str, line_number: usize) -> Result<Self, ChainParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (size, reference_gap, query_gap) = match fields.len() {
            1 => (parse_u64("block size", fields[0], line_number)?, 0, 0),
            3 => (
                parse_u64("block size", fields[0], line_number)?,
                parse_u64("reference gap (dt)", fields[1], line_number)?,
                parse_u64("query gap (dq)", fields[2], line_number)?,
            ),
            n => {
                return Err(ChainParseError::invalid_data_line(
                    format!("Expected 1 or 3 fields, got {}", n),
                    line_number,
                    line,
                ))
            }
        };
        if size == 0 {
            return Err(ChainParseError::invalid_data_line(
                "Block size must be greater than 0",
                line_number,
                line,
            ));
        }
        Ok(Self {
            size,
            reference_gap,
            query_gap,
        })
    }
}

/// A contiguous aligned block in forward-strand coordinates
///
/// When `orientation` is `Minus`, position `reference_start + i` aligns to
/// position `query_end - 1 - i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub reference_chrom: String,
    pub reference_start: u64,
    pub reference_end: u64,
    pub query_chrom: String,
    pub query_start: u64,
    pub query_end: u64,
    pub orientation: Strand,
}

impl ChainBlock {
    pub fn len(&self) -> u64 {
        self.reference_end - self.reference_start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One chain: header plus its steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub header: ChainHeader,
    pub steps: Vec<ChainStep>,
}

fn forward(strand: Strand, size: u64, pos: u64, len: u64) -> (u64, u64) {
    match strand {
        Strand::Plus => (pos, pos + len),
        Strand::Minus => (size - (pos + len), size - pos),
    }
}

impl Chain {
    /// Walk the steps, yielding aligned blocks in file order
    pub fn blocks(&self) -> impl Iterator<Item = ChainBlock> + '_ {
        let h = &self.header;
        let orientation = h.reference_strand.combine(h.query_strand);
        let mut reference_pos = h.reference_start;
        let mut query_pos = h.query_start;
        self.steps.iter().map(move |step| {
            let (reference_start, reference_end) =
                forward(h.reference_strand, h.reference_size, reference_pos, step.size);
            let (query_start, query_end) = forward(h.query_strand, h.query_size, query_pos, step.size);
            reference_pos += step.size + step.reference_gap;
            query_pos += step.size + step.query_gap;
            ChainBlock {
                reference_chrom: h.reference_name.clone(),
                reference_start,
                reference_end,
                query_chrom: h.query_name.clone(),
                query_start,
                query_end,
                orientation,
            }
        })
    }

    fn validate(&self, line_number: usize) -> Result<(), ChainParseError> {
        let h = &self.header;
        let (mut r, mut q) = (h.reference_start, h.query_start);
        for step in &self.steps {
            r += step.size;
            q += step.size;
            if r > h.reference_end || q > h.query_end {
                return Err(ChainParseError::invalid_coordinates(
                    format!("Chain {} blocks extend past the aligned span", h.chain_id),
                    line_number,
                ));
            }
            r += step.reference_gap;
            q += step.query_gap;
        }
        Ok(())
    }
}

/// Parse every chain from a reader
pub fn parse_chain_reader<R: BufRead>(reader: R) -> Result<Vec<Chain>, ChainParseError> {
    let mut chains = Vec::new();
    let mut current: Option<(Chain, usize)> = None;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            if let Some((chain, start_line)) = current.take() {
                chain.validate(start_line)?;
                chains.push(chain);
            }
            continue;
        }

        if trimmed.starts_with("chain") {
            if let Some((chain, start_line)) = current.take() {
                chain.validate(start_line)?;
                chains.push(chain);
            }
            let header = ChainHeader::parse(trimmed, line_number)?;
            current = Some((
                Chain {
                    header,
                    steps: Vec::new(),
                },
                line_number,
            ));
        } else if let Some((chain, _)) = current.as_mut() {
            chain.steps.push(ChainStep::parse(trimmed, line_number)?);
        } else {
            return Err(ChainParseError::with_context(
                "Data line outside of a chain",
                line_number,
                ChainParseErrorKind::OrphanDataLine,
                Some(trimmed.chars().take(100).collect()),
            ));
        }
    }

    if let Some((chain, start_line)) = current.take() {
        chain.validate(start_line)?;
        chains.push(chain);
    }
    Ok(chains)
}

/// Parse a chain file; gzip and bzip2 inputs are detected automatically
pub fn parse_chain_file(path: &Path) -> Result<Vec<Chain>, ChainParseError> {
    let reader = open_text(path)?;
    let chains = parse_chain_reader(reader)?;
    log::debug!("Parsed {} chains from {}", chains.len(), path.display());
    Ok(chains)
}

/// Parse chains from bytes
pub fn parse_chain_bytes(data: &[u8]) -> Result<Vec<Chain>, ChainParseError> {
    parse_chain_reader(std::io::BufReader::new(data))
}
