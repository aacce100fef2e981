//! Error types for the pileup engine
//!
//! Data-integrity, estimation and worker-pool failures are fatal and surface
//! here. Coverage gaps (unknown chromosomes in records, chains or mapping
//! tables) are not errors; they are collected into the per-operation reports.

use crate::core::chain::ChainParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller addressed a chromosome the assembly does not declare
    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    /// Two tables (or a table and an array) disagree on a chromosome length
    #[error("Shape mismatch on {chrom}: {left} vs {right}")]
    ShapeMismatch {
        chrom: String,
        left: usize,
        right: usize,
    },

    /// Stranded operation on an unstranded table or vice versa
    #[error("Layout mismatch: expected {expected}, found {found}")]
    LayoutMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A record position falls outside [0, chromosome length)
    #[error("Position out of bounds on {chrom}: [{start}, {end}) exceeds length {length}")]
    OutOfBounds {
        chrom: String,
        start: i64,
        end: i64,
        length: usize,
    },

    /// Chain header size disagrees with the table's declared chromosome length
    #[error("Chain {chain_id} declares {side} chromosome {chrom} with size {declared}, table has {actual}")]
    ChainSizeMismatch {
        chain_id: String,
        side: &'static str,
        chrom: String,
        declared: u64,
        actual: usize,
    },

    /// Mapping-table row without insertion markers but with unequal fragment lengths
    #[error("Mapping table line {line}: source fragment is {source_len} bp, destination fragment is {destination_len} bp")]
    FragmentSizeMismatch {
        line: usize,
        source_len: usize,
        destination_len: usize,
    },

    /// Cross-correlation curve has no falling zero crossing in the search window
    #[error("No fragment size found between {search_start} and {search_end} bp")]
    NoFragmentSizeFound {
        search_start: usize,
        search_end: usize,
    },

    /// Caller supplied an unusable parameter combination
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The worker pool was interrupted
    #[error("Operation cancelled")]
    Cancelled,

    /// A unit of work panicked inside the pool
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// A read-write mapping of this file is already held by another track
    #[error("File is already mapped read-write: {0}")]
    AlreadyMapped(PathBuf),

    /// Persisted array element type differs from the requested one
    #[error("Element type mismatch in {path}: expected {expected}, found {found}")]
    DtypeMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// Malformed record in an input file
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Chain file parsing errors
    #[error("Chain parse error: {0}")]
    ChainParse(#[from] ChainParseError),

    /// Array (de)serialization errors
    #[error("Array file error in {path}: {message}")]
    Npy { path: PathBuf, message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A malformed line in a record-oriented input
#[derive(Debug, Error)]
#[error("{format} record error at {path}:{line}: {message}")]
pub struct RecordError {
    pub format: &'static str,
    pub path: String,
    pub line: usize,
    pub message: String,
}

impl RecordError {
    pub fn new(
        format: &'static str,
        path: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            format,
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

impl EngineError {
    /// Build an [`EngineError::Npy`] from any ndarray-npy error
    pub fn npy(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        EngineError::Npy {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// True for errors that indicate internally inconsistent inputs
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            EngineError::OutOfBounds { .. }
                | EngineError::ChainSizeMismatch { .. }
                | EngineError::FragmentSizeMismatch { .. }
                | EngineError::ShapeMismatch { .. }
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
