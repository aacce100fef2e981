//! File format adapters
//!
//! Readers for the record sources (BED-like intervals, bowtie alignment
//! summaries, tag directories), value sources (WIG/bedGraph, BigWig) and
//! synteny mapping tables. Every record reader yields [`IntervalRecord`]s
//! in half-open, 0-based coordinates.

pub mod bed;
pub mod bowtie;
pub mod mapping_table;
pub mod tags;
pub mod wig;

use crate::core::Strand;

/// One aligned read or region
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalRecord {
    /// Chromosome name as written in the input
    pub chrom: String,
    /// 0-based inclusive start
    pub start: i64,
    /// 0-based exclusive end
    pub end: i64,
    pub strand: Option<Strand>,
    pub weight: f64,
}

impl IntervalRecord {
    pub fn new(chrom: impl Into<String>, start: i64, end: i64, strand: Option<Strand>) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            strand,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

pub use bed::BedReader;
pub use bowtie::BowtieReader;
pub use mapping_table::{MappingRow, MappingTableReader};
pub use tags::{tag_files, TagReader};
pub use wig::{WigDataPoint, WigReader};
