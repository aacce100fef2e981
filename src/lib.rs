//! pileup-engine - per-base genomic signal pileups
//!
//! Turns aligned sequencing reads into dense per-chromosome, per-strand
//! signal tracks, transforms them, estimates fragment length from the
//! signal itself and lifts tracks between assemblies.
//!
//! # Features
//!
//! - Parallel, payload-bounded chunk processing on a rayon worker pool
//! - `.npy` persistence with memory-mapped loading
//! - FFT cross-correlation fragment-size estimation
//! - Chain-file and mapping-table liftover (gzip/bzip2 chains accepted)
//!
//! # Example
//!
//! ```ignore
//! use pileup_engine::core::{Assembly, ChromDialect, EngineConfig, Layout, SignalTable, WorkerPool};
//! use pileup_engine::engine::{fragsize, ingest, transform};
//!
//! let config = EngineConfig::default();
//! let pool = WorkerPool::new(config.threads)?;
//! let assembly = Assembly::load_sizes("hg38", "hg38.chrom.sizes", &ChromDialect::Ucsc)?;
//!
//! let mut starts = SignalTable::<f32>::create("rep1_starts", &assembly, ChromDialect::Ucsc, Layout::Stranded);
//! let options = ingest::IngestOptions::new(ingest::RegionHandling::Starts);
//! ingest::load_bed(&mut starts, "rep1.bed.gz", &options, &pool, &config)?;
//!
//! let estimate = fragsize::estimate_fragment_size(&starts, &Default::default(), &pool, &config)?;
//! let fragments = transform::fragment_extend(&starts, estimate.fragment_length, &pool, &config)?;
//! ```

pub mod core;
pub mod engine;
pub mod formats;

pub use core::{
    AnySignalTable, Assembly, CancellationToken, Chain, ChainParseError, ChromDialect, EngineConfig, EngineError,
    Layout, Result, SignalTable, Strand, TableMeta, WorkerPool,
};
pub use formats::IntervalRecord;
