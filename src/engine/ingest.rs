//! Signal ingestion
//!
//! Streams interval records into a table. Unknown chromosomes are collected
//! and skipped; positions outside the chromosome abort the ingest. Increments
//! are gathered per chromosome on the calling thread, then turned into dense
//! per-chromosome deltas on the worker pool and added to the table.

use crate::core::element::Element;
use crate::core::{EngineConfig, EngineError, Result, SignalTable, Strand, WorkerPool, POLL_STRIDE};
use crate::formats::bed::BedReader;
use crate::formats::bowtie::BowtieReader;
use crate::formats::tags::read_tag_directory;
use crate::formats::IntervalRecord;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

/// Which positions of a record receive its weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionHandling {
    /// Every position of `[start, end)`
    #[default]
    Whole,
    /// The 5' end: `start` on `+`, `end - 1` on `-`
    Starts,
    /// The 3' end: `end - 1` on `+`, `start` on `-`
    Ends,
}

impl FromStr for RegionHandling {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whole" => Ok(RegionHandling::Whole),
            "starts" => Ok(RegionHandling::Starts),
            "ends" => Ok(RegionHandling::Ends),
            other => Err(EngineError::InvalidParameter(format!(
                "unknown region handling '{}', expected whole, starts or ends",
                other
            ))),
        }
    }
}

/// What to do with a record that has no strand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrandlessPolicy {
    #[default]
    Reject,
    AssumePlus,
}

/// Per-call ingest settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestOptions {
    pub region_handling: RegionHandling,
    pub strandless: StrandlessPolicy,
    /// Unstranded tables only: `+` records move by `-shift`, `-` records by `+shift`
    pub strand_shift: i64,
}

impl IngestOptions {
    pub fn new(region_handling: RegionHandling) -> Self {
        Self {
            region_handling,
            ..Self::default()
        }
    }

    pub fn with_strandless(mut self, policy: StrandlessPolicy) -> Self {
        self.strandless = policy;
        self
    }

    pub fn with_strand_shift(mut self, shift: i64) -> Self {
        self.strand_shift = shift;
        self
    }
}

/// Outcome of one ingest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Records written into the table
    pub records: usize,
    /// Records skipped because their chromosome is unknown
    pub skipped: usize,
    /// Records clamped to the chromosome after a strand shift
    pub clamped: usize,
    pub missing_chromosomes: BTreeSet<String>,
}

struct Increment {
    channel: usize,
    start: usize,
    end: usize,
    weight: f64,
}

/// Length histogram with weighted counts
#[derive(Debug, Default)]
struct ReadLengths {
    total_reads: f64,
    total_length: f64,
    histogram: BTreeMap<usize, f64>,
}

impl ReadLengths {
    fn add(&mut self, len: usize, weight: f64) {
        self.total_reads += weight;
        self.total_length += weight * len as f64;
        *self.histogram.entry(len).or_insert(0.0) += weight;
    }

    /// Most frequent length; the shortest wins ties
    fn mode(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (&len, &count) in &self.histogram {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((len, count));
            }
        }
        best.map(|(len, _)| len)
    }
}

/// Stream `records` into `table`
pub fn ingest_records<T, I>(
    table: &mut SignalTable<T>,
    records: I,
    options: &IngestOptions,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<IngestReport>
where
    T: Element,
    I: IntoIterator<Item = Result<IntervalRecord>>,
{
    let start_time = Instant::now();
    let stranded = table.layout().is_stranded();
    let mut report = IngestReport::default();
    let mut lengths = ReadLengths::default();
    let mut increments: HashMap<String, Vec<Increment>> = HashMap::new();

    for record in records {
        let record = record?;
        let seen = report.records + report.skipped;
        if seen > 0 && seen % config.report_interval == 0 {
            pool.token().check()?;
            log::info!("Processed {} records", seen);
        }

        let chrom = match table.resolve(&record.chrom) {
            Ok(name) => name,
            Err(_) => {
                report.skipped += 1;
                report.missing_chromosomes.insert(record.chrom);
                continue;
            }
        };
        let len = table.chrom_len(&chrom)?;
        if record.start < 0 || record.start >= len as i64 || record.end > len as i64 || record.end <= record.start {
            return Err(EngineError::OutOfBounds {
                chrom: record.chrom,
                start: record.start,
                end: record.end,
                length: len,
            });
        }
        let strand = match (record.strand, options.strandless) {
            (Some(s), _) => s,
            (None, StrandlessPolicy::AssumePlus) => Strand::Plus,
            (None, StrandlessPolicy::Reject) => {
                return Err(EngineError::InvalidParameter(format!(
                    "record {}:{}-{} has no strand",
                    record.chrom, record.start, record.end
                )))
            }
        };

        let (mut start, mut end) = match (options.region_handling, strand) {
            (RegionHandling::Whole, _) => (record.start, record.end),
            (RegionHandling::Starts, Strand::Plus) | (RegionHandling::Ends, Strand::Minus) => {
                (record.start, record.start + 1)
            }
            (RegionHandling::Starts, Strand::Minus) | (RegionHandling::Ends, Strand::Plus) => {
                (record.end - 1, record.end)
            }
        };

        let channel = if stranded {
            strand.index()
        } else {
            if options.strand_shift != 0 {
                let shift = -strand.signed() * options.strand_shift;
                let (shifted_start, shifted_end) = (start + shift, end + shift);
                start = shifted_start.clamp(0, len as i64 - 1);
                end = shifted_end.clamp(start + 1, len as i64);
                if (start, end) != (shifted_start, shifted_end) {
                    report.clamped += 1;
                }
            }
            0
        };

        lengths.add(record.len() as usize, record.weight);
        increments.entry(chrom).or_default().push(Increment {
            channel,
            start: start as usize,
            end: end as usize,
            weight: record.weight,
        });
        report.records += 1;
    }

    let channels = table.layout().channels();
    let tasks: Vec<(String, usize, Vec<Increment>)> = increments
        .into_iter()
        .map(|(chrom, incs)| {
            let len = table.chrom_len(&chrom)?;
            Ok((chrom, len, incs))
        })
        .collect::<Result<_>>()?;

    let deltas = pool.run_sized(
        tasks,
        |(_, len, _)| *len,
        |(chrom, len, incs)| {
            let mut diffs = vec![vec![0.0f64; len + 1]; channels];
            for (i, inc) in incs.iter().enumerate() {
                if i % POLL_STRIDE == 0 {
                    pool.token().check()?;
                }
                diffs[inc.channel][inc.start] += inc.weight;
                diffs[inc.channel][inc.end] -= inc.weight;
            }
            for diff in diffs.iter_mut() {
                let mut running = 0.0;
                for v in diff.iter_mut() {
                    running += *v;
                    *v = running;
                }
                diff.truncate(len);
            }
            Ok((chrom, diffs))
        },
    )?;

    for (chrom, diffs) in deltas {
        for (track, delta) in table.tracks_of_mut(&chrom)?.iter_mut().zip(diffs) {
            for (value, d) in track.as_mut_slice().iter_mut().zip(delta) {
                if d != 0.0 {
                    *value = T::from_f64(value.to_f64() + d);
                }
            }
        }
    }

    let meta = table.meta_mut();
    meta.total_reads += lengths.total_reads;
    meta.total_read_length += lengths.total_length;
    meta.mean_read_length = if meta.total_reads > 0.0 {
        meta.total_read_length / meta.total_reads
    } else {
        0.0
    };
    if let Some(mode) = lengths.mode() {
        meta.mode_read_length = Some(mode);
    }
    table.update_coverage();

    log::info!(
        "Ingested {} records into {} in {:.2}s (coverage {:.4})",
        report.records,
        table.name(),
        start_time.elapsed().as_secs_f64(),
        table.meta().coverage
    );
    if report.skipped > 0 {
        log::warn!(
            "Skipped {} records on {} chromosomes not in {}: {}",
            report.skipped,
            report.missing_chromosomes.len(),
            table.assembly().name,
            report.missing_chromosomes.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if report.clamped > 0 {
        log::warn!("{} shifted records clamped to their chromosome", report.clamped);
    }
    Ok(report)
}

/// Ingest a (possibly compressed) BED-like interval file
pub fn load_bed<T: Element, P: AsRef<Path>>(
    table: &mut SignalTable<T>,
    path: P,
    options: &IngestOptions,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<IngestReport> {
    log::info!("Populating {} from BED file {}", table.name(), path.as_ref().display());
    ingest_records(table, BedReader::open(path)?, options, pool, config)
}

/// Ingest a bowtie alignment-summary file
pub fn load_bowtie<T: Element, P: AsRef<Path>>(
    table: &mut SignalTable<T>,
    path: P,
    options: &IngestOptions,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<IngestReport> {
    log::info!("Populating {} from bowtie file {}", table.name(), path.as_ref().display());
    ingest_records(table, BowtieReader::open(path)?, options, pool, config)
}

/// Ingest every `*.tags.tsv` file of a tag directory
pub fn load_tag_directory<T: Element, P: AsRef<Path>>(
    table: &mut SignalTable<T>,
    dir: P,
    options: &IngestOptions,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<IngestReport> {
    log::info!("Populating {} from tag directory {}", table.name(), dir.as_ref().display());
    ingest_records(table, read_tag_directory(dir)?, options, pool, config)
}
