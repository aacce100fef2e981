//! Liftover between assemblies
//!
//! Chains: the reference side (`t*`) is the destination, the query side
//! (`q*`) the source. Every block copies `source[query range]` into
//! `destination[reference range]` on each channel; a `-` oriented block is
//! reversed and moves `+` signal to `-` and back. Later chains overwrite
//! earlier ones where they overlap.
//!
//! Mapping tables: aligned rows copy `source[source range]` into
//! `destination[destination range]` on the same chromosome name.
//!
//! Chromosomes unknown to either side are skipped and reported. Work is
//! grouped per destination chromosome and runs on the worker pool.

use crate::core::element::Element;
use crate::core::{
    parse_chain_file, Assembly, Chain, ChainBlock, ChromDialect, EngineError, Layout, Result, SignalTable, Strand,
    Track, WorkerPool, POLL_STRIDE,
};
use crate::formats::mapping_table::{MappingRow, MappingTableReader};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::Path;
use std::time::Instant;

/// Chains below any of these are ignored
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChainFilter {
    pub min_score: Option<u64>,
    pub min_query_size: Option<u64>,
    pub min_reference_size: Option<u64>,
}

impl ChainFilter {
    pub fn accepts(&self, chain: &Chain) -> bool {
        let h = &chain.header;
        self.min_score.map_or(true, |min| h.score >= min)
            && self.min_query_size.map_or(true, |min| h.query_span() >= min)
            && self.min_reference_size.map_or(true, |min| h.reference_span() >= min)
    }
}

/// Lifted table plus what could not be lifted
#[derive(Debug)]
pub struct LiftoverReport<T: Element> {
    pub table: SignalTable<T>,
    /// Blocks or rows copied
    pub blocks_copied: usize,
    /// Chains dropped by the filter
    pub filtered: usize,
    /// Chromosome names (as written in the input) unknown to either side
    pub missing: BTreeSet<String>,
}

/// Which side of the alignment the mappability table is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappabilityDirection {
    /// Count, per position of this assembly, blocks mapping from the other one
    From,
    /// Count, per position of this assembly, blocks mapping to the other one
    To,
}

impl std::str::FromStr for MappabilityDirection {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "from" => Ok(MappabilityDirection::From),
            "to" => Ok(MappabilityDirection::To),
            other => Err(EngineError::InvalidParameter(format!(
                "unknown mappability direction '{}', expected from or to",
                other
            ))),
        }
    }
}

/// One block copy into a destination chromosome
#[derive(Debug, Clone)]
struct BlockCopy {
    source_chrom: String,
    source: Range<usize>,
    destination: Range<usize>,
    reverse: bool,
}

fn check_range(chrom: &str, range: &Range<usize>, length: usize) -> Result<()> {
    if range.end > length || range.start > range.end {
        return Err(EngineError::OutOfBounds {
            chrom: chrom.to_string(),
            start: range.start as i64,
            end: range.end as i64,
            length,
        });
    }
    Ok(())
}

fn check_chain_size(chain: &Chain, side: &'static str, chrom: &str, declared: u64, actual: usize) -> Result<()> {
    if declared != actual as u64 {
        return Err(EngineError::ChainSizeMismatch {
            chain_id: chain.header.chain_id.clone(),
            side,
            chrom: chrom.to_string(),
            declared,
            actual,
        });
    }
    Ok(())
}

fn block_ranges(block: &ChainBlock) -> (Range<usize>, Range<usize>) {
    (
        block.reference_start as usize..block.reference_end as usize,
        block.query_start as usize..block.query_end as usize,
    )
}

/// Run the per-destination copy plan and assemble the lifted table
fn apply_copies<T: Element>(
    source: &SignalTable<T>,
    destination: &Assembly,
    plan: BTreeMap<String, Vec<BlockCopy>>,
    pool: &WorkerPool,
) -> Result<SignalTable<T>> {
    let mut lifted = SignalTable::<T>::create(source.name(), destination, source.dialect(), source.layout());
    let layout = source.layout();
    let tasks: Vec<(String, usize, Vec<BlockCopy>)> = plan
        .into_iter()
        .map(|(chrom, copies)| Ok((chrom.clone(), lifted.chrom_len(&chrom)?, copies)))
        .collect::<Result<_>>()?;

    let results = pool.run_sized(
        tasks,
        |(_, len, _)| *len,
        |(chrom, len, copies)| {
            let mut channels: Vec<Vec<T>> = (0..layout.channels()).map(|_| vec![T::zero(); len]).collect();
            for copy in &copies {
                pool.token().check()?;
                let inputs = source.tracks_of(&copy.source_chrom)?;
                for (out_idx, out) in channels.iter_mut().enumerate() {
                    let in_idx = if copy.reverse && layout.is_stranded() {
                        Strand::BOTH[out_idx].complement().index()
                    } else {
                        out_idx
                    };
                    let src = &inputs[in_idx].as_slice()[copy.source.clone()];
                    let dst = &mut out[copy.destination.clone()];
                    if copy.reverse {
                        for (d, s) in dst.iter_mut().zip(src.iter().rev()) {
                            *d = *s;
                        }
                    } else {
                        dst.copy_from_slice(src);
                    }
                }
            }
            log::debug!("Lifted {} blocks onto {}", copies.len(), chrom);
            Ok((chrom, channels))
        },
    )?;

    for (chrom, channels) in results {
        lifted.replace_tracks(&chrom, channels.into_iter().map(Track::from_vec).collect())?;
    }
    let meta = source.meta().clone();
    *lifted.meta_mut() = meta;
    lifted.update_coverage();
    Ok(lifted)
}

fn log_missing(what: &str, missing: &BTreeSet<String>) {
    if !missing.is_empty() {
        log::warn!(
            "{} chromosomes in {} missing from source or destination: {}",
            missing.len(),
            what,
            missing.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
}

/// Lift `source` onto `destination` with parsed chains
pub fn lift_over_chain<T: Element>(
    source: &SignalTable<T>,
    destination: &Assembly,
    chains: &[Chain],
    filter: &ChainFilter,
    pool: &WorkerPool,
) -> Result<LiftoverReport<T>> {
    let start_time = Instant::now();
    let dialect = source.dialect();
    let mut missing = BTreeSet::new();
    let mut filtered = 0usize;
    let mut blocks_copied = 0usize;
    let mut plan: BTreeMap<String, Vec<BlockCopy>> = BTreeMap::new();

    for chain in chains {
        if !filter.accepts(chain) {
            filtered += 1;
            continue;
        }
        let h = &chain.header;
        let reference = dialect.translate(&h.reference_name);
        let Ok(reference_len) = destination.length(&reference) else {
            missing.insert(h.reference_name.clone());
            continue;
        };
        let Ok(query) = source.resolve(&h.query_name) else {
            missing.insert(h.query_name.clone());
            continue;
        };
        let query_len = source.chrom_len(&query)?;
        check_chain_size(chain, "reference", &reference, h.reference_size, reference_len)?;
        check_chain_size(chain, "query", &query, h.query_size, query_len)?;

        let copies = plan.entry(reference.clone()).or_default();
        for block in chain.blocks().filter(|b| !b.is_empty()) {
            let (destination_range, source_range) = block_ranges(&block);
            check_range(&reference, &destination_range, reference_len)?;
            check_range(&query, &source_range, query_len)?;
            copies.push(BlockCopy {
                source_chrom: query.clone(),
                source: source_range,
                destination: destination_range,
                reverse: block.orientation == Strand::Minus,
            });
            blocks_copied += 1;
        }
    }

    let table = apply_copies(source, destination, plan, pool)?;
    log_missing("chains", &missing);
    log::info!(
        "Lifted {} from {} to {} with {} blocks in {:.2}s ({} chains filtered)",
        source.name(),
        source.assembly().name,
        destination.name,
        blocks_copied,
        start_time.elapsed().as_secs_f64(),
        filtered
    );
    Ok(LiftoverReport {
        table,
        blocks_copied,
        filtered,
        missing,
    })
}

/// Lift `source` onto `destination` with a (possibly compressed) chain file
pub fn lift_over_chain_file<T: Element, P: AsRef<Path>>(
    source: &SignalTable<T>,
    destination: &Assembly,
    chain_file: P,
    filter: &ChainFilter,
    pool: &WorkerPool,
) -> Result<LiftoverReport<T>> {
    log::info!("Loading chain file {}", chain_file.as_ref().display());
    let chains = parse_chain_file(chain_file.as_ref())?;
    lift_over_chain(source, destination, &chains, filter, pool)
}

fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<MappingRow>> {
    MappingTableReader::open(path)?.collect()
}

/// Lift `source` onto `destination` with a synteny mapping table
pub fn lift_over_mapping_table<T: Element, P: AsRef<Path>>(
    source: &SignalTable<T>,
    destination: &Assembly,
    table_path: P,
    pool: &WorkerPool,
) -> Result<LiftoverReport<T>> {
    let start_time = Instant::now();
    log::info!(
        "Lifting over {} to {} using {}",
        source.name(),
        destination.name,
        table_path.as_ref().display()
    );
    let dialect = source.dialect();
    let mut missing = BTreeSet::new();
    let mut skipped = 0usize;
    let mut blocks_copied = 0usize;
    let mut plan: BTreeMap<String, Vec<BlockCopy>> = BTreeMap::new();

    for row in read_rows(table_path)? {
        row.check_lengths()?;
        if !row.aligned {
            skipped += 1;
            continue;
        }
        let chrom = dialect.translate(&row.chrom);
        let (Ok(source_len), Ok(destination_len)) = (source.chrom_len(&chrom), destination.length(&chrom)) else {
            missing.insert(row.chrom.clone());
            continue;
        };
        check_range(&chrom, &row.source, source_len)?;
        check_range(&chrom, &row.destination, destination_len)?;
        plan.entry(chrom.clone()).or_default().push(BlockCopy {
            source_chrom: chrom,
            source: row.source,
            destination: row.destination,
            reverse: false,
        });
        blocks_copied += 1;
    }

    let table = apply_copies(source, destination, plan, pool)?;
    log_missing("mapping table", &missing);
    log::info!(
        "Copied {} fragments ({} rows with insertions skipped) in {:.2}s",
        blocks_copied,
        skipped,
        start_time.elapsed().as_secs_f64()
    );
    Ok(LiftoverReport {
        table,
        blocks_copied,
        filtered: 0,
        missing,
    })
}

fn count_ranges(
    name: &str,
    assembly: &Assembly,
    dialect: ChromDialect,
    ranges: BTreeMap<String, Vec<Range<usize>>>,
    pool: &WorkerPool,
) -> Result<SignalTable<u32>> {
    let mut table = SignalTable::<u32>::create(name, assembly, dialect, Layout::Unstranded);
    let tasks: Vec<(String, usize, Vec<Range<usize>>)> = ranges
        .into_iter()
        .map(|(chrom, ranges)| Ok((chrom.clone(), table.chrom_len(&chrom)?, ranges)))
        .collect::<Result<_>>()?;
    let counted = pool.run_sized(
        tasks,
        |(_, len, _)| *len,
        |(chrom, len, ranges)| {
            let mut diff = vec![0i64; len + 1];
            for (i, range) in ranges.iter().enumerate() {
                if i % POLL_STRIDE == 0 {
                    pool.token().check()?;
                }
                diff[range.start] += 1;
                diff[range.end] -= 1;
            }
            let mut running = 0i64;
            let counts: Vec<u32> = diff[..len]
                .iter()
                .map(|d| {
                    running += d;
                    running as u32
                })
                .collect();
            Ok((chrom, counts))
        },
    )?;
    for (chrom, counts) in counted {
        table.replace_tracks(&chrom, vec![Track::from_vec(counts)])?;
    }
    Ok(table)
}

/// How many chain blocks cover each position of `assembly`
///
/// `From`: `assembly` is the chains' reference side and `other` the query
/// side. `To`: the roles are swapped.
pub fn mappability_from_chain(
    assembly: &Assembly,
    other: &Assembly,
    dialect: ChromDialect,
    chains: &[Chain],
    filter: &ChainFilter,
    direction: MappabilityDirection,
    pool: &WorkerPool,
) -> Result<LiftoverReport<u32>> {
    let start_time = Instant::now();
    let name = format!("mappability_{}_{}", assembly.name, other.name);
    let mut missing = BTreeSet::new();
    let mut filtered = 0usize;
    let mut blocks = 0usize;
    let mut ranges: BTreeMap<String, Vec<Range<usize>>> = BTreeMap::new();

    for chain in chains {
        if !filter.accepts(chain) {
            filtered += 1;
            continue;
        }
        let h = &chain.header;
        let (own_name, own_size, own_side, other_name, other_size, other_side) = match direction {
            MappabilityDirection::From => (
                &h.reference_name,
                h.reference_size,
                "reference",
                &h.query_name,
                h.query_size,
                "query",
            ),
            MappabilityDirection::To => (
                &h.query_name,
                h.query_size,
                "query",
                &h.reference_name,
                h.reference_size,
                "reference",
            ),
        };
        let own = dialect.translate(own_name);
        let foreign = dialect.translate(other_name);
        let (Ok(own_len), Ok(other_len)) = (assembly.length(&own), other.length(&foreign)) else {
            if !assembly.contains(&own) {
                missing.insert(own_name.clone());
            }
            if !other.contains(&foreign) {
                missing.insert(other_name.clone());
            }
            continue;
        };
        check_chain_size(chain, own_side, &own, own_size, own_len)?;
        check_chain_size(chain, other_side, &foreign, other_size, other_len)?;

        let chrom_ranges = ranges.entry(own.clone()).or_default();
        for block in chain.blocks().filter(|b| !b.is_empty()) {
            let (reference, query) = block_ranges(&block);
            let range = match direction {
                MappabilityDirection::From => reference,
                MappabilityDirection::To => query,
            };
            check_range(&own, &range, own_len)?;
            chrom_ranges.push(range);
            blocks += 1;
        }
    }

    let table = count_ranges(&name, assembly, dialect, ranges, pool)?;
    log_missing("chains", &missing);
    log::info!(
        "Mappability of {} {:?} {} from {} blocks in {:.2}s",
        assembly.name,
        direction,
        other.name,
        blocks,
        start_time.elapsed().as_secs_f64()
    );
    Ok(LiftoverReport {
        table,
        blocks_copied: blocks,
        filtered,
        missing,
    })
}

/// How many aligned mapping-table rows cover each position of `assembly`
///
/// `From` counts destination fragments, `To` counts source fragments.
pub fn mappability_from_mapping_table<P: AsRef<Path>>(
    assembly: &Assembly,
    dialect: ChromDialect,
    table_path: P,
    direction: MappabilityDirection,
    pool: &WorkerPool,
) -> Result<LiftoverReport<u32>> {
    let name = format!("mappability_{}", assembly.name);
    let mut missing = BTreeSet::new();
    let mut rows = 0usize;
    let mut ranges: BTreeMap<String, Vec<Range<usize>>> = BTreeMap::new();

    for row in read_rows(table_path)? {
        row.check_lengths()?;
        if !row.aligned {
            continue;
        }
        let chrom = dialect.translate(&row.chrom);
        let Ok(len) = assembly.length(&chrom) else {
            missing.insert(row.chrom.clone());
            continue;
        };
        let range = match direction {
            MappabilityDirection::From => row.destination,
            MappabilityDirection::To => row.source,
        };
        check_range(&chrom, &range, len)?;
        ranges.entry(chrom).or_default().push(range);
        rows += 1;
    }

    let table = count_ranges(&name, assembly, dialect, ranges, pool)?;
    log_missing("mapping table", &missing);
    Ok(LiftoverReport {
        table,
        blocks_copied: rows,
        filtered: 0,
        missing,
    })
}
