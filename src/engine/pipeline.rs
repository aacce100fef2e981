//! Soft-masked signal pipeline
//!
//! Turns one replicate of aligned reads into an unstranded, soft-masked
//! fragment pileup plus the hard mask of positions where fragments can be
//! observed at all. Every intermediate that is expensive to rebuild is
//! cached below the data directory:
//!
//! ```text
//! {data_dir}/fragment_sizes.txt                      replicate<TAB>fragment length
//! {data_dir}/{replicate}_data/                       final signal
//! {data_dir}/{build}_{R}_{F}_soft_mask/              soft mask for read length R, fragment length F
//! {data_dir}/{build}_{R}_{F}_{policy}_hard_mask/     hard mask
//! ```

use crate::core::{Assembly, ChromDialect, EngineConfig, EngineError, Layout, Result, SignalTable, WorkerPool};
use crate::engine::fragsize::{estimate_fragment_size, FragmentSizeCache, FragmentSizeParams};
use crate::engine::ingest::{
    ingest_records, load_tag_directory, IngestOptions, IngestReport, RegionHandling, StrandlessPolicy,
};
use crate::engine::persist::{self, LoadMode, StoredMeta, META_DATA_FILE};
use crate::engine::transform::{
    apply_soft_mask, fragment_extend, hard_mask, mixdown, soft_mask, HardMaskPolicy, MixdownMode,
};
use crate::formats::{BedReader, BowtieReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const FRAGMENT_SIZE_FILE: &str = "fragment_sizes.txt";

/// Where the aligned reads of a replicate come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSource {
    Bed(PathBuf),
    Bowtie(PathBuf),
    TagDirectory(PathBuf),
}

impl ReadSource {
    pub fn path(&self) -> &Path {
        match self {
            ReadSource::Bed(p) | ReadSource::Bowtie(p) | ReadSource::TagDirectory(p) => p,
        }
    }

    /// Replicate name: the file name up to its first dot
    pub fn replicate_name(&self) -> String {
        let name = self
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.split_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    }

    fn ingest(
        &self,
        table: &mut SignalTable<f32>,
        options: &IngestOptions,
        pool: &WorkerPool,
        config: &EngineConfig,
    ) -> Result<IngestReport> {
        match self {
            ReadSource::Bed(path) => ingest_records(table, BedReader::open(path)?, options, pool, config),
            ReadSource::Bowtie(path) => ingest_records(table, BowtieReader::open(path)?, options, pool, config),
            ReadSource::TagDirectory(dir) => load_tag_directory(table, dir, options, pool, config),
        }
    }
}

/// Inputs of [`load_soft_masked`]
#[derive(Debug, Clone)]
pub struct SoftMaskedInputs {
    pub name: String,
    pub assembly: Assembly,
    pub dialect: ChromDialect,
    pub reads: ReadSource,
    /// BED of alignable read starts for the replicate's read length
    pub alignable_starts: PathBuf,
    /// Root of every cached intermediate
    pub data_dir: PathBuf,
    pub fragment_params: FragmentSizeParams,
    pub hard_mask_policy: HardMaskPolicy,
    /// Fail when the signal inside the hard mask exceeds twice the fragment length
    pub validate: bool,
}

impl SoftMaskedInputs {
    pub fn new(
        name: impl Into<String>,
        assembly: Assembly,
        reads: ReadSource,
        alignable_starts: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            assembly,
            dialect: ChromDialect::default(),
            reads,
            alignable_starts: alignable_starts.into(),
            data_dir: data_dir.into(),
            fragment_params: FragmentSizeParams::default(),
            hard_mask_policy: HardMaskPolicy::Permissive,
            validate: false,
        }
    }

    fn data_folder(&self) -> PathBuf {
        self.data_dir.join(format!("{}_data", self.reads.replicate_name()))
    }

    fn soft_mask_folder(&self, read_length: usize, fragment_length: usize) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}_{}_soft_mask", self.assembly.name, read_length, fragment_length))
    }

    fn hard_mask_folder(&self, read_length: usize, fragment_length: usize) -> PathBuf {
        let policy = match self.hard_mask_policy {
            HardMaskPolicy::Permissive => "permissive".to_string(),
            HardMaskPolicy::Conservative { threshold } => format!("conservative{}", threshold),
        };
        self.data_dir.join(format!(
            "{}_{}_{}_{}_hard_mask",
            self.assembly.name, read_length, fragment_length, policy
        ))
    }
}

/// Result of [`load_soft_masked`]
#[derive(Debug)]
pub struct SoftMaskedSignal {
    /// Unstranded, soft-masked fragment pileup
    pub signal: SignalTable<f32>,
    /// Unstranded positions where fragments can be observed
    pub hard_mask: SignalTable<bool>,
    pub fragment_length: usize,
    pub read_length: usize,
}

fn is_saved(dir: &Path) -> bool {
    dir.join(META_DATA_FILE).is_file()
}

/// Build (or load from the cache) the soft-masked signal of one replicate
pub fn load_soft_masked(
    inputs: &SoftMaskedInputs,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<SoftMaskedSignal> {
    let overall = Instant::now();
    std::fs::create_dir_all(&inputs.data_dir)?;
    let replicate = inputs.reads.replicate_name();
    let cache = FragmentSizeCache::new(inputs.data_dir.join(FRAGMENT_SIZE_FILE));
    let data_folder = inputs.data_folder();

    // A cached signal is only usable with the fragment length it was built with.
    let cached = if is_saved(&data_folder) {
        let stored = StoredMeta::read(&data_folder)?;
        match (stored.mode_read_length, cache.lookup(&replicate)?) {
            (Some(read_length), Some(fragment_length)) => Some((read_length, fragment_length)),
            _ => {
                log::warn!(
                    "Cached signal in {} lacks read or fragment length; rebuilding",
                    data_folder.display()
                );
                None
            }
        }
    } else {
        None
    };

    let (stranded, read_length, fragment_length) = match cached {
        Some((read_length, fragment_length)) => {
            log::info!("Using cached signal in {}", data_folder.display());
            (None, read_length, fragment_length)
        }
        None => {
            log::info!("Building fragment pileup from {}", inputs.reads.path().display());
            let mut starts = SignalTable::<f32>::create(
                &format!("{}_starts", inputs.name),
                &inputs.assembly,
                inputs.dialect,
                Layout::Stranded,
            );
            inputs.reads.ingest(
                &mut starts,
                &IngestOptions::new(RegionHandling::Starts),
                pool,
                config,
            )?;
            let read_length = starts.meta().mode_read_length.ok_or_else(|| {
                EngineError::InvalidParameter(format!("no reads found in {}", inputs.reads.path().display()))
            })?;

            let fragment_length = match cache.lookup(&replicate)? {
                Some(size) => {
                    log::info!("Using cached fragment length {} for {}", size, replicate);
                    size
                }
                None => {
                    let estimate = estimate_fragment_size(&starts, &inputs.fragment_params, pool, config)?;
                    cache.store(&replicate, estimate.fragment_length)?;
                    estimate.fragment_length
                }
            };
            let mut extended = fragment_extend(&starts, fragment_length, pool, config)?;
            extended.set_name(&inputs.name);
            (Some(extended), read_length, fragment_length)
        }
    };

    let soft_folder = inputs.soft_mask_folder(read_length, fragment_length);
    let hard_folder = inputs.hard_mask_folder(read_length, fragment_length);
    let need_soft = stranded.is_some() || !is_saved(&hard_folder);
    let soft = if !need_soft {
        None
    } else if is_saved(&soft_folder) {
        log::info!("Using cached soft mask in {}", soft_folder.display());
        Some(persist::load::<f32, _>(&soft_folder, Layout::Stranded, LoadMode::InMemory, config)?)
    } else {
        log::info!("Generating soft mask from {}", inputs.alignable_starts.display());
        let mut alignable = SignalTable::<f32>::create(
            &format!("{}_{}_soft_mask_starts", inputs.assembly.name, read_length),
            &inputs.assembly,
            inputs.dialect,
            Layout::Stranded,
        );
        ingest_records(
            &mut alignable,
            BedReader::open(&inputs.alignable_starts)?,
            &IngestOptions::new(RegionHandling::Whole).with_strandless(StrandlessPolicy::AssumePlus),
            pool,
            config,
        )?;
        let mask = soft_mask(&alignable, read_length, fragment_length, pool, config)?;
        persist::save(&mask, &soft_folder, config.compress)?;
        Some(mask)
    };

    let hard = if is_saved(&hard_folder) {
        log::info!("Using cached hard mask in {}", hard_folder.display());
        persist::load::<bool, _>(&hard_folder, Layout::Unstranded, LoadMode::InMemory, config)?
    } else {
        let soft = soft.as_ref().ok_or_else(|| EngineError::InvalidParameter("soft mask unavailable".into()))?;
        let mut mask = hard_mask(soft, inputs.hard_mask_policy, pool, config)?;
        mask.set_name(&format!("{}_hard_mask", read_length));
        persist::save(&mask, &hard_folder, config.compress)?;
        mask
    };

    let signal = match (stranded, soft) {
        (Some(stranded), Some(soft)) => {
            let masked = apply_soft_mask(&stranded, &soft)?;
            drop(stranded);
            drop(soft);
            let signal = mixdown(&masked, MixdownMode::default(), pool, config)?;
            persist::save(&signal, &data_folder, config.compress)?;
            signal
        }
        _ => persist::load::<f32, _>(&data_folder, Layout::Unstranded, LoadMode::InMemory, config)?,
    };

    if inputs.validate {
        let inside = signal.mul(&hard)?;
        let max = inside.max().unwrap_or(0.0);
        log::info!("Maximum signal inside the hard mask: {}", max);
        if max > 2.0 * fragment_length as f64 {
            return Err(EngineError::InvalidParameter(format!(
                "maximum pileup height {} in {} exceeds twice the fragment length {}",
                max,
                signal.name(),
                fragment_length
            )));
        }
    }

    log::info!(
        "Loaded {} (fragment length {}, read length {}) in {:.2}s",
        signal.name(),
        fragment_length,
        read_length,
        overall.elapsed().as_secs_f64()
    );
    Ok(SoftMaskedSignal {
        signal,
        hard_mask: hard,
        fragment_length,
        read_length,
    })
}
