//! On-disk tables
//!
//! A saved table is a directory holding one `.npy` (or `.npy.gz`) array per
//! chromosome and strand plus `meta_data.txt`:
//!
//! ```text
//! chr1_1.npy.gz  chr1_-1.npy.gz  chr2_1.npy.gz ...   (stranded)
//! chr1.npy       chr2.npy ...                        (unstranded)
//! meta_data.txt: name,build,dialect,True|False[,mode read length]
//! ```
//!
//! Uncompressed arrays can be loaded as memory maps; at most
//! `max_mapped_chromosomes` of the largest chromosomes are mapped and the
//! rest are read into memory.

use crate::core::element::{Dtype, Element};
use crate::core::track::{is_mapped_read_write, sniff_dtype};
use crate::core::{
    natural_sort, AnySignalTable, Assembly, ChromDialect, EngineConfig, EngineError, Layout, Result, SignalTable,
    Strand, TableMeta, Track,
};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array1, ArrayView1};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const META_DATA_FILE: &str = "meta_data.txt";
const NPY_SUFFIX: &str = ".npy";
const GZ_SUFFIX: &str = ".npy.gz";

/// How array files are brought into memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    #[default]
    InMemory,
    MappedReadOnly,
    MappedReadWrite,
}

impl LoadMode {
    fn writable(&self) -> bool {
        matches!(self, LoadMode::MappedReadWrite)
    }
}

impl std::str::FromStr for LoadMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" | "" => Ok(LoadMode::InMemory),
            "r" | "read-only" => Ok(LoadMode::MappedReadOnly),
            "r+" | "read-write" => Ok(LoadMode::MappedReadWrite),
            other => Err(EngineError::InvalidParameter(format!(
                "unknown load mode '{}', expected memory, read-only or read-write",
                other
            ))),
        }
    }
}

/// File stem of one channel: `chr1_1`, `chr1_-1` or `chr1`
pub fn array_stem(chrom: &str, strand: Option<Strand>) -> String {
    match strand {
        Some(s) => format!("{}_{}", chrom, s.signed()),
        None => chrom.to_string(),
    }
}

fn channel_strand(layout: Layout, channel: usize) -> Option<Strand> {
    layout.is_stranded().then(|| Strand::BOTH[channel])
}

/// One array file found in a table directory
#[derive(Debug, Clone)]
struct ArrayFile {
    chrom: String,
    channel: usize,
    path: PathBuf,
    compressed: bool,
    size: u64,
}

fn parse_array_name(name: &str, layout: Layout) -> Option<(String, usize, bool)> {
    let (stem, compressed) = if let Some(stem) = name.strip_suffix(GZ_SUFFIX) {
        (stem, true)
    } else {
        (name.strip_suffix(NPY_SUFFIX)?, false)
    };
    match layout {
        Layout::Unstranded => Some((stem.to_string(), 0, compressed)),
        Layout::Stranded => {
            let (chrom, strand) = stem.rsplit_once('_')?;
            let strand = Strand::from_signed(strand.parse().ok()?)?;
            Some((chrom.to_string(), strand.index(), compressed))
        }
    }
}

/// Array files of `dir` in natural chromosome order
fn list_arrays(dir: &Path, layout: Layout) -> Result<Vec<ArrayFile>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    natural_sort(&mut names);

    let mut files = Vec::new();
    for name in names {
        let Some((chrom, channel, compressed)) = parse_array_name(&name, layout) else {
            if name != META_DATA_FILE {
                log::debug!("Ignoring {} in {}", name, dir.display());
            }
            continue;
        };
        let path = dir.join(&name);
        let size = fs::metadata(&path)?.len();
        files.push(ArrayFile {
            chrom,
            channel,
            path,
            compressed,
            size,
        });
    }
    Ok(files)
}

/// Contents of `meta_data.txt`
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMeta {
    pub name: String,
    pub build: String,
    pub dialect: ChromDialect,
    pub is_normalized: bool,
    pub mode_read_length: Option<usize>,
}

impl StoredMeta {
    fn of<T: Element>(table: &SignalTable<T>) -> Self {
        Self {
            name: table.name().to_string(),
            build: table.assembly().name.clone(),
            dialect: table.dialect(),
            is_normalized: table.meta().is_normalized,
            mode_read_length: table.meta().mode_read_length,
        }
    }

    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{},{},{},{}",
            self.name,
            self.build,
            self.dialect.as_str(),
            if self.is_normalized { "True" } else { "False" }
        );
        if let Some(mode) = self.mode_read_length {
            line.push_str(&format!(",{}", mode));
        }
        line
    }

    pub fn parse(line: &str, path: &Path) -> Result<Self> {
        let bad = |message: String| EngineError::InvalidParameter(format!("{}: {}", path.display(), message));
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() < 4 {
            return Err(bad(format!("expected at least 4 fields, found {}", fields.len())));
        }
        let dialect = fields[2].parse::<ChromDialect>().map_err(bad)?;
        let is_normalized = match fields[3] {
            "True" => true,
            "False" => false,
            other => return Err(bad(format!("normalization flag must be True or False, found '{}'", other))),
        };
        let mode_read_length = match fields.get(4).copied() {
            None | Some("") | Some("None") => None,
            Some(mode) => Some(
                mode.parse::<usize>()
                    .map_err(|_| bad(format!("invalid mode read length '{}'", mode)))?,
            ),
        };
        Ok(Self {
            name: fields[0].to_string(),
            build: fields[1].to_string(),
            dialect,
            is_normalized,
            mode_read_length,
        })
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(META_DATA_FILE);
        let line = fs::read_to_string(&path)?;
        Self::parse(&line, &path)
    }
}

/// Write one array next to `path`, then rename it into place
///
/// Maps of the file being replaced keep reading the old contents.
fn write_array<T: Element>(values: &[T], path: &Path, compressed: bool) -> Result<()> {
    let view = ArrayView1::from(values);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let staged = tempfile::Builder::new().prefix(".").suffix(".part").tempfile_in(dir)?;
    {
        let writer = BufWriter::new(staged.as_file());
        if compressed {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            view.write_npy(&mut encoder).map_err(|e| EngineError::npy(path, e))?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            view.write_npy(&mut writer).map_err(|e| EngineError::npy(path, e))?;
            writer.flush()?;
        }
    }
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_array<T: Element>(path: &Path, compressed: bool) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let array = if compressed {
        Array1::<T>::read_npy(BufReader::new(GzDecoder::new(file)))
    } else {
        Array1::<T>::read_npy(BufReader::new(file))
    }
    .map_err(|e| EngineError::npy(path, e))?;
    Ok(array.into_raw_vec())
}

/// Save `table` into `dir`, creating it if needed
///
/// A channel whose target file this table already maps read-write is
/// flushed in place; a target mapped read-write by any other track is
/// refused. Every other array is replaced by rename, so read-only maps of
/// the previous files stay valid.
pub fn save<T: Element, P: AsRef<Path>>(table: &SignalTable<T>, dir: P, compress: bool) -> Result<()> {
    let dir = dir.as_ref();
    let start_time = Instant::now();
    log::info!("Saving {} to {} ...", table.name(), dir.display());
    fs::create_dir_all(dir)?;

    let layout = table.layout();
    let mut chroms: Vec<&str> = table.chromosomes().collect();
    natural_sort(&mut chroms);
    for chrom in chroms {
        for (channel, track) in table.tracks_of(chrom)?.iter().enumerate() {
            let stem = array_stem(chrom, channel_strand(layout, channel));
            let plain = dir.join(format!("{}{}", stem, NPY_SUFFIX));
            let gz = dir.join(format!("{}{}", stem, GZ_SUFFIX));
            let (target, stale) = if compress { (&gz, &plain) } else { (&plain, &gz) };

            if target.exists() && is_mapped_read_write(target) {
                let same = matches!(track, Track::Mapped(m) if m.is_writable()
                    && Some(m.path()) == target.canonicalize().ok().as_deref());
                if !same {
                    return Err(EngineError::AlreadyMapped(target.clone()));
                }
                track.flush()?;
                log::debug!("Flushed {} in place", target.display());
                continue;
            }
            if stale.exists() {
                if is_mapped_read_write(stale) {
                    return Err(EngineError::AlreadyMapped(stale.clone()));
                }
                fs::remove_file(stale)?;
            }
            write_array(track.as_slice(), target, compress)?;
            log::debug!("Saved {}", target.display());
        }
    }

    fs::write(dir.join(META_DATA_FILE), StoredMeta::of(table).to_line())?;
    log::info!(
        "Saved {} chromosomes in {:.2}s",
        table.chromosome_count(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Chromosomes to map: the largest ones with only uncompressed files
fn chromosomes_to_map(files: &[ArrayFile], layout: Layout, ceiling: usize) -> BTreeSet<String> {
    let mut sizes: BTreeMap<&str, (u64, usize, bool)> = BTreeMap::new();
    for file in files {
        let entry = sizes.entry(&file.chrom).or_insert((0, 0, true));
        entry.0 = entry.0.max(file.size);
        entry.1 += 1;
        entry.2 &= !file.compressed;
    }
    let mut candidates: Vec<(&str, u64)> = sizes
        .into_iter()
        .filter(|(_, (_, count, plain))| *plain && *count == layout.channels())
        .map(|(chrom, (size, _, _))| (chrom, size))
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    candidates
        .into_iter()
        .take(ceiling)
        .map(|(chrom, _)| chrom.to_string())
        .collect()
}

/// Load a table saved by [`save`]
pub fn load<T: Element, P: AsRef<Path>>(
    dir: P,
    layout: Layout,
    mode: LoadMode,
    config: &EngineConfig,
) -> Result<SignalTable<T>> {
    let dir = dir.as_ref();
    let start_time = Instant::now();
    let stored = StoredMeta::read(dir)?;
    log::info!("Loading {} from {} ...", stored.name, dir.display());

    let files = list_arrays(dir, layout)?;
    let mapped = match mode {
        LoadMode::InMemory => BTreeSet::new(),
        _ => {
            log::info!(
                "Loading up to {} chromosomes memory-mapped ({})",
                config.max_mapped_chromosomes,
                if mode.writable() { "read-write" } else { "read-only" }
            );
            chromosomes_to_map(&files, layout, config.max_mapped_chromosomes)
        }
    };

    let mut slots: BTreeMap<String, Vec<Option<Track<T>>>> = BTreeMap::new();
    for file in &files {
        let track = if mapped.contains(&file.chrom) {
            Track::map_file(&file.path, mode.writable())?
        } else {
            Track::from_vec(read_array::<T>(&file.path, file.compressed)?)
        };
        log::debug!("Loaded {} ({} elements)", file.path.display(), track.len());
        let channels = slots
            .entry(file.chrom.clone())
            .or_insert_with(|| (0..layout.channels()).map(|_| None).collect());
        if channels[file.channel].replace(track).is_some() {
            return Err(EngineError::InvalidParameter(format!(
                "{} holds both compressed and uncompressed arrays for {}",
                dir.display(),
                array_stem(&file.chrom, channel_strand(layout, file.channel))
            )));
        }
    }
    if slots.is_empty() {
        return Err(EngineError::InvalidParameter(format!(
            "no {} arrays found in {}",
            layout.name(),
            dir.display()
        )));
    }

    let mut lengths = BTreeMap::new();
    let mut tracks = BTreeMap::new();
    for (chrom, channels) in slots {
        let channels: Vec<Track<T>> = channels
            .into_iter()
            .enumerate()
            .map(|(channel, track)| {
                track.ok_or_else(|| {
                    EngineError::InvalidParameter(format!(
                        "{} is missing {}",
                        dir.display(),
                        array_stem(&chrom, channel_strand(layout, channel))
                    ))
                })
            })
            .collect::<Result<_>>()?;
        lengths.insert(chrom.clone(), channels[0].len());
        tracks.insert(chrom, channels);
    }

    let mut meta = TableMeta::new(&stored.name);
    meta.is_normalized = stored.is_normalized;
    meta.mode_read_length = stored.mode_read_length;
    let assembly = Assembly {
        name: stored.build,
        lengths,
    };
    let mut table = SignalTable::from_parts(meta, assembly, stored.dialect, layout, tracks)?;
    table.update_coverage();
    log::info!(
        "Done loading {} ({} mapped tracks) in {:.2}s",
        table.name(),
        table.mapped_track_count(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(table)
}

/// Load a table whose element type is read from its first array file
pub fn load_any<P: AsRef<Path>>(
    dir: P,
    layout: Layout,
    mode: LoadMode,
    config: &EngineConfig,
) -> Result<AnySignalTable> {
    let dir = dir.as_ref();
    let files = list_arrays(dir, layout)?;
    let first = files.first().ok_or_else(|| {
        EngineError::InvalidParameter(format!("no {} arrays found in {}", layout.name(), dir.display()))
    })?;
    let file = File::open(&first.path)?;
    let mut reader: Box<dyn Read> = if first.compressed {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let dtype = sniff_dtype(&mut reader, &first.path)?;
    log::debug!("{} holds {} arrays", dir.display(), dtype);

    Ok(match dtype {
        Dtype::F32 => AnySignalTable::F32(load(dir, layout, mode, config)?),
        Dtype::F64 => AnySignalTable::F64(load(dir, layout, mode, config)?),
        Dtype::U32 => AnySignalTable::U32(load(dir, layout, mode, config)?),
        Dtype::U8 => AnySignalTable::U8(load(dir, layout, mode, config)?),
        Dtype::Bool => AnySignalTable::Bool(load(dir, layout, mode, config)?),
    })
}

/// Move the largest in-memory chromosomes of `table` into mapped scratch files
///
/// The scratch directory is created under `config.scratch_dir` (or the
/// system temp dir), owned by the table and removed when the table drops.
/// Returns the number of chromosomes moved.
pub fn spill_to_scratch<T: Element>(table: &mut SignalTable<T>, config: &EngineConfig, writable: bool) -> Result<usize> {
    let scratch = match table.scratch() {
        Some(scratch) => Arc::clone(scratch),
        None => {
            let builder = {
                let mut b = tempfile::Builder::new();
                b.prefix("pileup-scratch-");
                b
            };
            let dir = match &config.scratch_dir {
                Some(parent) => {
                    fs::create_dir_all(parent)?;
                    builder.tempdir_in(parent)?
                }
                None => builder.tempdir()?,
            };
            Arc::new(dir)
        }
    };

    let mut by_size: Vec<(String, usize)> = table
        .iter()
        .filter(|(_, channels)| channels.iter().any(|t| !t.is_mapped()))
        .map(|(chrom, channels)| (chrom.to_string(), channels.first().map(Track::len).unwrap_or(0)))
        .collect();
    by_size.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let already = table
        .iter()
        .filter(|(_, channels)| channels.iter().all(Track::is_mapped))
        .count();
    let budget = config.max_mapped_chromosomes.saturating_sub(already);

    let layout = table.layout();
    let mut moved = 0;
    for (chrom, _) in by_size.into_iter().take(budget) {
        let channels = table.tracks_of_mut(&chrom)?;
        for (channel, track) in channels.iter_mut().enumerate() {
            if track.is_mapped() {
                continue;
            }
            let path = scratch
                .path()
                .join(format!("{}{}", array_stem(&chrom, channel_strand(layout, channel)), NPY_SUFFIX));
            write_array(track.as_slice(), &path, false)?;
            *track = Track::map_file(&path, writable)?;
        }
        log::debug!("Spilled {} to {}", chrom, scratch.path().display());
        moved += 1;
    }
    table.set_scratch(scratch);
    log::info!("Moved {} chromosomes of {} to scratch maps", moved, table.name());
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn assembly() -> Assembly {
        Assembly::from_lengths("hg_test", [("chr1", 30usize), ("chr2", 12), ("chrUn_gl1", 7)], &ChromDialect::Ucsc)
    }

    fn stranded() -> SignalTable<f32> {
        let mut table = SignalTable::create("sample", &assembly(), ChromDialect::Ucsc, Layout::Stranded);
        for (_, channels) in table.iter_mut() {
            for (c, track) in channels.iter_mut().enumerate() {
                for (i, v) in track.as_mut_slice().iter_mut().enumerate() {
                    *v = (i * (c + 1)) as f32 * 0.5;
                }
            }
        }
        table.meta_mut().mode_read_length = Some(36);
        table
    }

    #[test]
    fn test_meta_line() {
        let meta = StoredMeta {
            name: "x".into(),
            build: "mm10".into(),
            dialect: ChromDialect::Ensembl,
            is_normalized: true,
            mode_read_length: Some(50),
        };
        assert_eq!(meta.to_line(), "x,mm10,ensembl,True,50");
        assert_eq!(StoredMeta::parse("x,mm10,ensembl,True,50\n", Path::new("m")).unwrap(), meta);
        let bare = StoredMeta::parse("x,mm10,ucsc,False", Path::new("m")).unwrap();
        assert_eq!(bare.mode_read_length, None);
        assert!(StoredMeta::parse("x,mm10,ucsc,yes", Path::new("m")).is_err());
    }

    #[test]
    fn test_array_names() {
        assert_eq!(
            parse_array_name("chrUn_gl1_-1.npy.gz", Layout::Stranded),
            Some(("chrUn_gl1".to_string(), 1, true))
        );
        assert_eq!(parse_array_name("chr1_1.npy", Layout::Stranded), Some(("chr1".to_string(), 0, false)));
        assert_eq!(parse_array_name("chr1.npy", Layout::Unstranded), Some(("chr1".to_string(), 0, false)));
        assert_eq!(parse_array_name("meta_data.txt", Layout::Unstranded), None);
        assert_eq!(parse_array_name("chr1_2.npy", Layout::Stranded), None);
    }

    #[test]
    fn test_round_trip_compressed() {
        let dir = TempDir::new().unwrap();
        let table = stranded();
        save(&table, dir.path(), true).unwrap();
        assert!(dir.path().join("chrUn_gl1_-1.npy.gz").exists());

        let loaded: SignalTable<f32> =
            load(dir.path(), Layout::Stranded, LoadMode::MappedReadOnly, &EngineConfig::default()).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.mapped_track_count(), 0);
        assert_eq!(loaded.meta().mode_read_length, Some(36));
        assert_eq!(loaded.assembly().name, "hg_test");
    }

    #[test]
    fn test_mapped_load_respects_ceiling() {
        let dir = TempDir::new().unwrap();
        let table = stranded();
        save(&table, dir.path(), false).unwrap();
        let config = EngineConfig::default().with_max_mapped_chromosomes(1);
        let loaded: SignalTable<f32> = load(dir.path(), Layout::Stranded, LoadMode::MappedReadOnly, &config).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.mapped_track_count(), 2);
        assert!(loaded.tracks_of("chr1").unwrap()[0].is_mapped());
    }

    #[test]
    fn test_second_read_write_map_is_refused() {
        let dir = TempDir::new().unwrap();
        save(&stranded(), dir.path(), false).unwrap();
        let config = EngineConfig::default();
        let held: SignalTable<f32> = load(dir.path(), Layout::Stranded, LoadMode::MappedReadWrite, &config).unwrap();
        let err = load::<f32, _>(dir.path(), Layout::Stranded, LoadMode::MappedReadWrite, &config).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyMapped(_)));
        drop(held);
        assert!(load::<f32, _>(dir.path(), Layout::Stranded, LoadMode::MappedReadWrite, &config).is_ok());
    }

    #[test]
    fn test_load_any_and_dtype_mismatch() {
        let dir = TempDir::new().unwrap();
        save(&stranded(), dir.path(), true).unwrap();
        let any = load_any(dir.path(), Layout::Stranded, LoadMode::InMemory, &EngineConfig::default()).unwrap();
        assert_eq!(any.dtype(), Dtype::F32);
        assert!(load::<f64, _>(dir.path(), Layout::Stranded, LoadMode::InMemory, &EngineConfig::default()).is_err());
    }

    #[test]
    fn test_resave_replaces_other_compression() {
        let dir = TempDir::new().unwrap();
        let table = stranded();
        save(&table, dir.path(), true).unwrap();
        save(&table, dir.path(), false).unwrap();
        assert!(!dir.path().join("chr1_1.npy.gz").exists());
        let loaded: SignalTable<f32> =
            load(dir.path(), Layout::Stranded, LoadMode::InMemory, &EngineConfig::default()).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_resave_over_read_only_map() {
        let dir = TempDir::new().unwrap();
        let table = stranded();
        save(&table, dir.path(), false).unwrap();
        let config = EngineConfig::default();
        let mapped: SignalTable<f32> = load(dir.path(), Layout::Stranded, LoadMode::MappedReadOnly, &config).unwrap();
        assert!(mapped.mapped_track_count() > 0);

        save(&mapped, dir.path(), false).unwrap();
        assert_eq!(mapped, table);
        let reloaded: SignalTable<f32> = load(dir.path(), Layout::Stranded, LoadMode::InMemory, &config).unwrap();
        assert_eq!(reloaded, table);
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_spill_to_scratch() {
        let parent = TempDir::new().unwrap();
        let config = EngineConfig::default()
            .with_max_mapped_chromosomes(2)
            .with_scratch_dir(parent.path());
        let original = stranded();
        let mut table = original.clone();
        assert_eq!(spill_to_scratch(&mut table, &config, true).unwrap(), 2);
        assert_eq!(table.mapped_track_count(), 4);
        assert_eq!(table, original);

        table.channel_mut("chr1", Some(Strand::Plus)).unwrap()[3] = 99.0;
        assert_eq!(table.channel("chr1", Some(Strand::Plus)).unwrap()[3], 99.0);

        let scratch = table.scratch().unwrap().path().to_path_buf();
        assert!(scratch.starts_with(parent.path()));
        drop(table);
        assert!(!scratch.exists());
    }
}
