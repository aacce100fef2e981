//! Chromosome signal tables
//!
//! A [`SignalTable`] holds, for one assembly and naming dialect, one track
//! per chromosome (unstranded) or a `+`/`-` pair of tracks per chromosome
//! (stranded), plus the read statistics the signal was built from.
//!
//! Every track length equals the declared chromosome length and every
//! declared chromosome has all of its channels; the constructors enforce
//! this and no method breaks it.

use crate::core::assembly::Assembly;
use crate::core::dialect::ChromDialect;
use crate::core::element::{Dtype, Element};
use crate::core::error::{EngineError, Result};
use crate::core::strand::Strand;
use crate::core::track::Track;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tempfile::TempDir;

/// Channel layout of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Two channels per chromosome, `+` then `-`
    Stranded,
    /// One channel per chromosome
    Unstranded,
}

impl Layout {
    pub fn channels(&self) -> usize {
        match self {
            Layout::Stranded => 2,
            Layout::Unstranded => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layout::Stranded => "stranded",
            Layout::Unstranded => "unstranded",
        }
    }

    pub fn is_stranded(&self) -> bool {
        matches!(self, Layout::Stranded)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar metadata carried alongside the signal
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    /// Display name; commas are replaced by `_` so it fits the metadata file
    pub name: String,
    pub total_reads: f64,
    pub total_read_length: f64,
    pub mean_read_length: f64,
    pub mode_read_length: Option<usize>,
    /// `total_read_length / coverage_basis`
    pub coverage: f64,
    /// Genome size the coverage was computed against
    pub coverage_basis: usize,
    pub is_normalized: bool,
    pub fragment_size: Option<usize>,
}

impl TableMeta {
    pub fn new(name: &str) -> Self {
        Self {
            name: sanitize_name(name),
            total_reads: 0.0,
            total_read_length: 0.0,
            mean_read_length: 0.0,
            mode_read_length: None,
            coverage: 0.0,
            coverage_basis: 0,
            is_normalized: false,
            fragment_size: None,
        }
    }
}

/// Replace the metadata separator in a display name
pub fn sanitize_name(name: &str) -> String {
    name.replace(',', "_")
}

/// Chromosome signal table
pub struct SignalTable<T: Element> {
    meta: TableMeta,
    assembly: Assembly,
    dialect: ChromDialect,
    layout: Layout,
    // Declared before `scratch` so mapped tracks are released before the
    // scratch directory is removed.
    tracks: BTreeMap<String, Vec<Track<T>>>,
    scratch: Option<Arc<TempDir>>,
}

impl<T: Element> SignalTable<T> {
    /// Zero-filled table over every chromosome of `assembly`
    pub fn create(name: &str, assembly: &Assembly, dialect: ChromDialect, layout: Layout) -> Self {
        let lengths: BTreeMap<String, usize> = assembly
            .lengths
            .iter()
            .map(|(chrom, len)| (dialect.translate(chrom), *len))
            .collect();
        let tracks = lengths
            .iter()
            .map(|(chrom, len)| {
                let channels = (0..layout.channels()).map(|_| Track::zeros(*len)).collect();
                (chrom.clone(), channels)
            })
            .collect();
        let mut table = Self {
            meta: TableMeta::new(name),
            assembly: Assembly {
                name: assembly.name.clone(),
                lengths,
            },
            dialect,
            layout,
            tracks,
            scratch: None,
        };
        table.meta.coverage_basis = table.genome_size();
        table
    }

    /// Assemble a table from existing tracks, checking every length
    pub fn from_parts(
        meta: TableMeta,
        assembly: Assembly,
        dialect: ChromDialect,
        layout: Layout,
        tracks: BTreeMap<String, Vec<Track<T>>>,
    ) -> Result<Self> {
        for (chrom, len) in &assembly.lengths {
            let channels = tracks
                .get(chrom)
                .ok_or_else(|| EngineError::UnknownChromosome(chrom.clone()))?;
            if channels.len() != layout.channels() {
                return Err(EngineError::LayoutMismatch {
                    expected: layout.name(),
                    found: if channels.len() == 2 { "stranded" } else { "unstranded" },
                });
            }
            for track in channels {
                if track.len() != *len {
                    return Err(EngineError::ShapeMismatch {
                        chrom: chrom.clone(),
                        left: *len,
                        right: track.len(),
                    });
                }
            }
        }
        if let Some(extra) = tracks.keys().find(|c| !assembly.lengths.contains_key(*c)) {
            return Err(EngineError::UnknownChromosome(extra.clone()));
        }
        Ok(Self {
            meta,
            assembly,
            dialect,
            layout,
            tracks,
            scratch: None,
        })
    }

    /// New table with this table's metadata and assembly but other tracks
    pub(crate) fn derive<V: Element>(
        &self,
        layout: Layout,
        tracks: BTreeMap<String, Vec<Track<V>>>,
    ) -> SignalTable<V> {
        SignalTable {
            meta: self.meta.clone(),
            assembly: self.assembly.clone(),
            dialect: self.dialect,
            layout,
            tracks,
            scratch: None,
        }
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut TableMeta {
        &mut self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.meta.name = sanitize_name(name);
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    pub(crate) fn assembly_mut(&mut self) -> &mut Assembly {
        &mut self.assembly
    }

    pub fn dialect(&self) -> ChromDialect {
        self.dialect
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn dtype(&self) -> Dtype {
        T::DTYPE
    }

    /// Sum of declared chromosome lengths
    pub fn genome_size(&self) -> usize {
        self.assembly.genome_size()
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }

    pub fn chromosome_count(&self) -> usize {
        self.tracks.len()
    }

    /// Translate `chrom` into this table's dialect and check it is declared
    pub fn resolve(&self, chrom: &str) -> Result<String> {
        let name = self.dialect.translate(chrom);
        if self.tracks.contains_key(&name) {
            Ok(name)
        } else {
            Err(EngineError::UnknownChromosome(chrom.to_string()))
        }
    }

    pub fn contains(&self, chrom: &str) -> bool {
        self.tracks.contains_key(&self.dialect.translate(chrom))
    }

    pub fn chrom_len(&self, chrom: &str) -> Result<usize> {
        self.assembly.length(&self.dialect.translate(chrom))
            .map_err(|_| EngineError::UnknownChromosome(chrom.to_string()))
    }

    /// Fail with `LayoutMismatch` unless the table has `layout`
    pub fn require(&self, layout: Layout) -> Result<()> {
        if self.layout == layout {
            Ok(())
        } else {
            Err(EngineError::LayoutMismatch {
                expected: layout.name(),
                found: self.layout.name(),
            })
        }
    }

    fn channel_index(&self, strand: Option<Strand>) -> Result<usize> {
        match (self.layout, strand) {
            (Layout::Stranded, Some(s)) => Ok(s.index()),
            (Layout::Unstranded, None) => Ok(0),
            (Layout::Stranded, None) => Err(EngineError::LayoutMismatch {
                expected: "unstranded",
                found: "stranded",
            }),
            (Layout::Unstranded, Some(_)) => Err(EngineError::LayoutMismatch {
                expected: "stranded",
                found: "unstranded",
            }),
        }
    }

    /// One channel: `Some(strand)` on stranded tables, `None` on unstranded
    pub fn channel(&self, chrom: &str, strand: Option<Strand>) -> Result<&[T]> {
        let idx = self.channel_index(strand)?;
        let name = self.resolve(chrom)?;
        Ok(self.tracks[&name][idx].as_slice())
    }

    pub fn channel_mut(&mut self, chrom: &str, strand: Option<Strand>) -> Result<&mut [T]> {
        let idx = self.channel_index(strand)?;
        let name = self.resolve(chrom)?;
        match self.tracks.get_mut(&name) {
            Some(channels) => Ok(channels[idx].as_mut_slice()),
            None => Err(EngineError::UnknownChromosome(chrom.to_string())),
        }
    }

    /// All channels of one chromosome in channel order
    pub fn tracks_of(&self, chrom: &str) -> Result<&[Track<T>]> {
        let name = self.resolve(chrom)?;
        Ok(&self.tracks[&name])
    }

    pub fn tracks_of_mut(&mut self, chrom: &str) -> Result<&mut [Track<T>]> {
        let name = self.resolve(chrom)?;
        self.tracks
            .get_mut(&name)
            .map(|v| v.as_mut_slice())
            .ok_or_else(|| EngineError::UnknownChromosome(chrom.to_string()))
    }

    /// Replace the channels of one chromosome
    pub fn replace_tracks(&mut self, chrom: &str, channels: Vec<Track<T>>) -> Result<()> {
        let name = self.resolve(chrom)?;
        let len = self.assembly.length(&name)?;
        if channels.len() != self.layout.channels() {
            return Err(EngineError::LayoutMismatch {
                expected: self.layout.name(),
                found: if channels.len() == 2 { "stranded" } else { "unstranded" },
            });
        }
        if let Some(bad) = channels.iter().find(|t| t.len() != len) {
            return Err(EngineError::ShapeMismatch {
                chrom: name,
                left: len,
                right: bad.len(),
            });
        }
        self.tracks.insert(name, channels);
        Ok(())
    }

    /// Iterate chromosomes with their channels in lexicographic order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Track<T>])> {
        self.tracks.iter().map(|(c, t)| (c.as_str(), t.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Track<T>>)> {
        self.tracks.iter_mut().map(|(c, t)| (c.as_str(), t))
    }

    pub(crate) fn track_map(&self) -> &BTreeMap<String, Vec<Track<T>>> {
        &self.tracks
    }

    pub(crate) fn track_map_mut(&mut self) -> &mut BTreeMap<String, Vec<Track<T>>> {
        &mut self.tracks
    }

    /// Recompute coverage against the currently declared genome size
    pub fn update_coverage(&mut self) {
        let genome_size = self.genome_size();
        self.meta.coverage_basis = genome_size;
        self.meta.coverage = if genome_size > 0 {
            self.meta.total_read_length / genome_size as f64
        } else {
            0.0
        };
    }

    /// Attach a scratch directory that must outlive the mapped tracks
    pub fn set_scratch(&mut self, scratch: Arc<TempDir>) {
        self.scratch = Some(scratch);
    }

    pub fn scratch(&self) -> Option<&Arc<TempDir>> {
        self.scratch.as_ref()
    }

    /// Number of tracks currently backed by a memory map
    pub fn mapped_track_count(&self) -> usize {
        self.tracks.values().flatten().filter(|t| t.is_mapped()).count()
    }

    /// Flush every read-write mapped track
    pub fn flush(&self) -> Result<()> {
        for track in self.tracks.values().flatten() {
            track.flush()?;
        }
        Ok(())
    }
}

impl<T: Element> Clone for SignalTable<T> {
    /// Deep copy; mapped tracks become owned and the scratch directory is not shared
    fn clone(&self) -> Self {
        self.derive(self.layout, self.tracks.clone())
    }
}

impl<T: Element> PartialEq for SignalTable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.layout == other.layout
            && self.assembly.lengths == other.assembly.lengths
            && self.tracks == other.tracks
    }
}

impl<T: Element> fmt::Debug for SignalTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTable")
            .field("name", &self.meta.name)
            .field("build", &self.assembly.name)
            .field("dialect", &self.dialect)
            .field("layout", &self.layout)
            .field("dtype", &T::DTYPE)
            .field("chromosomes", &self.tracks.len())
            .finish()
    }
}

/// A table whose element type is only known at run time
#[derive(Debug, Clone)]
pub enum AnySignalTable {
    F32(SignalTable<f32>),
    F64(SignalTable<f64>),
    U32(SignalTable<u32>),
    U8(SignalTable<u8>),
    Bool(SignalTable<bool>),
}

macro_rules! with_any {
    ($any:expr, $t:ident => $body:expr) => {
        match $any {
            AnySignalTable::F32($t) => $body,
            AnySignalTable::F64($t) => $body,
            AnySignalTable::U32($t) => $body,
            AnySignalTable::U8($t) => $body,
            AnySignalTable::Bool($t) => $body,
        }
    };
}

impl AnySignalTable {
    pub fn dtype(&self) -> Dtype {
        with_any!(self, t => t.dtype())
    }

    pub fn layout(&self) -> Layout {
        with_any!(self, t => t.layout())
    }

    pub fn meta(&self) -> &TableMeta {
        with_any!(self, t => t.meta())
    }

    pub fn assembly(&self) -> &Assembly {
        with_any!(self, t => t.assembly())
    }

    /// Convert to `f64` regardless of the stored type
    pub fn to_f64(&self) -> SignalTable<f64> {
        with_any!(self, t => t.cast::<f64>())
    }

    pub fn sum(&self) -> f64 {
        with_any!(self, t => t.sum())
    }

    pub fn max(&self) -> Option<f64> {
        with_any!(self, t => t.max())
    }
}

macro_rules! impl_from_table {
    ($ty:ty, $variant:ident) => {
        impl From<SignalTable<$ty>> for AnySignalTable {
            fn from(table: SignalTable<$ty>) -> Self {
                AnySignalTable::$variant(table)
            }
        }
    };
}

impl_from_table!(f32, F32);
impl_from_table!(f64, F64);
impl_from_table!(u32, U32);
impl_from_table!(u8, U8);
impl_from_table!(bool, Bool);

#[cfg(test)]
mod tests {
    use super::*;

    fn assembly() -> Assembly {
        Assembly::from_lengths("test", [("chr1", 100), ("chr2", 50)], &ChromDialect::AsIs)
    }

    #[test]
    fn test_create_zero_filled() {
        let table = SignalTable::<f32>::create("a,b", &assembly(), ChromDialect::Ucsc, Layout::Stranded);
        assert_eq!(table.name(), "a_b");
        assert_eq!(table.genome_size(), 150);
        assert_eq!(table.channel("chr1", Some(Strand::Minus)).unwrap().len(), 100);
        assert!(table.channel("chr2", Some(Strand::Plus)).unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_lookup_translates_dialect() {
        let table = SignalTable::<f64>::create("t", &assembly(), ChromDialect::Ucsc, Layout::Unstranded);
        assert_eq!(table.channel("2", None).unwrap().len(), 50);
        assert!(matches!(table.channel("chr3", None), Err(EngineError::UnknownChromosome(_))));
    }

    #[test]
    fn test_layout_mismatch() {
        let table = SignalTable::<f64>::create("t", &assembly(), ChromDialect::AsIs, Layout::Unstranded);
        assert!(matches!(
            table.channel("chr1", Some(Strand::Plus)),
            Err(EngineError::LayoutMismatch { .. })
        ));
        assert!(table.require(Layout::Stranded).is_err());
    }

    #[test]
    fn test_replace_tracks_checks_length() {
        let mut table = SignalTable::<u32>::create("t", &assembly(), ChromDialect::AsIs, Layout::Unstranded);
        let err = table.replace_tracks("chr2", vec![Track::zeros(49)]).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch { .. }));
        table.replace_tracks("chr2", vec![Track::from_vec(vec![3; 50])]).unwrap();
        assert_eq!(table.channel("chr2", None).unwrap()[0], 3);
    }

    #[test]
    fn test_from_parts_rejects_missing_channel() {
        let asm = assembly();
        let mut tracks = BTreeMap::new();
        tracks.insert("chr1".to_string(), vec![Track::<f32>::zeros(100)]);
        let err = SignalTable::from_parts(TableMeta::new("t"), asm, ChromDialect::AsIs, Layout::Unstranded, tracks)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownChromosome(c) if c == "chr2"));
    }

    #[test]
    fn test_update_coverage() {
        let mut table = SignalTable::<f32>::create("t", &assembly(), ChromDialect::AsIs, Layout::Stranded);
        table.meta_mut().total_read_length = 300.0;
        table.update_coverage();
        assert_eq!(table.meta().coverage, 2.0);
        assert_eq!(table.meta().coverage_basis, 150);
    }
}
