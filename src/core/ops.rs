//! Table arithmetic and derived tables
//!
//! Binary operations work channel by channel after every shape has been
//! checked, so a mismatch aborts before any value is written. Values are
//! combined in `f64` and converted back to the element type on store.

use crate::core::dialect::natural_sort;
use crate::core::element::Element;
use crate::core::error::{EngineError, Result};
use crate::core::smoothing::gaussian_filter1d;
use crate::core::strand::Strand;
use crate::core::table::{Layout, SignalTable};
use crate::core::track::Track;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Element-wise binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Masked division: `x / 0 == 0`
    Div,
}

impl BinaryOp {
    #[inline]
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => masked_div(a, b),
        }
    }
}

/// Division that yields 0 for a zero divisor
#[inline]
pub fn masked_div(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}

/// Right-hand side of [`SignalTable::combine`]
pub enum Operand<'a, U: Element = f64> {
    Table(&'a SignalTable<U>),
    Scalar(f64),
}

impl Operand<'static, f64> {
    pub fn scalar(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl<'a, U: Element> From<&'a SignalTable<U>> for Operand<'a, U> {
    fn from(table: &'a SignalTable<U>) -> Self {
        Operand::Table(table)
    }
}

/// Chromosome order used by [`SignalTable::flatten`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChromOrder {
    #[default]
    Lexicographic,
    /// Digit runs compare numerically: `chr2` before `chr10`
    Natural,
    Explicit(Vec<String>),
}

fn convert<T: Element, V: Element>(values: &[T], f: impl Fn(f64) -> f64 + Sync) -> Track<V> {
    Track::Owned(values.iter().map(|v| V::from_f64(f(v.to_f64()))).collect())
}

impl<T: Element> SignalTable<T> {
    /// Check that `other` has the same layout and chromosome shapes
    pub fn check_shapes<U: Element>(&self, other: &SignalTable<U>) -> Result<()> {
        if self.layout() != other.layout() {
            return Err(EngineError::LayoutMismatch {
                expected: self.layout().name(),
                found: other.layout().name(),
            });
        }
        for (chrom, len) in &self.assembly().lengths {
            let other_len = other.chrom_len(chrom).unwrap_or(0);
            if other_len != *len || !other.contains(chrom) {
                return Err(EngineError::ShapeMismatch {
                    chrom: chrom.clone(),
                    left: *len,
                    right: other_len,
                });
            }
        }
        if other.chromosome_count() != self.chromosome_count() {
            if let Some(extra) = other.chromosomes().find(|c| !self.contains(c)) {
                return Err(EngineError::ShapeMismatch {
                    chrom: extra.to_string(),
                    left: 0,
                    right: other.chrom_len(extra).unwrap_or(0),
                });
            }
        }
        Ok(())
    }

    /// Element-wise `self op operand` into a new table
    pub fn combine<U: Element>(&self, operand: Operand<'_, U>, op: BinaryOp) -> Result<Self> {
        if let Operand::Table(other) = &operand {
            self.check_shapes(*other)?;
        }
        let mut out = self.clone();
        out.combine_in_place(operand, op)?;
        Ok(out)
    }

    /// Element-wise `self op= operand`
    pub fn combine_in_place<U: Element>(&mut self, operand: Operand<'_, U>, op: BinaryOp) -> Result<()> {
        match operand {
            Operand::Scalar(value) => {
                self.track_map_mut().par_iter_mut().for_each(|(_, channels)| {
                    for track in channels.iter_mut() {
                        for v in track.as_mut_slice() {
                            *v = T::from_f64(op.apply(v.to_f64(), value));
                        }
                    }
                });
            }
            Operand::Table(other) => {
                self.check_shapes(other)?;
                let names: BTreeMap<String, String> = self
                    .chromosomes()
                    .map(|c| other.resolve(c).map(|o| (c.to_string(), o)))
                    .collect::<Result<_>>()?;
                let right = other.track_map();
                self.track_map_mut().par_iter_mut().for_each(|(chrom, channels)| {
                    let rhs = &right[&names[chrom]];
                    for (track, other_track) in channels.iter_mut().zip(rhs) {
                        for (v, w) in track.as_mut_slice().iter_mut().zip(other_track.as_slice()) {
                            *v = T::from_f64(op.apply(v.to_f64(), w.to_f64()));
                        }
                    }
                });
            }
        }
        Ok(())
    }

    pub fn add<U: Element>(&self, other: &SignalTable<U>) -> Result<Self> {
        self.combine(Operand::Table(other), BinaryOp::Add)
    }

    pub fn sub<U: Element>(&self, other: &SignalTable<U>) -> Result<Self> {
        self.combine(Operand::Table(other), BinaryOp::Sub)
    }

    pub fn mul<U: Element>(&self, other: &SignalTable<U>) -> Result<Self> {
        self.combine(Operand::Table(other), BinaryOp::Mul)
    }

    /// Masked divide: positions where `other` is zero become zero
    pub fn div<U: Element>(&self, other: &SignalTable<U>) -> Result<Self> {
        self.combine(Operand::Table(other), BinaryOp::Div)
    }

    pub fn add_scalar(&self, value: f64) -> Self {
        self.unary(|v| v + value)
    }

    pub fn sub_scalar(&self, value: f64) -> Self {
        self.unary(|v| v - value)
    }

    pub fn mul_scalar(&self, value: f64) -> Self {
        self.unary(|v| v * value)
    }

    pub fn div_scalar(&self, value: f64) -> Self {
        self.unary(|v| masked_div(v, value))
    }

    fn unary(&self, f: impl Fn(f64) -> f64 + Sync + Send) -> Self {
        self.map_into::<T>(f)
    }

    /// Apply `f` to every value, producing a table of another element type
    pub fn map_into<V: Element>(&self, f: impl Fn(f64) -> f64 + Sync + Send) -> SignalTable<V> {
        let tracks: BTreeMap<String, Vec<Track<V>>> = self
            .track_map()
            .par_iter()
            .map(|(chrom, channels)| {
                let mapped = channels.iter().map(|t| convert::<T, V>(t.as_slice(), &f)).collect();
                (chrom.clone(), mapped)
            })
            .collect();
        self.derive(self.layout(), tracks)
    }

    /// Apply `f` to every value
    pub fn map_values(&self, f: impl Fn(f64) -> f64 + Sync + Send) -> Self {
        self.map_into::<T>(f)
    }

    /// Constrain values to `[min, max]`; either bound may be omitted
    pub fn clip(&self, min: Option<f64>, max: Option<f64>) -> Self {
        let lo = min.unwrap_or(f64::NEG_INFINITY);
        let hi = max.unwrap_or(f64::INFINITY);
        self.unary(move |v| v.max(lo).min(hi))
    }

    /// Keep values strictly inside `(min, max)`; everything else becomes 0
    pub fn threshold(&self, min: Option<f64>, max: Option<f64>) -> Self {
        self.unary(move |v| {
            let above = min.map_or(true, |m| v > m);
            let below = max.map_or(true, |m| v < m);
            if above && below {
                v
            } else {
                0.0
            }
        })
    }

    pub fn cast<U: Element>(&self) -> SignalTable<U> {
        self.map_into::<U>(|v| v)
    }

    pub fn ceil(&self) -> Self {
        self.unary(f64::ceil)
    }

    pub fn floor(&self) -> Self {
        self.unary(f64::floor)
    }

    /// Round to `decimals` places (negative values round to tens, hundreds, ...)
    pub fn round(&self, decimals: i32) -> Self {
        let scale = 10f64.powi(decimals);
        self.unary(move |v| (v * scale).round() / scale)
    }

    /// Positions with a value above zero
    pub fn nonzero(&self) -> SignalTable<bool> {
        self.map_into::<bool>(|v| if v > 0.0 { 1.0 } else { 0.0 })
    }

    pub fn logical_not(&self) -> SignalTable<bool> {
        self.map_into::<bool>(|v| if v == 0.0 { 1.0 } else { 0.0 })
    }

    pub fn logical_and<U: Element>(&self, other: &SignalTable<U>) -> Result<SignalTable<bool>> {
        self.zip_into(other, |a, b| if a != 0.0 && b != 0.0 { 1.0 } else { 0.0 })
    }

    pub fn logical_or<U: Element>(&self, other: &SignalTable<U>) -> Result<SignalTable<bool>> {
        self.zip_into(other, |a, b| if a != 0.0 || b != 0.0 { 1.0 } else { 0.0 })
    }

    fn zip_into<U: Element, V: Element>(
        &self,
        other: &SignalTable<U>,
        f: impl Fn(f64, f64) -> f64 + Sync + Send,
    ) -> Result<SignalTable<V>> {
        self.check_shapes(other)?;
        let pairs: Vec<(&String, &Vec<Track<T>>, &[Track<U>])> = self
            .track_map()
            .iter()
            .map(|(chrom, channels)| -> Result<_> { Ok((chrom, channels, other.tracks_of(chrom)?)) })
            .collect::<Result<_>>()?;
        let tracks = pairs
            .into_par_iter()
            .map(|(chrom, left, right)| {
                let channels = left
                    .iter()
                    .zip(right)
                    .map(|(l, r)| {
                        Track::Owned(
                            l.as_slice()
                                .iter()
                                .zip(r.as_slice())
                                .map(|(a, b)| V::from_f64(f(a.to_f64(), b.to_f64())))
                                .collect(),
                        )
                    })
                    .collect();
                (chrom.clone(), channels)
            })
            .collect();
        Ok(self.derive(self.layout(), tracks))
    }

    /// Set every value to `value`
    pub fn fill(&mut self, value: f64) {
        let v = T::from_f64(value);
        self.track_map_mut().par_iter_mut().for_each(|(_, channels)| {
            for track in channels.iter_mut() {
                track.as_mut_slice().fill(v);
            }
        });
    }

    /// Gaussian smoothing of every channel into a new table
    pub fn smooth(&self, sigma: f64) -> Result<Self> {
        let mut out = self.clone();
        out.smooth_in_place(sigma)?;
        Ok(out)
    }

    pub fn smooth_in_place(&mut self, sigma: f64) -> Result<()> {
        // Reject a bad sigma before touching any channel.
        gaussian_filter1d(&[], sigma)?;
        self.track_map_mut()
            .par_iter_mut()
            .try_for_each(|(_, channels)| -> Result<()> {
                for track in channels.iter_mut() {
                    let smoothed = gaussian_filter1d(&track.to_f64_vec(), sigma)?;
                    for (v, s) in track.as_mut_slice().iter_mut().zip(smoothed) {
                        *v = T::from_f64(s);
                    }
                }
                Ok(())
            })
    }

    /// Chromosome names in the requested order
    pub fn ordered_chromosomes(&self, order: &ChromOrder) -> Result<Vec<String>> {
        match order {
            ChromOrder::Lexicographic => Ok(self.chromosomes().map(String::from).collect()),
            ChromOrder::Natural => {
                let mut names: Vec<String> = self.chromosomes().map(String::from).collect();
                natural_sort(&mut names);
                Ok(names)
            }
            ChromOrder::Explicit(names) => names.iter().map(|c| self.resolve(c)).collect(),
        }
    }

    /// Concatenate all channels into one vector
    ///
    /// Stranded tables yield every `-` channel first, then every `+` channel.
    pub fn flatten(&self, order: &ChromOrder) -> Result<Vec<T>> {
        let names = self.ordered_chromosomes(order)?;
        let strands: Vec<Option<Strand>> = match self.layout() {
            Layout::Stranded => vec![Some(Strand::Minus), Some(Strand::Plus)],
            Layout::Unstranded => vec![None],
        };
        let total: usize = names.iter().map(|c| self.chrom_len(c).unwrap_or(0)).sum::<usize>() * strands.len();
        let mut flat = Vec::with_capacity(total);
        for strand in &strands {
            for chrom in &names {
                flat.extend_from_slice(self.channel(chrom, *strand)?);
            }
        }
        Ok(flat)
    }

    /// Sum of every value in every channel
    pub fn sum(&self) -> f64 {
        self.track_map()
            .par_iter()
            .map(|(_, channels)| {
                channels
                    .iter()
                    .map(|t| t.as_slice().iter().map(|v| v.to_f64()).sum::<f64>())
                    .sum::<f64>()
            })
            .sum()
    }

    /// Largest value, `None` for a table without positions
    pub fn max(&self) -> Option<f64> {
        self.track_map()
            .par_iter()
            .flat_map_iter(|(_, channels)| channels.iter())
            .filter_map(|t| t.as_slice().iter().map(|v| v.to_f64()).reduce(f64::max))
            .reduce_with(f64::max)
    }

    /// Zero-filled table with the same shape and metadata
    pub fn empty_copy(&self) -> Self {
        let tracks = self
            .track_map()
            .iter()
            .map(|(chrom, channels)| (chrom.clone(), channels.iter().map(|t| Track::zeros(t.len())).collect()))
            .collect();
        self.derive(self.layout(), tracks)
    }

    /// Zero-filled unstranded table over the same chromosomes
    pub fn single_stranded_empty_copy(&self) -> Self {
        let tracks = self
            .assembly()
            .lengths
            .iter()
            .map(|(chrom, len)| (chrom.clone(), vec![Track::zeros(*len)]))
            .collect();
        self.derive(Layout::Unstranded, tracks)
    }

    /// One channel of a stranded table as an unstranded table
    pub fn one_strand(&self, strand: Strand) -> Result<Self> {
        self.require(Layout::Stranded)?;
        let tracks = self
            .track_map()
            .iter()
            .map(|(chrom, channels)| (chrom.clone(), vec![channels[strand.index()].clone()]))
            .collect();
        Ok(self.derive(Layout::Unstranded, tracks))
    }

    /// Collapse the two channels with `f(plus, minus)`
    pub fn combine_strands(&self, f: impl Fn(f64, f64) -> f64 + Sync + Send) -> Result<Self> {
        self.require(Layout::Stranded)?;
        let tracks = self
            .track_map()
            .par_iter()
            .map(|(chrom, channels)| {
                let plus = channels[Strand::Plus.index()].as_slice();
                let minus = channels[Strand::Minus.index()].as_slice();
                let merged = plus
                    .iter()
                    .zip(minus)
                    .map(|(p, m)| T::from_f64(f(p.to_f64(), m.to_f64())))
                    .collect();
                (chrom.clone(), vec![Track::Owned(merged)])
            })
            .collect();
        Ok(self.derive(Layout::Unstranded, tracks))
    }

    /// Keep `include` (all when `None`) minus `exclude`; coverage is recomputed
    pub fn trim_chromosomes(&mut self, include: Option<&[String]>, exclude: &[String]) {
        let dialect = self.dialect();
        let mut keep: Vec<String> = match include {
            Some(names) => names.iter().map(|c| dialect.translate(c)).collect(),
            None => self.chromosomes().map(String::from).collect(),
        };
        let exclude: Vec<String> = exclude.iter().map(|c| dialect.translate(c)).collect();
        keep.retain(|c| !exclude.contains(c));

        log::info!("Trimming {} to chromosomes: {}", self.name(), keep.join(", "));
        self.track_map_mut().retain(|chrom, _| keep.contains(chrom));
        self.assembly_mut().lengths.retain(|chrom, _| keep.contains(chrom));
        self.update_coverage();
    }

    /// Scale by `new_coverage / coverage`; a normalized table is left alone
    pub fn normalize(&mut self, new_coverage: f64) -> Result<()> {
        if self.meta().is_normalized {
            log::info!("{} is already normalized", self.name());
            return Ok(());
        }
        let coverage = self.meta().coverage;
        if coverage <= 0.0 || !coverage.is_finite() {
            return Err(EngineError::InvalidParameter(format!(
                "cannot normalize {} with coverage {}",
                self.name(),
                coverage
            )));
        }
        log::info!("Normalizing {} from coverage {} to {}", self.name(), coverage, new_coverage);
        self.combine_in_place(Operand::scalar(new_coverage / coverage), BinaryOp::Mul)?;
        let meta = self.meta_mut();
        meta.is_normalized = true;
        meta.coverage = new_coverage;
        Ok(())
    }

    /// Per-position mean over `tables`
    pub fn mean(tables: &[&SignalTable<T>]) -> Result<Self> {
        Self::ensemble("mean", tables, |values| values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Per-position population variance over `tables`
    pub fn var(tables: &[&SignalTable<T>]) -> Result<Self> {
        Self::ensemble("var", tables, variance)
    }

    pub fn std(tables: &[&SignalTable<T>]) -> Result<Self> {
        Self::ensemble("std", tables, |values| variance(values).sqrt())
    }

    pub fn product(tables: &[&SignalTable<T>]) -> Result<Self> {
        Self::ensemble("product", tables, |values| values.iter().product())
    }

    /// Reduce aligned positions of several tables
    ///
    /// Only chromosomes present in every input are kept; the result is
    /// normalized when every input is.
    fn ensemble(label: &str, tables: &[&SignalTable<T>], reduce: impl Fn(&[f64]) -> f64 + Sync + Send) -> Result<Self> {
        let first = tables
            .first()
            .ok_or_else(|| EngineError::InvalidParameter(format!("{} of zero tables", label)))?;
        log::info!("Computing the {} of {} tables", label, tables.len());

        let mut shared: Vec<(String, usize)> = Vec::new();
        for (chrom, len) in &first.assembly().lengths {
            let mut present = true;
            for table in tables {
                table.require(first.layout())?;
                match table.chrom_len(chrom) {
                    Ok(l) if l == *len => {}
                    Ok(l) => {
                        return Err(EngineError::ShapeMismatch {
                            chrom: chrom.clone(),
                            left: *len,
                            right: l,
                        })
                    }
                    Err(_) => present = false,
                }
            }
            if present {
                shared.push((chrom.clone(), *len));
            }
        }

        let channels = first.layout().channels();
        let tracks: BTreeMap<String, Vec<Track<T>>> = shared
            .par_iter()
            .map(|(chrom, len)| -> Result<(String, Vec<Track<T>>)> {
                let inputs: Vec<&[Track<T>]> = tables
                    .iter()
                    .map(|t| t.tracks_of(chrom))
                    .collect::<Result<_>>()?;
                let mut buffer = vec![0.0; tables.len()];
                let out = (0..channels)
                    .map(|c| {
                        let values = (0..*len)
                            .map(|i| {
                                for (slot, input) in buffer.iter_mut().zip(&inputs) {
                                    *slot = input[c].as_slice()[i].to_f64();
                                }
                                T::from_f64(reduce(&buffer))
                            })
                            .collect();
                        Track::Owned(values)
                    })
                    .collect();
                Ok((chrom.clone(), out))
            })
            .collect::<Result<_>>()?;

        let mut out = first.derive(first.layout(), tracks);
        out.assembly_mut().lengths.retain(|chrom, _| shared.iter().any(|(c, _)| c == chrom));
        out.meta_mut().is_normalized = tables.iter().all(|t| t.meta().is_normalized);
        out.set_name(&format!("{}_{}", label, first.name()));
        Ok(out)
    }
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assembly::Assembly;
    use crate::core::dialect::ChromDialect;

    fn table(values: &[(&str, Vec<f64>)]) -> SignalTable<f64> {
        let asm = Assembly::from_lengths("t", values.iter().map(|(c, v)| (*c, v.len())), &ChromDialect::AsIs);
        let mut t = SignalTable::create("t", &asm, ChromDialect::AsIs, Layout::Unstranded);
        for (chrom, v) in values {
            t.channel_mut(chrom, None).unwrap().copy_from_slice(v);
        }
        t
    }

    #[test]
    fn test_masked_divide() {
        let a = table(&[("chr1", vec![1.0, 2.0, 3.0])]);
        let b = table(&[("chr1", vec![0.0, 4.0, 0.0])]);
        let q = a.div(&b).unwrap();
        assert_eq!(q.channel("chr1", None).unwrap(), &[0.0, 0.5, 0.0]);
        assert!(a.div_scalar(0.0).channel("chr1", None).unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_shape_mismatch_leaves_input_untouched() {
        let mut a = table(&[("chr1", vec![1.0, 2.0])]);
        let b = table(&[("chr1", vec![1.0, 2.0, 3.0])]);
        let err = a.combine_in_place(Operand::Table(&b), BinaryOp::Add).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch { .. }));
        assert_eq!(a.channel("chr1", None).unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_combine_across_element_types() {
        let a = table(&[("chr1", vec![1.5, 2.5])]);
        let b = a.cast::<u32>();
        let s = a.add(&b).unwrap();
        assert_eq!(s.channel("chr1", None).unwrap(), &[2.5, 4.5]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let a = table(&[("chr1", vec![1.0, 2.0, 3.0, 4.0])]);
        let t = a.threshold(Some(1.0), Some(4.0));
        assert_eq!(t.channel("chr1", None).unwrap(), &[0.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_flatten_orders() {
        let a = table(&[("chr10", vec![10.0]), ("chr2", vec![2.0])]);
        assert_eq!(a.flatten(&ChromOrder::Lexicographic).unwrap(), vec![10.0, 2.0]);
        assert_eq!(a.flatten(&ChromOrder::Natural).unwrap(), vec![2.0, 10.0]);
        let explicit = ChromOrder::Explicit(vec!["chr2".into()]);
        assert_eq!(a.flatten(&explicit).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_flatten_stranded_minus_first() {
        let asm = Assembly::from_lengths("t", [("chr1", 2)], &ChromDialect::AsIs);
        let mut t = SignalTable::<f32>::create("t", &asm, ChromDialect::AsIs, Layout::Stranded);
        t.channel_mut("chr1", Some(Strand::Plus)).unwrap().fill(1.0);
        t.channel_mut("chr1", Some(Strand::Minus)).unwrap().fill(-1.0);
        assert_eq!(t.flatten(&ChromOrder::default()).unwrap(), vec![-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_normalize_applies_once() {
        let mut a = table(&[("chr1", vec![2.0, 4.0])]);
        a.meta_mut().total_read_length = 6.0;
        a.update_coverage();
        a.normalize(1.0).unwrap();
        assert_eq!(a.channel("chr1", None).unwrap(), &[2.0 / 3.0, 4.0 / 3.0]);
        a.normalize(1.0).unwrap();
        assert_eq!(a.channel("chr1", None).unwrap(), &[2.0 / 3.0, 4.0 / 3.0]);
        assert!(a.meta().is_normalized);
    }

    #[test]
    fn test_ensemble_uses_shared_chromosomes() {
        let a = table(&[("chr1", vec![1.0, 3.0]), ("chr2", vec![5.0])]);
        let b = table(&[("chr1", vec![3.0, 3.0])]);
        let mean = SignalTable::mean(&[&a, &b]).unwrap();
        assert_eq!(mean.chromosomes().collect::<Vec<_>>(), vec!["chr1"]);
        assert_eq!(mean.channel("chr1", None).unwrap(), &[2.0, 3.0]);
        let var = SignalTable::var(&[&a, &b]).unwrap();
        assert_eq!(var.channel("chr1", None).unwrap(), &[1.0, 0.0]);
        assert_eq!(var.genome_size(), 2);
    }

    #[test]
    fn test_trim_recomputes_coverage() {
        let mut a = table(&[("chr1", vec![0.0; 4]), ("chr2", vec![0.0; 4])]);
        a.meta_mut().total_read_length = 8.0;
        a.update_coverage();
        assert_eq!(a.meta().coverage, 1.0);
        a.trim_chromosomes(None, &["chr2".to_string()]);
        assert_eq!(a.meta().coverage, 2.0);
        assert!(!a.contains("chr2"));
    }

    #[test]
    fn test_logical_ops() {
        let a = table(&[("chr1", vec![0.0, 1.0, 2.0, 0.0])]);
        let b = table(&[("chr1", vec![0.0, 0.0, 3.0, 4.0])]);
        assert_eq!(a.logical_and(&b).unwrap().channel("chr1", None).unwrap(), &[false, false, true, false]);
        assert_eq!(a.logical_or(&b).unwrap().channel("chr1", None).unwrap(), &[false, true, true, true]);
        assert_eq!(a.logical_not().channel("chr1", None).unwrap(), &[true, false, false, true]);
    }

    #[test]
    fn test_scalar_ops_and_clip() {
        let a = table(&[("chr1", vec![-2.0, 0.5, 3.0])]);
        assert_eq!(a.add_scalar(1.0).sub_scalar(0.5).channel("chr1", None).unwrap(), &[-1.5, 1.0, 3.5]);
        assert_eq!(a.clip(Some(0.0), None).channel("chr1", None).unwrap(), &[0.0, 0.5, 3.0]);
        assert_eq!(a.clip(None, Some(1.0)).channel("chr1", None).unwrap(), &[-2.0, 0.5, 1.0]);
        assert_eq!(a.map_values(f64::abs).channel("chr1", None).unwrap(), &[2.0, 0.5, 3.0]);
        assert_eq!(a.sub(&a).unwrap().sum(), 0.0);
    }

    #[test]
    fn test_smooth_keeps_mass_and_rejects_bad_sigma() {
        let mut values = vec![0.0; 41];
        values[20] = 1.0;
        let a = table(&[("chr1", values)]);
        let s = a.smooth(2.0).unwrap();
        assert!((s.sum() - 1.0).abs() < 1e-9);
        let smoothed = s.channel("chr1", None).unwrap();
        assert!(smoothed[20] < 1.0 && smoothed[19] > 0.0 && (smoothed[19] - smoothed[21]).abs() < 1e-12);
        assert!(a.smooth(-1.0).is_err());
    }

    #[test]
    fn test_strand_collapse_and_empty_copies() {
        let asm = Assembly::from_lengths("t", [("chr1", 3)], &ChromDialect::AsIs);
        let mut t = SignalTable::<f64>::create("t", &asm, ChromDialect::AsIs, Layout::Stranded);
        t.channel_mut("chr1", Some(Strand::Plus)).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        t.channel_mut("chr1", Some(Strand::Minus)).unwrap().copy_from_slice(&[3.0, 0.0, 1.0]);

        let maxed = t.combine_strands(f64::max).unwrap();
        assert_eq!(maxed.layout(), Layout::Unstranded);
        assert_eq!(maxed.channel("chr1", None).unwrap(), &[3.0, 2.0, 3.0]);

        let single = t.single_stranded_empty_copy();
        assert_eq!(single.layout(), Layout::Unstranded);
        assert_eq!(single.channel("chr1", None).unwrap(), &[0.0; 3]);
        let empty = t.empty_copy();
        assert_eq!(empty.layout(), Layout::Stranded);
        assert_eq!(empty.sum(), 0.0);

        assert!(maxed.combine_strands(f64::max).is_err());
    }

    #[test]
    fn test_max_and_sum() {
        let a = table(&[("chr1", vec![-1.0, 7.0]), ("chr2", vec![3.0])]);
        assert_eq!(a.max(), Some(7.0));
        assert_eq!(a.sum(), 9.0);
    }
}
