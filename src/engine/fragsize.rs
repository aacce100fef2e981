//! Fragment-size estimation by strand cross-correlation
//!
//! Reads on `+` and `-` come from opposite ends of the same fragments, so the
//! `-` start signal looks like the `+` start signal shifted by the fragment
//! length. The lag at which their cross-correlation peaks is the estimate.
//!
//! Each chromosome is cut into chunks of at most half the payload ceiling.
//! Per chunk, `C(L) = Σ_i neg[i] · pos[i - L]` is computed for every lag in
//! the search window with a zero-padded FFT; the per-lag values of all chunks
//! are averaged, differentiated, smoothed, and the first falling zero
//! crossing of the smoothed derivative marks the peak.

use crate::core::element::Element;
use crate::core::io::open_text;
use crate::core::{
    gaussian_filter1d, split_bounds, EngineConfig, EngineError, Layout, Result, SignalTable, WorkerPool,
};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thread_local::ThreadLocal;

/// Search window and smoothing of the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentSizeParams {
    /// First lag considered
    pub search_start: usize,
    /// One past the last lag considered
    pub search_end: usize,
    /// Gaussian sigma applied to the derivative of the correlation curve
    pub smoothing_sigma: f64,
}

impl Default for FragmentSizeParams {
    fn default() -> Self {
        Self {
            search_start: 50,
            search_end: 500,
            smoothing_sigma: 10.0,
        }
    }
}

impl FragmentSizeParams {
    pub fn validate(&self) -> Result<()> {
        if self.search_end <= self.search_start + 1 {
            return Err(EngineError::InvalidParameter(format!(
                "fragment-size search window [{}, {}) is too narrow",
                self.search_start, self.search_end
            )));
        }
        Ok(())
    }
}

/// Result of an estimate
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSizeEstimate {
    pub fragment_length: usize,
    /// `fragment_length / 2`, the strand shift that centers both strands
    pub half_shift: usize,
    /// Mean correlation per lag, starting at `search_start`
    pub curve: Vec<f64>,
    /// Every falling zero crossing, as fragment lengths
    pub candidates: Vec<usize>,
}

/// Running per-lag sum of chunk correlations
#[derive(Debug, Clone)]
struct LagAccumulator {
    sum: Vec<f64>,
    count: Vec<usize>,
}

impl LagAccumulator {
    fn new(lags: usize) -> Self {
        Self {
            sum: vec![0.0; lags],
            count: vec![0; lags],
        }
    }

    fn add(&mut self, values: &[f64]) {
        for (i, v) in values.iter().enumerate().take(self.sum.len()) {
            self.sum[i] += v;
            self.count[i] += 1;
        }
    }

    /// Mean per lag, cut at the first lag no chunk reached
    fn mean(&self) -> Vec<f64> {
        self.sum
            .iter()
            .zip(&self.count)
            .take_while(|(_, c)| **c > 0)
            .map(|(s, c)| s / *c as f64)
            .collect()
    }
}

/// Cross-correlation of one chunk pair for lags in `[lag_start, lag_end)`
///
/// Lags that do not fit inside the chunk are left out, so the result may be
/// shorter than the window.
pub fn cross_correlate(
    neg: &[f64],
    pos: &[f64],
    lag_start: usize,
    lag_end: usize,
    planner: &mut FftPlanner<f64>,
) -> Vec<f64> {
    let n = neg.len().min(pos.len());
    let lag_end = lag_end.min(n);
    if lag_start >= lag_end {
        return Vec::new();
    }
    let size = (n + lag_end).next_power_of_two();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let to_complex = |values: &[f64]| -> Vec<Complex<f64>> {
        let mut buffer: Vec<Complex<f64>> = values[..n].iter().map(|v| Complex::new(*v, 0.0)).collect();
        buffer.resize(size, Complex::new(0.0, 0.0));
        buffer
    };
    let mut a = to_complex(neg);
    let mut b = to_complex(pos);
    forward.process(&mut a);
    forward.process(&mut b);
    for (x, y) in a.iter_mut().zip(&b) {
        *x *= y.conj();
    }
    inverse.process(&mut a);

    let scale = 1.0 / size as f64;
    a[lag_start..lag_end].iter().map(|c| c.re * scale).collect()
}

/// First difference, last element 0
fn finite_difference(curve: &[f64]) -> Vec<f64> {
    let mut diff: Vec<f64> = curve.windows(2).map(|w| w[1] - w[0]).collect();
    if !curve.is_empty() {
        diff.push(0.0);
    }
    diff
}

/// Indices where `signal` goes from non-negative to negative, from index 1 on
///
/// Magnitudes at or below `floor` count as zero.
fn falling_zero_crossings(signal: &[f64], floor: f64) -> Vec<usize> {
    let sign = |v: f64| if v.abs() <= floor { 0.0 } else { v };
    let mut crossings = Vec::new();
    if signal.len() < 2 {
        return crossings;
    }
    let mut prev = sign(signal[0]);
    for (i, v) in signal.iter().enumerate().skip(1) {
        let cur = sign(*v);
        if prev >= 0.0 && cur < 0.0 {
            crossings.push(i);
        }
        prev = cur;
    }
    crossings
}

/// Locate the peak of a mean correlation curve
pub fn fragment_size_from_curve(curve: Vec<f64>, params: &FragmentSizeParams) -> Result<FragmentSizeEstimate> {
    let not_found = || EngineError::NoFragmentSizeFound {
        search_start: params.search_start,
        search_end: params.search_end,
    };
    if curve.len() < 2 {
        return Err(not_found());
    }
    let smoothed = gaussian_filter1d(&finite_difference(&curve), params.smoothing_sigma)?;
    let peak = smoothed.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let candidates: Vec<usize> = falling_zero_crossings(&smoothed, peak * 1e-9)
        .into_iter()
        .map(|i| params.search_start + i)
        .collect();
    let fragment_length = *candidates.first().ok_or_else(not_found)?;
    log::info!(
        "Candidate fragment lengths: {}",
        candidates.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
    );
    Ok(FragmentSizeEstimate {
        fragment_length,
        half_shift: fragment_length / 2,
        curve,
        candidates,
    })
}

/// Estimate the fragment length of a stranded read-start table
pub fn estimate_fragment_size<T: Element>(
    starts: &SignalTable<T>,
    params: &FragmentSizeParams,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<FragmentSizeEstimate> {
    starts.require(Layout::Stranded)?;
    params.validate()?;
    let start_time = Instant::now();
    let chunk_limit = (config.max_payload / 2).max(1);
    log::info!(
        "Estimating fragment size of {} by cross-correlation over lags {}..{}",
        starts.name(),
        params.search_start,
        params.search_end
    );

    let mut tasks = Vec::new();
    let mut skipped = 0usize;
    for (chrom, channels) in starts.iter() {
        let (pos, neg) = (channels[0].as_slice(), channels[1].as_slice());
        let bounds = split_bounds(pos.len(), chunk_limit);
        log::debug!("Splitting {} of size {} into {} chunks", chrom, pos.len(), bounds.len());
        for range in bounds {
            let empty = |values: &[T]| values.iter().all(|v| v.to_f64() == 0.0);
            if empty(&pos[range.clone()]) || empty(&neg[range.clone()]) {
                skipped += 1;
                continue;
            }
            tasks.push((&neg[range.clone()], &pos[range]));
        }
    }
    log::debug!("{} chunks to correlate, {} empty chunks skipped", tasks.len(), skipped);

    let planners: ThreadLocal<RefCell<FftPlanner<f64>>> = ThreadLocal::new();
    let per_chunk = pool.run_sized(
        tasks,
        |(neg, _)| neg.len(),
        |(neg, pos)| {
            let neg: Vec<f64> = neg.iter().map(|v| v.to_f64()).collect();
            let pos: Vec<f64> = pos.iter().map(|v| v.to_f64()).collect();
            pool.token().check()?;
            let mut planner = planners.get_or(|| RefCell::new(FftPlanner::new())).borrow_mut();
            let values = cross_correlate(&neg, &pos, params.search_start, params.search_end, &mut planner);
            pool.token().check()?;
            Ok(values)
        },
    )?;

    let mut accumulator = LagAccumulator::new(params.search_end - params.search_start);
    for values in &per_chunk {
        accumulator.add(values);
    }
    let estimate = fragment_size_from_curve(accumulator.mean(), params)?;
    log::info!(
        "Estimated fragment length {} (half shift {}) in {:.2}s",
        estimate.fragment_length,
        estimate.half_shift,
        start_time.elapsed().as_secs_f64()
    );
    Ok(estimate)
}

/// Fragment lengths cached per replicate in a `replicate<TAB>size` file
#[derive(Debug, Clone)]
pub struct FragmentSizeCache {
    path: PathBuf,
}

impl FragmentSizeCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recently stored size for `replicate`
    pub fn lookup(&self, replicate: &str) -> Result<Option<usize>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut found = None;
        for line in open_text(&self.path)?.lines() {
            let line = line?;
            let mut fields = line.split('\t');
            if let (Some(name), Some(size)) = (fields.next(), fields.next()) {
                if name == replicate {
                    if let Ok(size) = size.trim().parse() {
                        found = Some(size);
                    }
                }
            }
        }
        Ok(found)
    }

    pub fn store(&self, replicate: &str, fragment_length: usize) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}\t{}", replicate, fragment_length)?;
        log::debug!("Cached fragment length {} for {}", fragment_length, replicate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn naive(neg: &[f64], pos: &[f64], lags: std::ops::Range<usize>) -> Vec<f64> {
        lags.map(|l| (l..neg.len()).map(|i| neg[i] * pos[i - l]).sum()).collect()
    }

    #[test]
    fn test_cross_correlate_matches_naive() {
        let pos: Vec<f64> = (0..40).map(|i| ((i * 13) % 7) as f64).collect();
        let neg: Vec<f64> = (0..40).map(|i| ((i * 5) % 3) as f64).collect();
        let mut planner = FftPlanner::new();
        let fast = cross_correlate(&neg, &pos, 2, 12, &mut planner);
        let slow = naive(&neg, &pos, 2..12);
        assert_eq!(fast.len(), 10);
        for (a, b) in fast.iter().zip(&slow) {
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_cross_correlate_short_chunk() {
        let mut planner = FftPlanner::new();
        assert_eq!(cross_correlate(&[1.0; 5], &[1.0; 5], 3, 10, &mut planner).len(), 2);
        assert!(cross_correlate(&[1.0; 5], &[1.0; 5], 6, 10, &mut planner).is_empty());
    }

    #[test]
    fn test_accumulator_truncates_at_first_gap() {
        let mut acc = LagAccumulator::new(4);
        acc.add(&[2.0, 4.0]);
        acc.add(&[4.0, 8.0, 1.0]);
        assert_eq!(acc.mean(), vec![3.0, 6.0, 1.0]);
    }

    #[test]
    fn test_falling_crossings() {
        let signal = [-1.0, 1.0, 2.0, -1.0, -2.0, 1.0, 0.0, -3.0];
        assert_eq!(falling_zero_crossings(&signal, 0.0), vec![3, 7]);
    }

    #[test]
    fn test_falling_crossing_at_second_sample() {
        assert_eq!(falling_zero_crossings(&[1.0, -1.0, -2.0], 0.0), vec![1]);
        assert_eq!(falling_zero_crossings(&[0.0, -0.5, 1.0], 0.0), vec![1]);
        assert!(falling_zero_crossings(&[-1.0, -1.0, -2.0], 0.0).is_empty());
    }

    #[test]
    fn test_curve_peak() {
        let params = FragmentSizeParams {
            search_start: 10,
            search_end: 40,
            smoothing_sigma: 1.0,
        };
        let curve: Vec<f64> = (0..30).map(|i| -((i as f64 - 12.0).powi(2))).collect();
        let estimate = fragment_size_from_curve(curve, &params).unwrap();
        assert_eq!(estimate.fragment_length, 22);
        assert_eq!(estimate.half_shift, 11);
    }

    #[test]
    fn test_flat_curve_has_no_estimate() {
        let params = FragmentSizeParams::default();
        let result = fragment_size_from_curve(vec![1.0; 100], &params);
        assert!(matches!(result, Err(EngineError::NoFragmentSizeFound { .. })));
    }

    #[test]
    fn test_cache_returns_latest() {
        let dir = TempDir::new().unwrap();
        let cache = FragmentSizeCache::new(dir.path().join("sizes.tsv"));
        assert_eq!(cache.lookup("rep1").unwrap(), None);
        cache.store("rep1", 150).unwrap();
        cache.store("rep2", 90).unwrap();
        cache.store("rep1", 160).unwrap();
        assert_eq!(cache.lookup("rep1").unwrap(), Some(160));
        assert_eq!(cache.lookup("rep2").unwrap(), Some(90));
    }
}
