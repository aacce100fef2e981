//! Signal engine
//!
//! Operations that build, transform, estimate from, relocate and persist
//! signal tables. Everything that touches whole chromosomes runs on a
//! [`WorkerPool`](crate::core::WorkerPool) with payload-bounded chunks.

pub mod fragsize;
pub mod ingest;
pub mod liftover;
pub mod persist;
pub mod pipeline;
pub mod transform;

use crate::core::element::Element;
use crate::core::{split_bounds, Result, SignalTable, Track, WorkerPool, POLL_STRIDE};
use std::collections::BTreeMap;
use std::ops::Range;

/// Build `out_channels` new tracks per chromosome, chunk by chunk
///
/// `f(channels, out_channel, range)` returns the output values for `range`
/// of one output channel and may read any position of the input channels.
/// Chunks are at most `max_payload` elements and are concatenated back in
/// order. Each chunk is produced [`POLL_STRIDE`] positions at a time with a
/// token check in between, so a cancelled pool stops mid-chunk.
pub(crate) fn map_chunks<T, V, F>(
    table: &SignalTable<T>,
    out_channels: usize,
    pool: &WorkerPool,
    max_payload: usize,
    f: F,
) -> Result<BTreeMap<String, Vec<Track<V>>>>
where
    T: Element,
    V: Element,
    F: Fn(&[Track<T>], usize, Range<usize>) -> Vec<V> + Sync + Send,
{
    let chroms: Vec<(&str, &[Track<T>])> = table.iter().collect();
    let mut tasks = Vec::new();
    for (idx, (_, channels)) in chroms.iter().enumerate() {
        let len = channels.first().map(Track::len).unwrap_or(0);
        for channel in 0..out_channels {
            for range in split_bounds(len, max_payload) {
                tasks.push((idx, channel, range));
            }
        }
    }
    log::debug!("{} chunk tasks over {} chromosomes", tasks.len(), chroms.len());

    let chunks = pool.run_sized(
        tasks.clone(),
        |(_, _, range)| range.len(),
        |(idx, channel, range)| {
            let mut out = Vec::with_capacity(range.len());
            let mut start = range.start;
            while start < range.end {
                pool.token().check()?;
                let end = (start + POLL_STRIDE).min(range.end);
                out.extend(f(chroms[idx].1, channel, start..end));
                start = end;
            }
            Ok(out)
        },
    )?;

    let mut merged: Vec<Vec<Vec<V>>> = chroms
        .iter()
        .map(|(_, channels)| {
            let len = channels.first().map(Track::len).unwrap_or(0);
            (0..out_channels).map(|_| Vec::with_capacity(len)).collect()
        })
        .collect();
    for ((idx, channel, _), chunk) in tasks.into_iter().zip(chunks) {
        merged[idx][channel].extend(chunk);
    }

    Ok(chroms
        .iter()
        .zip(merged)
        .map(|((chrom, _), channels)| {
            (chrom.to_string(), channels.into_iter().map(Track::from_vec).collect())
        })
        .collect())
}

/// `out[j] = Σ_{i < width} values[j - i]` for `j` in `range`
pub(crate) fn back_window<T: Element>(values: &[T], range: Range<usize>, width: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(range.len());
    if range.is_empty() || width == 0 {
        out.resize(range.len(), 0.0);
        return out;
    }
    let first = range.start;
    let mut sum: f64 = values[(first + 1).saturating_sub(width)..=first]
        .iter()
        .map(|v| v.to_f64())
        .sum();
    for j in range {
        if j > first {
            sum += values[j].to_f64();
            if j >= width {
                sum -= values[j - width].to_f64();
            }
        }
        out.push(sum);
    }
    out
}

/// `out[j] = Σ_{i < width} values[j + i]` for `j` in `range`, zero past the end
pub(crate) fn forward_window<T: Element>(values: &[T], range: Range<usize>, width: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = Vec::with_capacity(range.len());
    if range.is_empty() || width == 0 {
        out.resize(range.len(), 0.0);
        return out;
    }
    let first = range.start;
    let mut sum: f64 = values[first..(first + width).min(n)].iter().map(|v| v.to_f64()).sum();
    for j in range {
        if j > first {
            sum -= values[j - 1].to_f64();
            if j + width - 1 < n {
                sum += values[j + width - 1].to_f64();
            }
        }
        out.push(sum);
    }
    out
}
