//! Signal transforms
//!
//! Table-to-table operations on stranded read signal: fragment extension,
//! soft masks, strand mixdown and hard masks. Each returns a new table and
//! leaves its input untouched. Window sums run in O(n) per chunk.

use crate::core::element::Element;
use crate::core::{
    BinaryOp, EngineConfig, EngineError, Layout, Operand, Result, SignalTable, Track, WorkerPool,
};
use crate::engine::{back_window, forward_window, map_chunks};

const PLUS: usize = 0;
const MINUS: usize = 1;

/// Default threshold of [`HardMaskPolicy::Conservative`]
pub const DEFAULT_HARD_MASK_THRESHOLD: f64 = 1.999;

fn check_length(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(EngineError::InvalidParameter(format!("{} must be positive", name)));
    }
    Ok(())
}

/// Spread each read start over the fragment it implies
///
/// On `+`, position `j` collects the starts in `[j - F + 1, j]`; on `-` the
/// starts in `[j, j + F - 1]`.
pub fn fragment_extend<T: Element>(
    table: &SignalTable<T>,
    fragment_length: usize,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<SignalTable<T>> {
    table.require(Layout::Stranded)?;
    check_length("fragment length", fragment_length)?;
    log::info!("Extending {} to fragment length {}", table.name(), fragment_length);

    let tracks = map_chunks(table, 2, pool, config.max_payload, |channels, channel, range| {
        let values = channels[channel].as_slice();
        let sums = if channel == PLUS {
            back_window(values, range, fragment_length)
        } else {
            forward_window(values, range, fragment_length)
        };
        sums.into_iter().map(T::from_f64).collect()
    })?;

    let mut extended = table.derive(Layout::Stranded, tracks);
    extended.meta_mut().fragment_size = Some(fragment_length);
    Ok(extended)
}

/// Fraction of possible fragment starts that are alignable
///
/// `starts` holds alignable read starts on its `+` channel. The `+` channel
/// of the mask is the back window of width `F` divided by `F`; the `-`
/// channel is the `+` channel shifted left by `F - R`, zero past the end.
pub fn soft_mask<T: Element>(
    starts: &SignalTable<T>,
    read_length: usize,
    fragment_length: usize,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<SignalTable<f32>> {
    starts.require(Layout::Stranded)?;
    check_length("read length", read_length)?;
    check_length("fragment length", fragment_length)?;
    if fragment_length < read_length {
        return Err(EngineError::InvalidParameter(format!(
            "fragment length {} is shorter than read length {}",
            fragment_length, read_length
        )));
    }
    let offset = fragment_length - read_length;
    let scale = fragment_length as f64;
    log::info!(
        "Building soft mask from {} (read length {}, fragment length {})",
        starts.name(),
        read_length,
        fragment_length
    );

    let tracks = map_chunks(starts, 2, pool, config.max_payload, |channels, channel, range| {
        let values = channels[PLUS].as_slice();
        let n = values.len();
        let len = range.len();
        let mut out: Vec<f32> = if channel == PLUS {
            back_window(values, range, fragment_length)
                .into_iter()
                .map(|v| (v / scale) as f32)
                .collect()
        } else {
            let shifted = (range.start + offset).min(n)..(range.end + offset).min(n);
            back_window(values, shifted, fragment_length)
                .into_iter()
                .map(|v| (v / scale) as f32)
                .collect()
        };
        out.resize(len, 0.0);
        out
    })?;

    let mut mask = starts.derive(Layout::Stranded, tracks);
    mask.set_name(&format!("{}_soft_mask", starts.name()));
    mask.meta_mut().fragment_size = Some(fragment_length);
    Ok(mask)
}

/// Divide each channel by the matching soft-mask channel, 0 where the mask is 0
pub fn apply_soft_mask<T: Element, M: Element>(table: &SignalTable<T>, mask: &SignalTable<M>) -> Result<SignalTable<T>> {
    table.require(mask.layout())?;
    table.combine(Operand::Table(mask), BinaryOp::Div)
}

/// How to fold the two strands into one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixdownMode {
    /// `out[j] = +[j - s] + -[j + s]`
    Shift(usize),
    /// `out[j] = Σ_{i ≤ e} +[j - i] + Σ_{i ≤ e} -[j + i]`
    Extend(usize),
}

impl Default for MixdownMode {
    fn default() -> Self {
        MixdownMode::Shift(0)
    }
}

impl MixdownMode {
    /// At most one of `strand_shift` and `extend` may be non-zero
    pub fn from_params(strand_shift: usize, extend: usize) -> Result<Self> {
        match (strand_shift, extend) {
            (0, 0) => Ok(MixdownMode::Shift(0)),
            (s, 0) => Ok(MixdownMode::Shift(s)),
            (0, e) => Ok(MixdownMode::Extend(e)),
            (s, e) => Err(EngineError::InvalidParameter(format!(
                "mixdown takes a strand shift or an extension, not both (got {} and {})",
                s, e
            ))),
        }
    }
}

fn mixdown_chunk<T: Element>(channels: &[Track<T>], mode: MixdownMode, range: std::ops::Range<usize>) -> Vec<f64> {
    let plus = channels[PLUS].as_slice();
    let minus = channels[MINUS].as_slice();
    let n = plus.len();
    match mode {
        MixdownMode::Shift(s) => range
            .map(|j| {
                let p = if j >= s { plus[j - s].to_f64() } else { 0.0 };
                let m = if j + s < n { minus[j + s].to_f64() } else { 0.0 };
                p + m
            })
            .collect(),
        MixdownMode::Extend(e) => {
            let p = back_window(plus, range.clone(), e + 1);
            let m = forward_window(minus, range, e + 1);
            p.into_iter().zip(m).map(|(a, b)| a + b).collect()
        }
    }
}

/// Fold a stranded table into an unstranded one
pub fn mixdown<T: Element>(
    table: &SignalTable<T>,
    mode: MixdownMode,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<SignalTable<T>> {
    table.require(Layout::Stranded)?;
    log::info!("Mixing down {} ({:?})", table.name(), mode);
    let tracks = map_chunks(table, 1, pool, config.max_payload, |channels, _, range| {
        mixdown_chunk(channels, mode, range)
            .into_iter()
            .map(T::from_f64)
            .collect()
    })?;
    Ok(table.derive(Layout::Unstranded, tracks))
}

/// Rule turning a mixed-down soft mask into a hard mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HardMaskPolicy {
    /// Any alignable signal
    Permissive,
    /// Mixed-down mask at least `threshold`
    Conservative { threshold: f64 },
}

impl HardMaskPolicy {
    pub fn conservative() -> Self {
        HardMaskPolicy::Conservative {
            threshold: DEFAULT_HARD_MASK_THRESHOLD,
        }
    }

    fn keeps(&self, value: f64) -> bool {
        match self {
            HardMaskPolicy::Permissive => value > 0.0,
            HardMaskPolicy::Conservative { threshold } => value >= *threshold,
        }
    }
}

/// Positions where signal can be observed at all
pub fn hard_mask<T: Element>(
    soft_mask: &SignalTable<T>,
    policy: HardMaskPolicy,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> Result<SignalTable<bool>> {
    soft_mask.require(Layout::Stranded)?;
    log::info!("Deriving hard mask from {} ({:?})", soft_mask.name(), policy);
    let tracks = map_chunks(soft_mask, 1, pool, config.max_payload, |channels, _, range| {
        mixdown_chunk(channels, MixdownMode::Shift(0), range)
            .into_iter()
            .map(|v| policy.keeps(v))
            .collect()
    })?;
    let mut mask = soft_mask.derive(Layout::Unstranded, tracks);
    mask.set_name(&format!("{}_hard_mask", soft_mask.name()));
    Ok(mask)
}

/// Apply a probability function to an energy-valued table
pub fn binding_probability<T: Element>(
    energies: &SignalTable<T>,
    probability: impl Fn(f64) -> f64 + Sync + Send,
    nan_to_zero: bool,
) -> SignalTable<f64> {
    energies.map_into(|e| {
        let p = probability(e);
        if nan_to_zero && p.is_nan() {
            0.0
        } else {
            p
        }
    })
}
