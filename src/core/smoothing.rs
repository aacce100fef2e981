//! One-dimensional Gaussian smoothing
//!
//! Matches the common "reflect" convention: the signal is mirrored about
//! its edges including the edge sample (`d c b a | a b c d | d c b a`), and
//! the kernel is truncated at four standard deviations.

use crate::core::error::{EngineError, Result};

/// Kernel half-width in standard deviations
pub const TRUNCATE: f64 = 4.0;

/// Normalized Gaussian kernel of radius `round(TRUNCATE * sigma)`
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= total;
    }
    kernel
}

#[inline]
fn reflect(idx: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let mut i = idx.rem_euclid(period);
    if i >= len as isize {
        i = period - 1 - i;
    }
    i as usize
}

/// Smooth `values` with a Gaussian of standard deviation `sigma`
///
/// `sigma == 0` returns the input unchanged.
///
/// # Examples
/// ```
/// use pileup_engine::core::gaussian_filter1d;
///
/// let flat = gaussian_filter1d(&[2.0; 10], 1.5).unwrap();
/// assert!(flat.iter().all(|v| (v - 2.0).abs() < 1e-12));
/// ```
pub fn gaussian_filter1d(values: &[f64], sigma: f64) -> Result<Vec<f64>> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(EngineError::InvalidParameter(format!(
            "smoothing sigma must be a non-negative number, got {}",
            sigma
        )));
    }
    if sigma == 0.0 || values.is_empty() {
        return Ok(values.to_vec());
    }

    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let len = values.len();
    let mut out = vec![0.0; len];

    for (j, slot) in out.iter_mut().enumerate() {
        let centre = j as isize;
        let mut acc = 0.0;
        if centre >= radius && centre + radius < len as isize {
            let window = &values[(centre - radius) as usize..=(centre + radius) as usize];
            for (w, v) in kernel.iter().zip(window) {
                acc += w * v;
            }
        } else {
            for (k, w) in kernel.iter().enumerate() {
                acc += w * values[reflect(centre + k as isize - radius, len)];
            }
        }
        *slot = acc;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_sums_to_one() {
        for sigma in [0.5, 1.0, 3.0, 10.0] {
            let k = gaussian_kernel(sigma);
            assert_eq!(k.len(), 2 * ((4.0 * sigma + 0.5) as usize) + 1);
            assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(9, 4), 1);
    }

    #[test]
    fn test_mass_preserved_away_from_edges() {
        let mut values = vec![0.0; 200];
        values[100] = 1.0;
        let smoothed = gaussian_filter1d(&values, 3.0).unwrap();
        assert!((smoothed.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(smoothed[100] > smoothed[99] && smoothed[99] > smoothed[90]);
    }

    #[test]
    fn test_short_input_uses_reflection() {
        let smoothed = gaussian_filter1d(&[1.0, 0.0], 1.0).unwrap();
        assert!(smoothed[0] > smoothed[1]);
        assert!(smoothed.iter().all(|v| *v > 0.0 && *v < 1.0));
    }

    #[test]
    fn test_negative_sigma_rejected() {
        assert!(gaussian_filter1d(&[1.0], -1.0).is_err());
    }
}
