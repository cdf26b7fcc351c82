//! Multi-scale rectangle fitting over an [`EntropyMap`].
//!
//! Minimal entropy is almost always reached by the smallest block, which
//! would make for a tiny calendar. The fitter therefore takes the minimum at
//! the smallest size as a reference, relaxes it by `1 + relax`, and returns
//! the *largest* size whose best block is still under that threshold.
//!
//! ```text
//! sizes:      lo ─────────────────────────── hi
//! reference:  best(lo)              threshold = max(early_stop, best(lo) * (1 + relax))
//! walk:                        hi, hi-1, ... lo+1   → first ≤ threshold wins
//! fallback:   best(lo)
//! ```

use super::map::{Candidate, EntropyMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("invalid size range: min size {min} is greater than max size {max}")]
    InvalidRange { min: f64, max: f64 },
}

/// Parameters for [`fit_rect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    /// Smallest and largest block/grid ratio, measured on the swept dimension.
    pub size_range: (f64, f64),
    /// Entropy (0–255) at or below which a block is always acceptable.
    pub early_stop: f64,
    /// Relative slack over the smallest-size minimum that still accepts a larger block.
    pub relax: f64,
    /// Calendar aspect ratio divided by photo aspect ratio.
    pub ratio_of_ratios: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            size_range: (0.333, 0.8),
            early_stop: 7.0,
            relax: 0.2,
            ratio_of_ratios: 1.0,
        }
    }
}

/// Winning block plus the reference minimum it was judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub candidate: Candidate,
    /// Lowest average at the smallest size in range.
    pub global_min_average: f64,
}

/// Round half up and clamp into `[1, side]`.
fn bound_round(value: f64, side: u32) -> u32 {
    let rounded = (value + 0.5).floor();
    rounded.clamp(1.0, side.max(1) as f64) as u32
}

/// Block shapes to try, ordered smallest to largest.
///
/// The swept dimension runs over `[round(side * lo), round(side * hi)]`. With
/// `rr > 1` the height is derived as `round(sx / rr)`; with `rr < 1` the width
/// is `round(sy * rr)`; `rr == 1` keeps blocks square.
pub fn size_pairs(side: u32, size_range: (f64, f64), rr: f64) -> Vec<(u32, u32)> {
    let lo = bound_round(side as f64 * size_range.0, side);
    let hi = bound_round(side as f64 * size_range.1, side);

    (lo..=hi)
        .map(|s| {
            if rr == 1.0 {
                (s, s)
            } else if rr > 1.0 {
                (s, bound_round(s as f64 / rr, side))
            } else {
                (bound_round(s as f64 * rr, side), s)
            }
        })
        .collect()
}

/// Find the maximal-area, near-minimal-entropy block of `map`.
///
/// Degenerate inputs (a one-cell range, a grid coarser than the range) are
/// not errors: the best attainable block is returned.
pub fn fit_rect(map: &EntropyMap, params: &FitParams) -> Result<FitResult, FitError> {
    let (min, max) = params.size_range;
    if min > max {
        return Err(FitError::InvalidRange { min, max });
    }

    let (side, _) = map.size();
    let pairs = size_pairs(side, params.size_range, params.ratio_of_ratios);
    let Some(&(sx, sy)) = pairs.first() else {
        // lo > hi cannot happen for min <= max; keep the whole grid as a fallback
        let candidate = map.lowest_block_average(side, side, 0.0);
        return Ok(FitResult {
            candidate,
            global_min_average: candidate.average,
        });
    };

    let best = map.lowest_block_average(sx, sy, 0.0);
    // early_stop is not applied to the reference scan: a relaxed non-global
    // minimum could land well above the threshold
    let threshold = params
        .early_stop
        .max(best.average * (1.0 + params.relax));

    for &(sx, sy) in pairs.iter().skip(1).rev() {
        let current = map.lowest_block_average(sx, sy, 0.0);
        if current.average <= threshold {
            return Ok(FitResult {
                candidate: current,
                global_min_average: best.average,
            });
        }
    }

    Ok(FitResult {
        candidate: best,
        global_min_average: best.average,
    })
}
