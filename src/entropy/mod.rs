//! Minimal-entropy rectangle search.
//!
//! - **Map**: [`EntropyMap`] parses a square `P2` raster and answers block
//!   averages from row prefix sums.
//! - **Search**: [`EntropyMap::lowest_block_average`] scans one block shape.
//! - **Fit**: [`fit_rect`] sweeps block shapes and applies relaxation.
//!
//! Everything here is pure and single-threaded; one map is built per photo
//! and dropped after fitting.

pub mod fit;
pub mod map;

pub use fit::{FitError, FitParams, FitResult, fit_rect, size_pairs};
pub use map::{Candidate, EntropyError, EntropyMap, write_p2};
