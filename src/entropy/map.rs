//! Square grayscale entropy map with row prefix sums.
//!
//! The map is read from a plain-text PGM (`P2`) raster. Every caller asks the
//! toolkit for a `Q×Q` quantization, so a non-square raster is rejected at
//! parse time rather than silently producing skewed size fractions later.
//!
//! Each row keeps a running sum of `width + 1` entries (`row_sums[0] == 0`),
//! so the sum of a horizontal run `[x, x + sx)` is one subtraction and a block
//! average costs `O(sy)` instead of `O(sx * sy)`.

use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntropyError {
    #[error("invalid raster format: {0}")]
    Format(String),
}

/// Best block found by a single block-size scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Mean intensity of the block (the quantity being minimized).
    pub average: f64,
    /// Block size relative to the whole grid, per axis.
    pub size_fraction: (f64, f64),
    /// Top-left grid cell.
    pub position: (u32, u32),
    /// Block size in grid cells.
    pub block_size: (u32, u32),
}

/// Immutable square intensity grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntropyMap {
    side: u32,
    max_value: u32,
    cells: Vec<u32>,
    row_sums: Vec<u64>,
}

impl EntropyMap {
    /// Build a map from row-major samples.
    ///
    /// Fails if `side` is zero, the sample count is not `side * side`, or any
    /// sample exceeds `max_value`.
    pub fn from_cells(side: u32, max_value: u32, cells: Vec<u32>) -> Result<Self, EntropyError> {
        if side == 0 {
            return Err(EntropyError::Format("raster size must be positive".into()));
        }
        let expected = side as usize * side as usize;
        if cells.len() != expected {
            return Err(EntropyError::Format(format!(
                "expected {} samples, found {}",
                expected,
                cells.len()
            )));
        }
        if let Some(v) = cells.iter().find(|&&v| v > max_value) {
            return Err(EntropyError::Format(format!(
                "sample {} exceeds max value {}",
                v, max_value
            )));
        }

        let stride = side as usize + 1;
        let mut row_sums = vec![0u64; stride * side as usize];
        for (row, samples) in cells.chunks(side as usize).enumerate() {
            let sums = &mut row_sums[row * stride..(row + 1) * stride];
            for (x, &v) in samples.iter().enumerate() {
                sums[x + 1] = sums[x] + v as u64;
            }
        }

        Ok(Self {
            side,
            max_value,
            cells,
            row_sums,
        })
    }

    /// Parse a `P2` raster given as a sequence of lines.
    ///
    /// Blank lines and lines starting with `#` are skipped anywhere, including
    /// between sample rows.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, EntropyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut significant = lines.into_iter().filter_map(|line| {
            let trimmed = line.as_ref().trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                None
            } else {
                Some(trimmed.to_string())
            }
        });

        let magic = significant
            .next()
            .ok_or_else(|| EntropyError::Format("empty raster".into()))?;
        if !magic.starts_with("P2") {
            return Err(EntropyError::Format(format!(
                "invalid PNM header: {}",
                magic
            )));
        }

        let size_line = significant
            .next()
            .ok_or_else(|| EntropyError::Format("missing size line".into()))?;
        let dims = parse_numbers(&size_line)?;
        let (width, height) = match dims.as_slice() {
            [w, h] => (*w, *h),
            _ => {
                return Err(EntropyError::Format(format!(
                    "size line must hold two integers: {}",
                    size_line
                )));
            }
        };
        if width != height {
            return Err(EntropyError::Format(format!(
                "non-square raster {}x{}",
                width, height
            )));
        }

        let max_line = significant
            .next()
            .ok_or_else(|| EntropyError::Format("missing max value line".into()))?;
        let max_value = match parse_numbers(&max_line)?.as_slice() {
            [m] => *m,
            _ => {
                return Err(EntropyError::Format(format!(
                    "invalid max value line: {}",
                    max_line
                )));
            }
        };

        let mut cells = Vec::new();
        for line in significant {
            cells.extend(parse_numbers(&line)?);
        }

        Self::from_cells(width, max_value, cells)
    }

    /// Grid dimensions `(width, height)`; always equal.
    pub fn size(&self) -> (u32, u32) {
        (self.side, self.side)
    }

    pub fn max_value(&self) -> u32 {
        self.max_value
    }

    pub fn cell(&self, x: u32, y: u32) -> u32 {
        self.cells[y as usize * self.side as usize + x as usize]
    }

    /// Sum of `cells[y][0..x]`.
    pub fn row_prefix_sum(&self, y: u32, x: u32) -> u64 {
        self.row_sums[y as usize * (self.side as usize + 1) + x as usize]
    }

    /// Mean intensity of the `(sx, sy)` block whose top-left cell is `(x, y)`.
    ///
    /// The block must lie inside the grid.
    pub fn block_average(&self, x: u32, y: u32, sx: u32, sy: u32) -> f64 {
        debug_assert!(sx > 0 && sy > 0);
        debug_assert!(x + sx <= self.side && y + sy <= self.side);
        let total: u64 = (y..y + sy)
            .map(|row| self.row_prefix_sum(row, x + sx) - self.row_prefix_sum(row, x))
            .sum();
        total as f64 / (sx as f64 * sy as f64)
    }

    /// Find the `(sx, sy)` block with the lowest average intensity.
    ///
    /// Positions are scanned row-major (`y` outer, `x` inner). Ties keep the
    /// earliest block. The scan returns as soon as an improved block averages
    /// at or below `stop_at_or_below`; pass `0.0` to only stop on a perfect
    /// block.
    pub fn lowest_block_average(&self, sx: u32, sy: u32, stop_at_or_below: f64) -> Candidate {
        let n = self.side;
        let mut best = Candidate {
            average: self.max_value as f64,
            size_fraction: (1.0, 1.0),
            position: (0, 0),
            block_size: (sx, sy),
        };
        if sx == 0 || sy == 0 || sx > n || sy > n {
            return best;
        }

        let size_fraction = (sx as f64 / n as f64, sy as f64 / n as f64);
        for y in 0..=n - sy {
            for x in 0..=n - sx {
                let average = self.block_average(x, y, sx, sy);
                if average < best.average {
                    best = Candidate {
                        average,
                        size_fraction,
                        position: (x, y),
                        block_size: (sx, sy),
                    };
                    if best.average <= stop_at_or_below {
                        return best;
                    }
                }
            }
        }
        best
    }
}

impl FromStr for EntropyMap {
    type Err = EntropyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_lines(s.lines())
    }
}

fn parse_numbers(line: &str) -> Result<Vec<u32>, EntropyError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<u32>()
                .map_err(|_| EntropyError::Format(format!("invalid integer '{}'", tok)))
        })
        .collect()
}

/// Render samples as a `P2` raster with `max_value` 255.
///
/// Used by toolkits to hand a quantized map to [`EntropyMap::from_lines`].
pub fn write_p2(side: u32, samples: &[u8]) -> String {
    let mut out = format!("P2\n# entropy map\n{} {}\n255\n", side, side);
    for row in samples.chunks(side.max(1) as usize) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}
