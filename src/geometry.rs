//! Pixel geometry of the overlay region.
//!
//! Grid candidates are converted by rescaling their size fraction and
//! position against the photo; manual placements scale the photo rectangle
//! around an alignment point. Both truncate to whole pixels.

use crate::entropy::Candidate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overlay rectangle in photo pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl Geometry {
    /// Rescale a grid candidate onto a `photo`-sized image.
    ///
    /// Size comes from the candidate's size fraction; position is scaled by
    /// `photo / grid` per axis.
    pub fn from_candidate(candidate: &Candidate, grid: (u32, u32), photo: (u32, u32)) -> Self {
        let (pw, ph) = (photo.0 as f64, photo.1 as f64);
        let (gw, gh) = (grid.0.max(1) as f64, grid.1.max(1) as f64);
        Self {
            width: (pw * candidate.size_fraction.0) as u32,
            height: (ph * candidate.size_fraction.1) as u32,
            x: (pw * candidate.position.0 as f64 / gw) as u32,
            y: (ph * candidate.position.1 as f64 / gh) as u32,
        }
    }

    /// Whether the rectangle lies inside a `(width, height)` image.
    pub fn fits_within(&self, size: (u32, u32)) -> bool {
        self.x as u64 + self.width as u64 <= size.0 as u64
            && self.y as u64 + self.height as u64 <= size.1 as u64
    }

    /// Clip to a `(width, height)` image.
    pub fn clipped_to(&self, size: (u32, u32)) -> Self {
        let x = self.x.min(size.0);
        let y = self.y.min(size.1);
        Self {
            width: self.width.min(size.0 - x),
            height: self.height.min(size.1 - y),
            x,
            y,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// `WxH+X+Y`, the usual geometry notation.
impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Rectangle `(x, y, w, h)` in floating point, before truncation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    /// Scale by `(fw, fh)` and position the result inside the original.
    ///
    /// `align` ranges over `[-1, 1]` per axis: `-1` hugs the left/top edge,
    /// `0` centres, `1` hugs the right/bottom edge; values in between
    /// interpolate linearly.
    pub fn rel_scale(&self, fw: f64, fh: f64, align: (f64, f64)) -> Self {
        Self {
            x: self.x + (align.0 + 1.0) * self.w * (1.0 - fw) / 2.0,
            y: self.y + (align.1 + 1.0) * self.h * (1.0 - fh) / 2.0,
            w: self.w * fw,
            h: self.h * fh,
        }
    }

    pub fn to_geometry(self) -> Geometry {
        Geometry {
            width: self.w as u32,
            height: self.h as u32,
            x: self.x as u32,
            y: self.y as u32,
        }
    }
}
