//! Parameter types for toolkit operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the composer (which decides what images to create) and
//! the [`backend`](super::backend) (which does the actual pixel work). This
//! separation allows swapping toolkits (e.g. for testing with a mock) without
//! changing placement or composition logic.
//!
//! ## Types
//!
//! - [`EntropyFilter`] — Edge/contrast operator run before quantization.
//! - [`EntropyParams`] — Source photo, grid side, filter and polarity of an entropy raster.
//! - [`ColorAdjust`] — Brightness shift and saturation for the overlaid region.
//! - [`CompositeParams`] — Base photo, overlay, region, adjustments and inversion.
//! - [`CropParams`] — Region to cut out of a photo.
//! - [`HighlightParams`] — Diagnostic image with the region negated.

use crate::geometry::Geometry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operator used to turn a photo into an edge-strength image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntropyFilter {
    /// Sobel edge magnitude, four rotated kernels combined with "lighten".
    #[default]
    Sobel,
    /// Photo minus its Gaussian blur (σ = 2).
    HighPass,
}

/// Parameters for an entropy raster.
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyParams {
    pub source: PathBuf,
    /// Side of the square output grid.
    pub quantum: u32,
    pub filter: EntropyFilter,
    /// Emit `255 - v` so a minimum search finds the busiest region.
    pub negate: bool,
}

/// Color changes applied inside the overlay region before compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAdjust {
    /// Brightness shift in percent of full scale; may be negative.
    pub brightness: i32,
    /// Saturation in percent; 100 leaves colors unchanged.
    pub saturation: u32,
}

impl ColorAdjust {
    pub fn is_identity(&self) -> bool {
        self.brightness == 0 && self.saturation == 100
    }
}

impl Default for ColorAdjust {
    fn default() -> Self {
        Self {
            brightness: 0,
            saturation: 100,
        }
    }
}

/// Parameters for drawing a rendered calendar over a photo.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeParams {
    pub base: PathBuf,
    pub overlay: PathBuf,
    pub output: PathBuf,
    pub region: Geometry,
    pub adjust: ColorAdjust,
    /// Negate the overlay colors (alpha untouched).
    pub invert: bool,
}

/// Parameters for cutting the selected region out of a photo.
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub region: Geometry,
}

/// Image the highlighted region is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backdrop {
    /// The photo itself.
    Photo,
    /// The entropy map, upscaled to photo size.
    EntropyMap,
    /// The upscaled entropy map multiplied with the photo.
    EntropyOverPhoto,
}

/// Parameters for a diagnostic image with the region negated.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub region: Geometry,
    pub backdrop: Backdrop,
    /// Grid and filter for the entropy backdrops; ignored for [`Backdrop::Photo`].
    pub entropy: EntropySettings,
}

/// Grid side, filter and polarity, without a source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropySettings {
    pub quantum: u32,
    pub filter: EntropyFilter,
    pub negate: bool,
}

impl Default for EntropySettings {
    fn default() -> Self {
        Self {
            quantum: 60,
            filter: EntropyFilter::Sobel,
            negate: false,
        }
    }
}

impl EntropySettings {
    pub fn for_source(self, source: PathBuf) -> EntropyParams {
        EntropyParams {
            source,
            quantum: self.quantum,
            filter: self.filter,
            negate: self.negate,
        }
    }
}
