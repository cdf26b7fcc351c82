//! Image toolkit trait and shared types.
//!
//! The [`ImageToolkit`] trait defines the raster operations placement and
//! composition need: identify, entropy raster, region luminance, composite,
//! plus the crop and highlight operations behind the diagnostic test modes.
//!
//! The production implementation is
//! [`RustToolkit`](super::rust_backend::RustToolkit), built on the `image`
//! crate. Everything runs in-process.

use super::params::{CompositeParams, CropParams, EntropyParams, HighlightParams};
use crate::geometry::Geometry;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Width over height.
    pub fn ratio(self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// Trait for image toolkits.
///
/// Implementations must be `Sync`: one toolkit is shared by every worker of
/// a batch.
pub trait ImageToolkit: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Square quantized edge-strength map as `P2` text.
    fn entropy_raster(&self, params: &EntropyParams) -> Result<String, BackendError>;

    /// Average CIE lightness of `region`, in `[0, 255]`.
    fn region_luminance(&self, path: &Path, region: Geometry) -> Result<f64, BackendError>;

    /// Draw the overlay onto the adjusted base photo and write the result.
    fn composite(&self, params: &CompositeParams) -> Result<(), BackendError>;

    /// Write only the selected region.
    fn crop(&self, params: &CropParams) -> Result<(), BackendError>;

    /// Write a diagnostic image with the region negated.
    fn highlight(&self, params: &HighlightParams) -> Result<(), BackendError>;
}
