//! Overlay placement policy.
//!
//! Decides where the calendar goes on a photo and whether it should be drawn
//! in negative colors:
//!
//! 1. **Locate**: entropy placement (`min`/`max`) asks the toolkit for a
//!    `Q×Q` entropy raster, negated for `max`, and fits a rectangle on it;
//!    every other mode scales the photo rectangle around a fixed or random
//!    alignment point.
//! 2. **Polarity**: the average luminance inside the final geometry is
//!    compared against the `negative` threshold. Thresholds of 0 or 255
//!    force the decision without sampling.
//!
//! Luminance is always sampled on the finalized geometry.

use crate::config::{ConfigError, PlacementConfig, parse_ratio};
use crate::entropy::{EntropyError, EntropyMap, FitError, FitParams, FitResult, fit_rect};
use crate::geometry::{Geometry, Rect};
use crate::imaging::{BackendError, Dimensions, EntropyFilter, EntropySettings, ImageToolkit};
use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("image toolkit error: {0}")]
    Backend(#[from] BackendError),
    #[error("entropy raster error: {0}")]
    Entropy(#[from] EntropyError),
    #[error(transparent)]
    Fit(#[from] FitError),
}

/// How the overlay rectangle is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
pub enum PlacementMode {
    /// Lowest-entropy region.
    #[default]
    #[serde(rename = "min")]
    #[value(name = "min")]
    Min,
    /// Highest-entropy region.
    #[serde(rename = "max")]
    #[value(name = "max")]
    Max,
    #[value(name = "N")]
    N,
    #[value(name = "S")]
    S,
    #[value(name = "W")]
    W,
    #[value(name = "E")]
    E,
    #[value(name = "NW")]
    NW,
    #[value(name = "NE")]
    NE,
    #[value(name = "SW")]
    SW,
    #[value(name = "SE")]
    SE,
    #[serde(rename = "center")]
    #[value(name = "center")]
    Center,
    /// Random size in `[min_size, max_size]` at a random position.
    #[serde(rename = "random")]
    #[value(name = "random")]
    Random,
}

impl PlacementMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::N => "N",
            Self::S => "S",
            Self::W => "W",
            Self::E => "E",
            Self::NW => "NW",
            Self::NE => "NE",
            Self::SW => "SW",
            Self::SE => "SE",
            Self::Center => "center",
            Self::Random => "random",
        }
    }

    pub fn is_entropy(self) -> bool {
        matches!(self, Self::Min | Self::Max)
    }

    /// Whether `min_size` bounds the overlay size (as opposed to a margin).
    pub fn uses_size_range(self) -> bool {
        matches!(self, Self::Min | Self::Max | Self::Random)
    }

    /// Alignment in `[-1, 1]²` for the fixed modes, given the margin ratio.
    fn alignment(self, margin: f64) -> (f64, f64) {
        let name = self.as_str();
        let mut ax = 0.0;
        let mut ay = 0.0;
        if name.contains('W') {
            ax = -1.0 + 2.0 * margin;
        }
        if name.contains('E') {
            ax = 1.0 - 2.0 * margin;
        }
        if name.contains('N') {
            ay = -1.0 + 2.0 * margin;
        }
        if name.contains('S') {
            ay = 1.0 - 2.0 * margin;
        }
        (ax, ay)
    }
}

/// Resolved placement parameters for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementSettings {
    pub mode: PlacementMode,
    pub quantum: u32,
    /// `(min_size, max_size)`; for the compass modes `min_size` is the margin.
    pub size_range: (f64, f64),
    /// Calendar ratio; `0.0` matches the photo.
    pub ratio: f64,
    pub low_entropy: f64,
    pub relax: f64,
    pub negative: f64,
    pub filter: EntropyFilter,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            mode: PlacementMode::Min,
            quantum: 60,
            size_range: (0.333, 0.8),
            ratio: 0.0,
            low_entropy: 7.0,
            relax: 0.2,
            negative: 100.0,
            filter: EntropyFilter::Sobel,
        }
    }
}

impl PlacementSettings {
    pub fn from_config(config: &PlacementConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            mode: config.mode,
            quantum: config.quantum,
            size_range: (config.effective_min_size(), config.max_size),
            ratio: parse_ratio(&config.ratio)?,
            low_entropy: config.low_entropy,
            relax: config.relax,
            negative: config.negative,
            filter: config.filter,
        })
    }

    /// Entropy grid for this mode; `max` searches a negated raster.
    pub fn entropy_settings(&self) -> EntropySettings {
        EntropySettings {
            quantum: self.quantum,
            filter: self.filter,
            negate: self.mode == PlacementMode::Max,
        }
    }

    /// Calendar ratio for a photo of ratio `photo_ratio`.
    pub fn calendar_ratio(&self, photo_ratio: f64) -> f64 {
        if self.ratio == 0.0 {
            photo_ratio
        } else {
            self.ratio
        }
    }
}

/// Final overlay geometry and polarity for a photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub geometry: Geometry,
    /// Draw the overlay in negative colors.
    pub dark: bool,
}

/// Geometry plus the fit statistics when it came from the entropy map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located {
    pub geometry: Geometry,
    pub fit: Option<FitResult>,
}

/// Choose the overlay geometry for `photo`.
pub fn locate<R: Rng + ?Sized>(
    toolkit: &dyn ImageToolkit,
    photo: &Path,
    dims: Dimensions,
    settings: &PlacementSettings,
    rng: &mut R,
) -> Result<Located, PlacementError> {
    if settings.mode.is_entropy() {
        let (geometry, fit) = entropy_placement(toolkit, photo, dims, settings)?;
        Ok(Located {
            geometry,
            fit: Some(fit),
        })
    } else {
        Ok(Located {
            geometry: manual_placement(dims, settings, rng),
            fit: None,
        })
    }
}

/// Fit a rectangle on the photo's entropy map and scale it to photo pixels.
pub fn entropy_placement(
    toolkit: &dyn ImageToolkit,
    photo: &Path,
    dims: Dimensions,
    settings: &PlacementSettings,
) -> Result<(Geometry, FitResult), PlacementError> {
    let params = settings.entropy_settings().for_source(photo.to_path_buf());
    let raster = toolkit.entropy_raster(&params)?;
    let map: EntropyMap = raster.parse()?;

    let photo_ratio = dims.ratio();
    let params = FitParams {
        size_range: settings.size_range,
        early_stop: settings.low_entropy,
        relax: settings.relax,
        ratio_of_ratios: settings.calendar_ratio(photo_ratio) / photo_ratio,
    };
    let fit = fit_rect(&map, &params)?;
    let c = &fit.candidate;
    log::debug!(
        "{}: ent={:.2} frac=({:.2},{:.2}) pos=({},{}) bs=({},{}) min={:.2} r={:.2}",
        photo.display(),
        c.average,
        c.size_fraction.0,
        c.size_fraction.1,
        c.position.0,
        c.position.1,
        c.block_size.0,
        c.block_size.1,
        fit.global_min_average,
        photo_ratio * c.block_size.0 as f64 / c.block_size.1.max(1) as f64,
    );

    let geometry = Geometry::from_candidate(c, map.size(), dims.as_tuple());
    Ok((geometry, fit))
}

/// Scale the photo rectangle to the calendar ratio and position it.
///
/// `random` draws the size factor from `[min_size, max_size]` and the
/// alignment from `[-1, 1]²`. The compass modes scale by `max_size` and use
/// `min_size` as the margin towards the named edges; `center` aligns at 0.
pub fn manual_placement<R: Rng + ?Sized>(
    dims: Dimensions,
    settings: &PlacementSettings,
    rng: &mut R,
) -> Geometry {
    let (w, h) = (dims.width as f64, dims.height as f64);
    let photo_ratio = dims.ratio();
    let r = settings.calendar_ratio(photo_ratio);
    let (fx, fy) = if r == photo_ratio {
        (1.0, 1.0)
    } else if r > photo_ratio {
        (1.0, photo_ratio / r)
    } else {
        (r / photo_ratio, 1.0)
    };

    let rect = Rect {
        x: 0.0,
        y: 0.0,
        w,
        h,
    };
    let (min_size, max_size) = settings.size_range;
    let scaled = if settings.mode == PlacementMode::Random {
        let f = if min_size < max_size {
            rng.random_range(min_size..=max_size)
        } else {
            max_size
        };
        let align = (rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0));
        rect.rel_scale(f * fx, f * fy, align)
    } else {
        rect.rel_scale(
            max_size * fx,
            max_size * fy,
            settings.mode.alignment(min_size),
        )
    };
    scaled.to_geometry()
}

/// Whether the overlay over `geometry` should be negative.
///
/// Thresholds strictly inside `(0, 255)` sample the toolkit; 0 never and 255
/// always yields a dark decision without sampling.
pub fn decide_dark(
    toolkit: &dyn ImageToolkit,
    photo: &Path,
    geometry: Geometry,
    negative: f64,
) -> Result<bool, PlacementError> {
    let luma = if negative > 0.0 && negative < 255.0 {
        toolkit.region_luminance(photo, geometry)?
    } else {
        255.0 - negative
    };
    log::debug!("{}: luma={:.2} negative={:.2}", photo.display(), luma, negative);
    Ok(luma < negative)
}

/// Identify, locate and decide polarity in one go.
pub fn compute_placement<R: Rng + ?Sized>(
    toolkit: &dyn ImageToolkit,
    photo: &Path,
    settings: &PlacementSettings,
    rng: &mut R,
) -> Result<Placement, PlacementError> {
    let dims = toolkit.identify(photo)?;
    let located = locate(toolkit, photo, dims, settings, rng)?;
    let dark = decide_dark(toolkit, photo, located.geometry, settings.negative)?;
    Ok(Placement {
        geometry: located.geometry,
        dark,
    })
}
