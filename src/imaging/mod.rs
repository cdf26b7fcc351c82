//! Image processing — pure Rust, in-process.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Entropy raster** | Sobel or high-pass, L*, normalize, area-average to `Q×Q` |
//! | **Region luminance** | mean CIE L* over the region |
//! | **Composite** | brightness/saturation in region + `imageops::overlay` |
//! | **Crop / highlight** | diagnostic outputs for the test modes |
//!
//! The module is split into:
//! - **Calculations**: Pure pixel arithmetic (unit testable)
//! - **Parameters**: Data structures describing toolkit operations
//! - **Backend**: [`ImageToolkit`] trait + [`RustToolkit`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageToolkit};
pub use calculations::prescale_dimensions;
pub use params::{
    Backdrop, ColorAdjust, CompositeParams, CropParams, EntropyFilter, EntropyParams,
    EntropySettings, HighlightParams,
};
pub use rust_backend::{RustToolkit, supported_input_extensions};
