//! # photocal
//!
//! Composite a calendar onto a photo where it disturbs the picture least.
//!
//! # Architecture: Placement First
//!
//! Every unit of work places the overlay before anything is rendered, so the
//! calendar can be produced at exactly the pixel size it will occupy:
//!
//! ```text
//! 1. Place      photo     →  geometry         (entropy map or fixed position)
//! 2. Decide     geometry  →  dark / light     (luminance under the region)
//! 3. Render     geometry  →  overlay.png      (external calendar program)
//! 4. Composite  overlay   →  output image     (adjusted region + overlay)
//! ```
//!
//! The entropy core in [`entropy`] is pure and knows nothing about photos:
//! it fits a rectangle on a square intensity grid. [`placement`] bridges
//! grid cells and photo pixels; [`compose`] and [`batch`] drive the two
//! collaborators, the [`imaging::ImageToolkit`] and the
//! [`render::CalendarRenderer`], through traits so tests can record calls.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`entropy`] | P2 raster parsing, prefix-sum block averages, block search and rectangle fitting |
//! | [`geometry`] | Pixel rectangles and relative scaling |
//! | [`placement`] | Entropy and manual placement modes, overlay polarity |
//! | [`cache`] | Per-run placement cache for photos reused across months |
//! | [`imaging`] | `ImageToolkit` trait and its pure-Rust implementation |
//! | [`render`] | `CalendarRenderer` trait and the external-program renderer |
//! | [`compose`] | One photo/month unit, including diagnostic test modes |
//! | [`batch`] | Month ranges, photo lists, job planning and the worker pool |
//! | [`config`] | `config.toml` loading, merging, key-path overrides, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Largest Acceptable Rectangle, Not the Quietest One
//!
//! The fitter does not return the global minimum. It measures the best
//! average at the smallest size, then walks from the largest size down and
//! takes the first block within `relax` of that reference (or under the
//! absolute `low_entropy` floor). A bigger calendar over a slightly busier
//! area reads better than a tiny one in the quietest corner.
//!
//! ## Pure-Rust Imaging
//!
//! Dimensions, the entropy raster, luminance and compositing run in-process
//! on the `image` crate. Only the calendar itself comes from an external
//! program, since vector calendar layout is out of scope.

pub mod batch;
pub mod cache;
pub mod compose;
pub mod config;
pub mod entropy;
pub mod geometry;
pub mod imaging;
pub mod output;
pub mod placement;
pub mod render;
