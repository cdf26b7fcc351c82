//! Pure Rust image toolkit.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Pre-scale | `image::imageops::resize` with `Triangle` filter |
//! | Sobel / high-pass | [`calculations`](super::calculations) + `image::imageops::blur` |
//! | Lightness | CIE L* from sRGB, [`calculations::lab_lightness`](super::calculations::lab_lightness) |
//! | Quantize | area average to `Q×Q`, normalize, `P2` text |
//! | Composite | per-pixel adjust + `image::imageops::overlay` |
//! | Crop | `image::imageops::crop_imm` |

use super::backend::{BackendError, Dimensions, ImageToolkit};
use super::calculations::{
    ENTROPY_MAX_PIXELS, adjust_pixel, box_scale, high_pass, lab_lightness, normalize,
    prescale_dimensions, sobel_magnitude, to_samples,
};
use super::params::{
    Backdrop, CompositeParams, CropParams, EntropyFilter, EntropyParams, EntropySettings,
    HighlightParams,
};
use crate::entropy::write_p2;
use crate::geometry::Geometry;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, ImageReader, Rgb, RgbImage};
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in and known to work.
///
/// AVIF is excluded: the `image` crate's `"avif"` feature only enables the
/// encoder, and `ImageFormat::reading_enabled()` reports `true` regardless.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Toolkit built on the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustToolkit;

impl RustToolkit {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustToolkit {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Save as RGB; the format follows the output extension.
fn save_image(img: RgbImage, path: &Path) -> Result<(), BackendError> {
    DynamicImage::ImageRgb8(img).save(path).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to write {}: {}", path.display(), e))
    })
}

fn check_region(region: Geometry, size: (u32, u32), path: &Path) -> Result<Geometry, BackendError> {
    let clipped = region.clipped_to(size);
    if clipped.area() == 0 {
        return Err(BackendError::ProcessingFailed(format!(
            "Region {} is empty within {}x{} image {}",
            region,
            size.0,
            size.1,
            path.display()
        )));
    }
    Ok(clipped)
}

/// Lightness plane of an image, `[0, 1]` per pixel.
fn lightness_plane(img: &RgbImage) -> Vec<f32> {
    img.pixels().map(|p| lab_lightness(p.0) as f32).collect()
}

/// Normalized `side × side` edge-strength samples of a photo.
fn entropy_samples(img: &DynamicImage, settings: EntropySettings) -> Vec<u8> {
    let (w, h) = prescale_dimensions((img.width(), img.height()), ENTROPY_MAX_PIXELS);
    let scaled = if (w, h) == (img.width(), img.height()) {
        img.to_rgb8()
    } else {
        imageops::resize(&img.to_rgb8(), w, h, FilterType::Triangle)
    };

    let edges = match settings.filter {
        EntropyFilter::Sobel => sobel_magnitude(&lightness_plane(&scaled), w, h),
        EntropyFilter::HighPass => {
            let blurred = imageops::blur(&scaled, 2.0);
            high_pass(&lightness_plane(&scaled), &lightness_plane(&blurred))
        }
    };

    let quantized = box_scale(&normalize(&edges), w, h, settings.quantum);
    to_samples(&normalize(&quantized), settings.negate)
}

/// Entropy samples upscaled to the photo size.
fn entropy_backdrop(
    img: &DynamicImage,
    settings: EntropySettings,
) -> Result<GrayImage, BackendError> {
    let side = settings.quantum.max(1);
    let samples = entropy_samples(img, EntropySettings { quantum: side, ..settings });
    let map = GrayImage::from_raw(side, side, samples).ok_or_else(|| {
        BackendError::ProcessingFailed("entropy buffer size mismatch".to_string())
    })?;
    Ok(imageops::resize(&map, img.width(), img.height(), FilterType::Nearest))
}

fn negate_region(img: &mut RgbImage, region: Geometry) {
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            let p = img.get_pixel_mut(x, y);
            p.0 = p.0.map(|c| 255 - c);
        }
    }
}

impl ImageToolkit for RustToolkit {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn entropy_raster(&self, params: &EntropyParams) -> Result<String, BackendError> {
        if params.quantum == 0 {
            return Err(BackendError::ProcessingFailed(
                "quantum must be positive".to_string(),
            ));
        }
        let img = load_image(&params.source)?;
        let settings = EntropySettings {
            quantum: params.quantum,
            filter: params.filter,
            negate: params.negate,
        };
        Ok(write_p2(params.quantum, &entropy_samples(&img, settings)))
    }

    fn region_luminance(&self, path: &Path, region: Geometry) -> Result<f64, BackendError> {
        let img = load_image(path)?.to_rgb8();
        let region = check_region(region, img.dimensions(), path)?;
        let view = imageops::crop_imm(&img, region.x, region.y, region.width, region.height);
        let sum: f64 = view.pixels().map(|(_, _, p)| lab_lightness([p[0], p[1], p[2]])).sum();
        Ok(255.0 * sum / region.area() as f64)
    }

    fn composite(&self, params: &CompositeParams) -> Result<(), BackendError> {
        let mut base = load_image(&params.base)?.to_rgba8();
        let region = check_region(params.region, base.dimensions(), &params.base)?;

        if !params.adjust.is_identity() {
            for y in region.y..region.y + region.height {
                for x in region.x..region.x + region.width {
                    let p = base.get_pixel_mut(x, y);
                    let [r, g, b] = adjust_pixel(
                        [p[0], p[1], p[2]],
                        params.adjust.brightness,
                        params.adjust.saturation,
                    );
                    p.0 = [r, g, b, p[3]];
                }
            }
        }

        let mut overlay = load_image(&params.overlay)?.to_rgba8();
        if params.invert {
            imageops::colorops::invert(&mut overlay);
        }
        imageops::overlay(&mut base, &overlay, region.x as i64, region.y as i64);

        save_image(DynamicImage::ImageRgba8(base).to_rgb8(), &params.output)
    }

    fn crop(&self, params: &CropParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?.to_rgb8();
        let region = check_region(params.region, img.dimensions(), &params.source)?;
        let cropped = imageops::crop_imm(&img, region.x, region.y, region.width, region.height);
        save_image(cropped.to_image(), &params.output)
    }

    fn highlight(&self, params: &HighlightParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let region = check_region(params.region, (img.width(), img.height()), &params.source)?;

        let mut out = match params.backdrop {
            Backdrop::Photo => img.to_rgb8(),
            Backdrop::EntropyMap => {
                DynamicImage::ImageLuma8(entropy_backdrop(&img, params.entropy)?).to_rgb8()
            }
            Backdrop::EntropyOverPhoto => {
                let map = entropy_backdrop(&img, params.entropy)?;
                let mut photo = img.to_rgb8();
                for (p, m) in photo.pixels_mut().zip(map.pixels()) {
                    let k = m[0] as u16;
                    *p = Rgb(p.0.map(|c| (c as u16 * k / 255) as u8));
                }
                photo
            }
        };
        negate_region(&mut out, region);
        save_image(out, &params.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::EntropyMap;
    use crate::imaging::params::ColorAdjust;
    use image::{Rgba, RgbaImage};

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = super::supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "tif", "tiff", "webp"] {
            assert!(
                exts.contains(expected),
                "expected {expected} in supported extensions"
            );
        }
        assert!(!exts.contains(&"avif"));
    }

    /// Gray photo with a busy checkerboard on its left half.
    fn create_test_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if x < width / 2 && (x / 2 + y / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else if x < width / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([128, 128, 128])
            }
        });
        img.save(path).unwrap();
    }

    fn solid_png(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        RgbImage::from_pixel(width, height, Rgb(color)).save(path).unwrap();
    }

    fn region(width: u32, height: u32, x: u32, y: u32) -> Geometry {
        Geometry {
            width,
            height,
            x,
            y,
        }
    }

    #[test]
    fn identify_synthetic_png() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.png");
        create_test_png(&path, 200, 150);

        let dims = RustToolkit::new().identify(&path).unwrap();
        assert_eq!(dims.width, 200);
        assert_eq!(dims.height, 150);
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustToolkit::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(result.is_err());
    }

    // =========================================================================
    // entropy_raster
    // =========================================================================

    #[test]
    fn entropy_raster_parses_as_square_map() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.png");
        create_test_png(&path, 120, 80);

        let raster = RustToolkit::new()
            .entropy_raster(&EntropyParams {
                source: path,
                quantum: 12,
                filter: EntropyFilter::Sobel,
                negate: false,
            })
            .unwrap();
        let map: EntropyMap = raster.parse().unwrap();
        assert_eq!(map.size(), (12, 12));
        assert_eq!(map.max_value(), 255);
    }

    #[test]
    fn entropy_raster_busy_half_scores_higher() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.png");
        create_test_png(&path, 120, 120);

        for filter in [EntropyFilter::Sobel, EntropyFilter::HighPass] {
            let raster = RustToolkit::new()
                .entropy_raster(&EntropyParams {
                    source: path.clone(),
                    quantum: 10,
                    filter,
                    negate: false,
                })
                .unwrap();
            let map: EntropyMap = raster.parse().unwrap();
            let busy = map.block_average(0, 0, 4, 10);
            let quiet = map.block_average(6, 0, 4, 10);
            assert!(busy > quiet, "{filter:?}: busy {busy} <= quiet {quiet}");
        }
    }

    #[test]
    fn entropy_raster_negate_flips_samples() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.png");
        create_test_png(&path, 60, 60);
        let toolkit = RustToolkit::new();
        let params = |negate| EntropyParams {
            source: path.clone(),
            quantum: 6,
            filter: EntropyFilter::Sobel,
            negate,
        };

        let plain: EntropyMap = toolkit.entropy_raster(&params(false)).unwrap().parse().unwrap();
        let negated: EntropyMap = toolkit.entropy_raster(&params(true)).unwrap().parse().unwrap();
        for y in 0..6 {
            for x in 0..6 {
                assert_eq!(plain.cell(x, y) + negated.cell(x, y), 255);
            }
        }
    }

    #[test]
    fn entropy_raster_zero_quantum_errors() {
        let result = RustToolkit::new().entropy_raster(&EntropyParams {
            source: "/nonexistent.png".into(),
            quantum: 0,
            filter: EntropyFilter::Sobel,
            negate: false,
        });
        assert!(result.is_err());
    }

    // =========================================================================
    // region_luminance
    // =========================================================================

    #[test]
    fn region_luminance_extremes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let black = tmp.path().join("black.png");
        let white = tmp.path().join("white.png");
        solid_png(&black, 20, 20, [0, 0, 0]);
        solid_png(&white, 20, 20, [255, 255, 255]);

        let toolkit = RustToolkit::new();
        let r = region(10, 10, 5, 5);
        assert!(toolkit.region_luminance(&black, r).unwrap() < 1e-6);
        assert!((toolkit.region_luminance(&white, r).unwrap() - 255.0).abs() < 1e-6);
    }

    #[test]
    fn region_luminance_only_reads_region() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("half.png");
        RgbImage::from_fn(20, 10, |x, _| {
            if x < 10 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        })
        .save(&path)
        .unwrap();

        let toolkit = RustToolkit::new();
        assert!(toolkit.region_luminance(&path, region(10, 10, 0, 0)).unwrap() < 1e-6);
        assert!(toolkit.region_luminance(&path, region(10, 10, 10, 0)).unwrap() > 254.0);
    }

    #[test]
    fn region_luminance_empty_region_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("p.png");
        solid_png(&path, 10, 10, [10, 10, 10]);
        let result = RustToolkit::new().region_luminance(&path, region(5, 5, 10, 10));
        assert!(result.is_err());
    }

    // =========================================================================
    // composite / crop / highlight
    // =========================================================================

    fn overlay_png(path: &Path, width: u32, height: u32) {
        // Opaque white square in a transparent frame
        RgbaImage::from_fn(width, height, |x, y| {
            if x > 0 && y > 0 && x < width - 1 && y < height - 1 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
        .save(path)
        .unwrap();
    }

    #[test]
    fn composite_draws_overlay_at_region() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = tmp.path().join("base.png");
        let overlay = tmp.path().join("cal.png");
        let output = tmp.path().join("out.png");
        solid_png(&base, 40, 30, [100, 100, 100]);
        overlay_png(&overlay, 10, 10);

        RustToolkit::new()
            .composite(&CompositeParams {
                base,
                overlay,
                output: output.clone(),
                region: region(10, 10, 20, 10),
                adjust: ColorAdjust::default(),
                invert: false,
            })
            .unwrap();

        let out = image::open(&output).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (40, 30));
        assert_eq!(out.get_pixel(25, 15).0, [255, 255, 255]);
        // Transparent frame keeps the base
        assert_eq!(out.get_pixel(20, 10).0, [100, 100, 100]);
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100]);
    }

    #[test]
    fn composite_inverted_with_darkened_region() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = tmp.path().join("base.png");
        let overlay = tmp.path().join("cal.png");
        let output = tmp.path().join("out.png");
        solid_png(&base, 40, 30, [100, 100, 100]);
        overlay_png(&overlay, 10, 10);

        RustToolkit::new()
            .composite(&CompositeParams {
                base,
                overlay,
                output: output.clone(),
                region: region(10, 10, 0, 0),
                adjust: ColorAdjust {
                    brightness: -10,
                    saturation: 100,
                },
                invert: true,
            })
            .unwrap();

        let out = image::open(&output).unwrap().to_rgb8();
        // Negated white overlay
        assert_eq!(out.get_pixel(5, 5).0, [0, 0, 0]);
        // Frame pixel inside the region: 100 - 25.5 = 74.5, rounded
        assert_eq!(out.get_pixel(0, 0).0, [75, 75, 75]);
        // Outside the region untouched
        assert_eq!(out.get_pixel(30, 20).0, [100, 100, 100]);
    }

    #[test]
    fn composite_missing_overlay_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = tmp.path().join("base.png");
        solid_png(&base, 10, 10, [0, 0, 0]);
        let result = RustToolkit::new().composite(&CompositeParams {
            base,
            overlay: tmp.path().join("missing.png"),
            output: tmp.path().join("out.png"),
            region: region(5, 5, 0, 0),
            adjust: ColorAdjust::default(),
            invert: false,
        });
        assert!(result.is_err());
    }

    #[test]
    fn crop_writes_region_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("p.png");
        let output = tmp.path().join("crop.png");
        create_test_png(&source, 100, 60);

        RustToolkit::new()
            .crop(&CropParams {
                source,
                output: output.clone(),
                region: region(30, 20, 60, 10),
            })
            .unwrap();
        let out = image::open(&output).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (30, 20));
        assert_eq!(out.get_pixel(0, 0).0, [128, 128, 128]);
    }

    #[test]
    fn highlight_negates_region_on_photo() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("p.png");
        let output = tmp.path().join("area.png");
        solid_png(&source, 20, 20, [200, 100, 50]);

        RustToolkit::new()
            .highlight(&HighlightParams {
                source,
                output: output.clone(),
                region: region(5, 5, 10, 10),
                backdrop: Backdrop::Photo,
                entropy: EntropySettings::default(),
            })
            .unwrap();
        let out = image::open(&output).unwrap().to_rgb8();
        assert_eq!(out.get_pixel(12, 12).0, [55, 155, 205]);
        assert_eq!(out.get_pixel(2, 2).0, [200, 100, 50]);
    }

    #[test]
    fn highlight_entropy_backdrops_keep_photo_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("p.png");
        create_test_png(&source, 64, 48);
        let toolkit = RustToolkit::new();

        for (name, backdrop) in [
            ("quant.png", Backdrop::EntropyMap),
            ("quantimg.png", Backdrop::EntropyOverPhoto),
        ] {
            let output = tmp.path().join(name);
            toolkit
                .highlight(&HighlightParams {
                    source: source.clone(),
                    output: output.clone(),
                    region: region(16, 16, 40, 20),
                    backdrop,
                    entropy: EntropySettings {
                        quantum: 8,
                        ..EntropySettings::default()
                    },
                })
                .unwrap();
            assert_eq!(image::image_dimensions(&output).unwrap(), (64, 48));
        }
    }
}
