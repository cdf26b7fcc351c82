//! Pure pixel arithmetic for the entropy raster and overlay adjustments.
//!
//! All functions here work on plain slices and are testable without any
//! I/O or decoded images. Intensities are `f32` in `[0, 1]` unless noted.

/// Upper bound on pixels fed to the entropy filter; larger photos are
/// downscaled first.
pub const ENTROPY_MAX_PIXELS: u64 = 262_144;

/// Dimensions that fit within `max_pixels`, keeping aspect ratio.
///
/// Photos already small enough are returned unchanged.
///
/// # Examples
/// ```
/// # use photocal::imaging::prescale_dimensions;
/// assert_eq!(prescale_dimensions((2048, 1024), 262_144), (724, 362));
/// assert_eq!(prescale_dimensions((300, 200), 262_144), (300, 200));
/// ```
pub fn prescale_dimensions(size: (u32, u32), max_pixels: u64) -> (u32, u32) {
    let (w, h) = size;
    let pixels = w as u64 * h as u64;
    if pixels <= max_pixels || pixels == 0 {
        return size;
    }
    let scale = (max_pixels as f64 / pixels as f64).sqrt();
    (
        ((w as f64 * scale) as u32).max(1),
        ((h as f64 * scale) as u32).max(1),
    )
}

/// Sobel edge strength.
///
/// Each of the four kernel rotations (`+X`, `-X`, `+Y`, `-Y`) is clamped at
/// zero and the results are combined with "lighten" (per-pixel max), which
/// reduces to `max(|gx|, |gy|)`. Borders replicate the edge pixel.
pub fn sobel_magnitude(values: &[f32], width: u32, height: u32) -> Vec<f32> {
    let (w, h) = (width as i64, height as i64);
    let at = |x: i64, y: i64| -> f32 {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        values[(y * w + x) as usize]
    };

    let mut out = Vec::with_capacity(values.len());
    for y in 0..h {
        for x in 0..w {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            out.push(lighten(&[gx, -gx, gy, -gy]).clamp(0.0, 1.0));
        }
    }
    out
}

/// Per-pixel maximum of several responses, floored at zero.
fn lighten(responses: &[f32]) -> f32 {
    responses.iter().fold(0.0f32, |acc, &v| acc.max(v))
}

/// `original - blurred`, clamped at zero.
pub fn high_pass(original: &[f32], blurred: &[f32]) -> Vec<f32> {
    original
        .iter()
        .zip(blurred)
        .map(|(&o, &b)| (o - b).max(0.0))
        .collect()
}

/// Stretch values linearly so the minimum maps to 0 and the maximum to 1.
///
/// A flat input stays flat at 0.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let (lo, hi) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = hi - lo;
    if !span.is_finite() || span <= f32::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - lo) / span).collect()
}

/// Area-average downscale of a `width × height` plane to `side × side`.
///
/// Every output cell averages the source pixels whose centers fall inside
/// it; a cell with no such pixel takes the nearest one.
pub fn box_scale(values: &[f32], width: u32, height: u32, side: u32) -> Vec<f32> {
    let side = side.max(1);
    let bounds = |n: u32, cell: u32| -> (usize, usize) {
        let lo = (cell as u64 * n as u64 / side as u64) as usize;
        let hi = ((cell as u64 + 1) * n as u64 / side as u64) as usize;
        (lo.min(n as usize - 1), hi.max(lo + 1).min(n as usize))
    };

    let mut out = Vec::with_capacity((side * side) as usize);
    for cy in 0..side {
        let (y0, y1) = bounds(height, cy);
        for cx in 0..side {
            let (x0, x1) = bounds(width, cx);
            let mut sum = 0.0f64;
            for y in y0..y1 {
                let row = y * width as usize;
                sum += values[row + x0..row + x1]
                    .iter()
                    .map(|&v| v as f64)
                    .sum::<f64>();
            }
            let n = ((y1 - y0) * (x1 - x0)) as f64;
            out.push((sum / n) as f32);
        }
    }
    out
}

/// Quantize `[0, 1]` intensities to `0..=255`, optionally negated.
pub fn to_samples(values: &[f32], negate: bool) -> Vec<u8> {
    values
        .iter()
        .map(|&v| {
            let s = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            if negate { 255 - s } else { s }
        })
        .collect()
}

fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// CIE L* of an sRGB pixel, scaled from `[0, 100]` to `[0, 1]`.
pub fn lab_lightness(rgb: [u8; 3]) -> f64 {
    let y = 0.2126 * srgb_to_linear(rgb[0])
        + 0.7152 * srgb_to_linear(rgb[1])
        + 0.0722 * srgb_to_linear(rgb[2]);
    let f = if y > 216.0 / 24389.0 {
        y.cbrt()
    } else {
        (24389.0 / 27.0 * y + 16.0) / 116.0
    };
    ((116.0 * f - 16.0) / 100.0).clamp(0.0, 1.0)
}

/// Shift brightness by `brightness` percent of full scale, then scale
/// saturation around the pixel's luma to `saturation` percent.
pub fn adjust_pixel(rgb: [u8; 3], brightness: i32, saturation: u32) -> [u8; 3] {
    let shift = brightness as f64 * 255.0 / 100.0;
    let shifted = rgb.map(|c| (c as f64 + shift).clamp(0.0, 255.0));
    let gray = 0.299 * shifted[0] + 0.587 * shifted[1] + 0.114 * shifted[2];
    let factor = saturation as f64 / 100.0;
    shifted.map(|c| (gray + (c - gray) * factor).round().clamp(0.0, 255.0) as u8)
}
