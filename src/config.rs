//! Composition configuration.
//!
//! Handles loading, overriding, and validating the composer settings.
//! Configuration is layered: stock defaults, then an optional user TOML file,
//! then key-path overrides (`--set placement.relax=0.3` and the dedicated CLI
//! flags, which are translated into the same overrides).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [placement]
//! mode = "min"            # min, max, N, S, W, E, NW, NE, SW, SE, center, random
//! quantum = 60            # Entropy grid is quantum x quantum cells
//! # min_size = 0.333      # Default depends on mode (0.333 or 0.05)
//! max_size = 0.8          # Largest calendar/photo size ratio
//! ratio = "0"             # Calendar ratio: float, "X/Y", or "0" for photo ratio
//! low_entropy = 7.0       # Entropy (0-255) accepted without further search
//! relax = 0.2             # Accept bigger blocks within (1 + relax) of the minimum
//! negative = 100.0        # Luminance below which the overlay is inverted
//! filter = "sobel"        # Entropy filter: sobel or highpass
//! # seed = 42             # Seed for random placement and sampling
//!
//! [overlay]
//! brightness = 10         # Percent; lowered instead on negative overlays
//! saturation = 100        # Percent saturation of the overlaid area
//!
//! [calendar]
//! program = "callirhoe"   # External calendar renderer
//! style = "transparent"
//! vanilla = false         # Skip the default --no-footer --border=0
//! args = []               # Extra renderer arguments
//!
//! [output]
//! dir = "."
//! format = ""             # Output extension; empty keeps the input's
//! prefix = "auto"         # no, auto, yes
//! test = "none"           # none, area, quant, quantimg, print, crop
//!
//! [processing]
//! max_processes = 4       # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::EntropyFilter;
use crate::placement::PlacementMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid size range: min_size {min} is greater than max_size {max}")]
    InvalidRange { min: f64, max: f64 },
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("invalid override '{0}': expected KEY=VALUE")]
    Override(String),
}

/// Composer configuration.
///
/// All fields have defaults; config files need only specify overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposeConfig {
    /// Where and how the overlay rectangle is chosen.
    pub placement: PlacementConfig,
    /// Color adjustments applied under the overlay.
    pub overlay: OverlayConfig,
    /// External calendar renderer invocation.
    pub calendar: CalendarConfig,
    /// Output naming and diagnostic modes.
    pub output: OutputConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ComposeConfig {
    /// Validate config values are within acceptable ranges.
    ///
    /// Runs before any photo is touched; a failure here is fatal to the run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.placement;
        if !(p.max_size > 0.0 && p.max_size <= 1.0) {
            return Err(ConfigError::Validation(
                "placement.max_size must be in (0, 1]".into(),
            ));
        }
        if let Some(min) = p.min_size {
            if !(min > 0.0 && min <= 1.0) {
                return Err(ConfigError::Validation(
                    "placement.min_size must be in (0, 1]".into(),
                ));
            }
            if min > p.max_size {
                return Err(ConfigError::InvalidRange {
                    min,
                    max: p.max_size,
                });
            }
        }
        if p.quantum == 0 {
            return Err(ConfigError::Validation(
                "placement.quantum must be positive".into(),
            ));
        }
        if !(0.0..=255.0).contains(&p.negative) {
            return Err(ConfigError::Validation(
                "placement.negative must be 0-255".into(),
            ));
        }
        if p.low_entropy < 0.0 || p.relax < 0.0 {
            return Err(ConfigError::Validation(
                "placement.low_entropy and placement.relax must not be negative".into(),
            ));
        }
        parse_ratio(&p.ratio)?;
        if !(-100..=100).contains(&self.overlay.brightness) {
            return Err(ConfigError::Validation(
                "overlay.brightness must be -100..100".into(),
            ));
        }
        if self.calendar.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "calendar.program must not be empty".into(),
            ));
        }
        if self.output.format.contains('.') {
            return Err(ConfigError::Validation(
                "output.format is an extension without the dot".into(),
            ));
        }
        Ok(())
    }
}

/// Placement algorithm settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacementConfig {
    pub mode: PlacementMode,
    /// Side of the square entropy grid.
    pub quantum: u32,
    /// Smallest calendar/photo size ratio (entropy and random modes) or the
    /// margin ratio (compass modes). `None` picks the mode's default.
    pub min_size: Option<f64>,
    /// Largest calendar/photo size ratio.
    pub max_size: f64,
    /// Calendar aspect ratio: a float, `"X/Y"`, or `"0"` to match the photo.
    pub ratio: String,
    /// Entropy (0–255) below which a block is accepted without searching further.
    pub low_entropy: f64,
    /// Relax the minimum entropy by `1 + relax` so bigger sizes qualify.
    pub relax: f64,
    /// Average luminance (0–255) below which a negative overlay is used.
    pub negative: f64,
    pub filter: EntropyFilter,
    /// Seed for random placement and photo sampling; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            mode: PlacementMode::Min,
            quantum: 60,
            min_size: None,
            max_size: 0.8,
            ratio: "0".to_string(),
            low_entropy: 7.0,
            relax: 0.2,
            negative: 100.0,
            filter: EntropyFilter::Sobel,
            seed: None,
        }
    }
}

impl PlacementConfig {
    /// `min_size`, or the mode's default capped at `max_size`.
    pub fn effective_min_size(&self) -> f64 {
        self.min_size.unwrap_or_else(|| {
            let default: f64 = if self.mode.uses_size_range() {
                0.333
            } else {
                0.05
            };
            default.min(self.max_size)
        })
    }
}

/// Color adjustments for the overlaid region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Brightness shift in percent; negated for negative overlays.
    pub brightness: i32,
    /// Saturation of the overlaid area in percent.
    pub saturation: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            brightness: 10,
            saturation: 100,
        }
    }
}

/// External calendar renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarConfig {
    pub program: String,
    pub style: String,
    /// Suppress the default `--no-footer --border=0` arguments.
    pub vanilla: bool,
    /// Extra arguments passed to the renderer after the month/year.
    pub args: Vec<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            program: "callirhoe".to_string(),
            style: "transparent".to_string(),
            vanilla: false,
            args: Vec::new(),
        }
    }
}

/// Output file naming for multi-month runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMode {
    No,
    #[default]
    Auto,
    Yes,
}

/// Diagnostic modes that skip calendar rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    #[default]
    None,
    /// Negate the selected area in the original photo.
    Area,
    /// Negate the selected area in the upscaled entropy map.
    Quant,
    /// Like `Quant`, multiplied with the photo.
    QuantImg,
    /// Print `W H X Y` without writing any files.
    Print,
    /// Write only the selected area.
    Crop,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: String,
    /// Output extension without the dot; empty keeps the input's.
    pub format: String,
    pub prefix: PrefixMode,
    pub test: TestMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
            format: String::new(),
            prefix: PrefixMode::Auto,
            test: TestMode::None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel composition workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least 1
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Parse a calendar ratio: `"0"` (match photo), a float, or `"X/Y"`.
///
/// Returns `0.0` for "match photo".
pub fn parse_ratio(s: &str) -> Result<f64, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::Validation(format!("invalid ratio '{}'", s));
    if let Some((num, den)) = s.split_once('/') {
        let num: u32 = num.trim().parse().map_err(|_| invalid())?;
        let den: u32 = den.trim().parse().map_err(|_| invalid())?;
        if num == 0 || den == 0 {
            return Err(invalid());
        }
        return Ok(num as f64 / den as f64);
    }
    let value: f64 = s.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value)
}

// =============================================================================
// Config loading, merging, and overrides
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ComposeConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// A typed `section.key = value` override.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub key: String,
    pub value: toml::Value,
}

impl Override {
    pub fn new(key: &str, value: impl Into<toml::Value>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }

    /// Parse `KEY=VALUE`. The value is read as a TOML literal when possible
    /// (`0.3`, `true`, `[1, 2]`, `"x"`), otherwise as a bare string.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let (key, raw) = spec
            .split_once('=')
            .ok_or_else(|| ConfigError::Override(spec.to_string()))?;
        let key = key.trim();
        if key.is_empty() || key.split('.').any(str::is_empty) {
            return Err(ConfigError::Override(spec.to_string()));
        }
        let raw = raw.trim();
        let value = toml::from_str::<toml::Table>(&format!("v = {}", raw))
            .ok()
            .and_then(|mut t| t.remove("v"))
            .unwrap_or_else(|| toml::Value::String(raw.to_string()));
        Ok(Self::new(key, value))
    }
}

/// Set `key` (dotted path) in `root`, creating intermediate tables.
pub fn apply_override(root: &mut toml::Value, ov: &Override) -> Result<(), ConfigError> {
    let mut parts: Vec<&str> = ov.key.split('.').collect();
    let leaf = parts
        .pop()
        .ok_or_else(|| ConfigError::Override(ov.key.clone()))?;
    let mut node = root;
    for part in parts {
        let table = node
            .as_table_mut()
            .ok_or_else(|| ConfigError::Override(ov.key.clone()))?;
        node = table
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    }
    let table = node
        .as_table_mut()
        .ok_or_else(|| ConfigError::Override(ov.key.clone()))?;
    table.insert(leaf.to_string(), ov.value.clone());
    Ok(())
}

/// Load a TOML config file as a raw value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge file and overrides onto stock defaults, then deserialize and validate.
pub fn resolve_config(
    file: Option<toml::Value>,
    overrides: &[Override],
) -> Result<ComposeConfig, ConfigError> {
    let mut merged = match file {
        Some(ov) => merge_toml(stock_defaults_value(), ov),
        None => stock_defaults_value(),
    };
    for ov in overrides {
        apply_override(&mut merged, ov)?;
    }
    let config: ComposeConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from an optional file plus overrides.
pub fn load_config(
    path: Option<&Path>,
    overrides: &[Override],
) -> Result<ComposeConfig, ConfigError> {
    let file = path.map(load_raw_config).transpose()?;
    resolve_config(file, overrides)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Photo calendar composition settings
# ===================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.
# Any key can also be set on the command line: --set placement.relax=0.3

# ---------------------------------------------------------------------------
# Placement
# ---------------------------------------------------------------------------
[placement]
# min/max: lowest/highest entropy area; N, S, W, E, NW, NE, SW, SE, center:
# fixed position; random: random size and position.
mode = "min"

# The entropy map is quantum x quantum cells.
quantum = 60

# min/max/random: smallest calendar/photo size ratio (default 0.333).
# Compass modes: margin/opposite-margin ratio (default 0.05).
# min_size = 0.333

# Largest calendar/photo size ratio.
max_size = 0.8

# Calendar ratio as a float or "X/Y"; "0" matches the photo ratio.
ratio = "0"

# Entropy (0-255) at which the search stops early (0 = global minimum).
low_entropy = 7.0

# Relax minimum entropy by 1 + relax to allow bigger sizes.
relax = 0.2

# Average luminance (0-255) of the overlaid area below which a negative
# overlay is chosen.
negative = 100.0

# Entropy filter: "sobel" (edge magnitude) or "highpass" (image minus blur).
filter = "sobel"

# Seed random placement and photo sampling for reproducible runs.
# seed = 42

# ---------------------------------------------------------------------------
# Overlay
# ---------------------------------------------------------------------------
[overlay]
# Brightness change (percent) under the calendar; reversed on negative overlays.
brightness = 10

# Saturation (percent) of the overlaid area.
saturation = 100

# ---------------------------------------------------------------------------
# Calendar renderer
# ---------------------------------------------------------------------------
[calendar]
program = "callirhoe"
style = "transparent"

# Do not add --no-footer --border=0.
vanilla = false

# Extra arguments for the renderer.
args = []

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
dir = "."

# Output file extension without the dot; empty keeps the input's.
format = ""

# YEAR-MONTH_ filename prefix for multi-month runs: "no", "auto", "yes".
prefix = "auto"

# Diagnostics instead of calendars: "none", "area", "quant", "quantimg",
# "print", "crop".
test = "none"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
