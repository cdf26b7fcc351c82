//! One unit of work: a calendar composed onto one photo.
//!
//! ```text
//! cache? ──hit──────────────────────────────┐
//!   │miss                                   │
//!   identify → locate ──test mode?──▶ diagnostic, stop
//!                │                          │
//!                ▼                          ▼
//!        render overlay (tmp .png) → decide dark → cache insert → composite
//! ```
//!
//! The temporary overlay is removed when the unit finishes, successfully or
//! not. Progress is reported as [`ComposeEvent`]s over an optional channel.

use crate::cache::PlacementCache;
use crate::config::{ComposeConfig, ConfigError, TestMode};
use crate::geometry::Geometry;
use crate::imaging::{
    Backdrop, BackendError, ColorAdjust, CompositeParams, CropParams, EntropySettings,
    HighlightParams, ImageToolkit,
};
use crate::placement::{Placement, PlacementError, PlacementSettings, decide_dark, locate};
use crate::render::{CalendarRenderer, RenderError, RenderRequest, renderer_args};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("placement failed: {0}")]
    Placement(#[from] PlacementError),
    #[error("image toolkit error: {0}")]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Render(#[from] RenderError),
}

/// One photo/month pair to compose.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub photo: PathBuf,
    pub output: PathBuf,
    /// `(month, year)` passed to the renderer; `None` lets it pick.
    pub month: Option<(u32, i32)>,
    /// 1-based position in the run.
    pub index: usize,
    pub total: usize,
}

/// Progress events emitted while composing.
#[derive(Debug, Clone, PartialEq)]
pub enum ComposeEvent {
    /// Geometry known for a job, either computed or taken from the cache.
    Placed {
        index: usize,
        total: usize,
        photo: PathBuf,
        geometry: Geometry,
        cached: bool,
    },
    /// Final image written.
    Composed {
        output: PathBuf,
        month: Option<(u32, i32)>,
        dark: bool,
    },
    /// A test mode ran instead of composing. `output` is `None` for `print`.
    Diagnostic {
        mode: TestMode,
        geometry: Geometry,
        output: Option<PathBuf>,
    },
}

/// Outcome of one unit, written to the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeRecord {
    pub photo: PathBuf,
    pub output: Option<PathBuf>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub geometry: Geometry,
    /// Overlay polarity; `None` when a test mode skipped composition.
    pub dark: Option<bool>,
    pub cached: bool,
}

/// Resolved settings for composing.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeSettings {
    pub placement: PlacementSettings,
    pub brightness: i32,
    pub saturation: u32,
    pub style: String,
    pub vanilla: bool,
    pub renderer_args: Vec<String>,
    pub test: TestMode,
    /// Base seed; each job derives its own generator from it.
    pub seed: u64,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            placement: PlacementSettings::default(),
            brightness: 10,
            saturation: 100,
            style: "transparent".to_string(),
            vanilla: false,
            renderer_args: Vec::new(),
            test: TestMode::None,
            seed: 0,
        }
    }
}

impl ComposeSettings {
    pub fn from_config(config: &ComposeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            placement: PlacementSettings::from_config(&config.placement)?,
            brightness: config.overlay.brightness,
            saturation: config.overlay.saturation,
            style: config.calendar.style.clone(),
            vanilla: config.calendar.vanilla,
            renderer_args: config.calendar.args.clone(),
            test: config.output.test,
            seed: config.placement.seed.unwrap_or_else(rand::random),
        })
    }

    /// Region adjustments; brightness is lowered instead for negative overlays.
    pub fn color_adjust(&self, dark: bool) -> ColorAdjust {
        ColorAdjust {
            brightness: if dark {
                -self.brightness
            } else {
                self.brightness
            },
            saturation: self.saturation,
        }
    }
}

/// Composes jobs against a toolkit and a renderer.
pub struct Composer<'a> {
    toolkit: &'a dyn ImageToolkit,
    renderer: &'a dyn CalendarRenderer,
    settings: ComposeSettings,
    cache: Option<&'a PlacementCache>,
    events: Option<Sender<ComposeEvent>>,
}

impl<'a> Composer<'a> {
    pub fn new(
        toolkit: &'a dyn ImageToolkit,
        renderer: &'a dyn CalendarRenderer,
        settings: ComposeSettings,
    ) -> Self {
        Self {
            toolkit,
            renderer,
            settings,
            cache: None,
            events: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<&'a PlacementCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_events(mut self, events: Option<Sender<ComposeEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &ComposeSettings {
        &self.settings
    }

    fn emit(&self, event: ComposeEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is listening; composing continues
            tx.send(event).ok();
        }
    }

    /// Compose one job.
    pub fn compose(&self, job: &Job) -> Result<ComposeRecord, ComposeError> {
        let cached = self.cache.and_then(|c| c.get(&job.photo));
        let geometry = match cached {
            Some(p) => {
                log::debug!("{}: reusing cached placement {}", job.photo.display(), p.geometry);
                p.geometry
            }
            None => {
                let dims = self.toolkit.identify(&job.photo)?;
                log::debug!(
                    "{} {}x{} {}mp R={:.2}",
                    job.photo.display(),
                    dims.width,
                    dims.height,
                    ((dims.width as u64 * dims.height as u64) as f64 / 1e6).round(),
                    dims.ratio()
                );
                let seed = self.settings.seed.wrapping_add(job.index as u64);
                let mut rng = StdRng::seed_from_u64(seed);
                locate(self.toolkit, &job.photo, dims, &self.settings.placement, &mut rng)?
                    .geometry
            }
        };

        self.emit(ComposeEvent::Placed {
            index: job.index,
            total: job.total,
            photo: job.photo.clone(),
            geometry,
            cached: cached.is_some(),
        });

        let mut record = ComposeRecord {
            photo: job.photo.clone(),
            output: Some(job.output.clone()),
            month: job.month.map(|(m, _)| m),
            year: job.month.map(|(_, y)| y),
            geometry,
            dark: None,
            cached: cached.is_some(),
        };

        if self.settings.test != TestMode::None {
            record.output = self.run_diagnostic(job, geometry)?;
            self.emit(ComposeEvent::Diagnostic {
                mode: self.settings.test,
                geometry,
                output: record.output.clone(),
            });
            return Ok(record);
        }

        let overlay = tempfile::Builder::new()
            .prefix("photocal-")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();

        self.renderer.render(&RenderRequest {
            style: self.settings.style.clone(),
            size: (geometry.width, geometry.height),
            args: renderer_args(job.month, &self.settings.renderer_args, self.settings.vanilla),
            output: overlay.to_path_buf(),
        })?;

        let dark = match cached {
            Some(p) => p.dark,
            None => {
                let dark = decide_dark(
                    self.toolkit,
                    &job.photo,
                    geometry,
                    self.settings.placement.negative,
                )?;
                if let Some(cache) = self.cache {
                    cache.insert(&job.photo, Placement { geometry, dark });
                }
                dark
            }
        };

        self.toolkit.composite(&CompositeParams {
            base: job.photo.clone(),
            overlay: overlay.to_path_buf(),
            output: job.output.clone(),
            region: geometry,
            adjust: self.settings.color_adjust(dark),
            invert: dark,
        })?;
        overlay.close()?;

        self.emit(ComposeEvent::Composed {
            output: job.output.clone(),
            month: job.month,
            dark,
        });
        record.dark = Some(dark);
        Ok(record)
    }

    fn run_diagnostic(&self, job: &Job, region: Geometry) -> Result<Option<PathBuf>, ComposeError> {
        let highlight = |backdrop| HighlightParams {
            source: job.photo.clone(),
            output: job.output.clone(),
            region,
            backdrop,
            // backdrops always show the map as computed, even in max mode
            entropy: EntropySettings {
                negate: false,
                ..self.settings.placement.entropy_settings()
            },
        };
        match self.settings.test {
            TestMode::None | TestMode::Print => return Ok(None),
            TestMode::Area => self.toolkit.highlight(&highlight(Backdrop::Photo))?,
            TestMode::Quant => self.toolkit.highlight(&highlight(Backdrop::EntropyMap))?,
            TestMode::QuantImg => self
                .toolkit
                .highlight(&highlight(Backdrop::EntropyOverPhoto))?,
            TestMode::Crop => self.toolkit.crop(&CropParams {
                source: job.photo.clone(),
                output: job.output.clone(),
                region,
            })?,
        }
        Ok(Some(job.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::write_p2;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::{MockToolkit, RecordedOp};
    use crate::placement::PlacementMode;
    use crate::render::tests::MockRenderer;
    use std::sync::mpsc;

    fn hole_raster() -> String {
        let mut samples = vec![100u8; 100];
        for y in 2..5 {
            for x in 2..5 {
                samples[y * 10 + x] = 0;
            }
        }
        write_p2(10, &samples)
    }

    fn toolkit(luminance: f64) -> MockToolkit {
        MockToolkit::with_photo(
            Dimensions {
                width: 1000,
                height: 1000,
            },
            &hole_raster(),
            luminance,
        )
    }

    fn settings() -> ComposeSettings {
        ComposeSettings {
            placement: PlacementSettings {
                quantum: 10,
                size_range: (0.2, 0.5),
                low_entropy: 0.0,
                relax: 0.0,
                ..PlacementSettings::default()
            },
            ..ComposeSettings::default()
        }
    }

    fn job(index: usize) -> Job {
        Job {
            photo: "/photos/a.jpg".into(),
            output: format!("/out/{index}.jpg").into(),
            month: Some((index as u32, 2025)),
            index,
            total: 3,
        }
    }

    const HOLE: Geometry = Geometry {
        width: 300,
        height: 300,
        x: 200,
        y: 200,
    };

    #[test]
    fn compose_runs_pipeline_in_order() {
        let toolkit = toolkit(40.0);
        let renderer = MockRenderer::new();
        let composer = Composer::new(&toolkit, &renderer, settings());

        let record = composer.compose(&job(1)).unwrap();
        assert_eq!(record.geometry, HOLE);
        assert_eq!(record.dark, Some(true));
        assert_eq!(record.month, Some(1));

        let ops = toolkit.get_operations();
        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], RecordedOp::Identify(_)));
        assert!(matches!(&ops[1], RecordedOp::EntropyRaster { .. }));
        assert!(matches!(&ops[2], RecordedOp::RegionLuminance { region, .. } if *region == HOLE));
        match &ops[3] {
            RecordedOp::Composite {
                output,
                region,
                adjust,
                invert,
                overlay,
                ..
            } => {
                assert_eq!(output, "/out/1.jpg");
                assert_eq!(*region, HOLE);
                assert!(*invert);
                assert_eq!(adjust.brightness, -10);
                assert!(overlay.ends_with(".png"));
                // temporary overlay removed afterwards
                assert!(!std::path::Path::new(overlay).exists());
            }
            other => panic!("expected composite, got {other:?}"),
        }

        let requests = renderer.get_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].size, (300, 300));
        assert_eq!(requests[0].style, "transparent");
        assert_eq!(
            requests[0].args,
            vec!["1", "2025", "--no-footer", "--border=0"]
        );
    }

    #[test]
    fn light_region_keeps_brightness_positive() {
        let toolkit = toolkit(200.0);
        let renderer = MockRenderer::new();
        let composer = Composer::new(&toolkit, &renderer, settings());
        let record = composer.compose(&job(1)).unwrap();
        assert_eq!(record.dark, Some(false));
        assert!(toolkit.get_operations().iter().any(|op| matches!(
            op,
            RecordedOp::Composite { invert: false, adjust, .. } if adjust.brightness == 10
        )));
    }

    #[test]
    fn cache_reuses_placement_and_polarity() {
        let toolkit = toolkit(40.0);
        let renderer = MockRenderer::new();
        let cache = PlacementCache::new();
        let composer = Composer::new(&toolkit, &renderer, settings()).with_cache(Some(&cache));

        composer.compose(&job(1)).unwrap();
        let second = composer.compose(&job(2)).unwrap();
        assert!(second.cached);
        assert_eq!(second.dark, Some(true));

        let ops = toolkit.get_operations();
        let identifies = ops.iter().filter(|op| matches!(op, RecordedOp::Identify(_))).count();
        let lumas = ops
            .iter()
            .filter(|op| matches!(op, RecordedOp::RegionLuminance { .. }))
            .count();
        assert_eq!(identifies, 1);
        assert_eq!(lumas, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn render_failure_skips_composite() {
        let toolkit = toolkit(40.0);
        let renderer = MockRenderer::failing();
        let composer = Composer::new(&toolkit, &renderer, settings());
        let err = composer.compose(&job(1)).unwrap_err();
        assert!(matches!(err, ComposeError::Render(_)));
        assert!(
            !toolkit
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Composite { .. }))
        );
    }

    #[test]
    fn composite_failure_is_reported() {
        let toolkit = toolkit(40.0);
        *toolkit.fail_composite.lock().unwrap() = true;
        let renderer = MockRenderer::new();
        let composer = Composer::new(&toolkit, &renderer, settings());
        assert!(matches!(
            composer.compose(&job(1)),
            Err(ComposeError::Backend(_))
        ));
    }

    #[test]
    fn vanilla_and_extra_args_reach_renderer() {
        let toolkit = toolkit(200.0);
        let renderer = MockRenderer::new();
        let composer = Composer::new(
            &toolkit,
            &renderer,
            ComposeSettings {
                vanilla: true,
                style: "bw".into(),
                renderer_args: vec!["--lang=de".into()],
                ..settings()
            },
        );
        let mut j = job(1);
        j.month = None;
        composer.compose(&j).unwrap();
        let req = &renderer.get_requests()[0];
        assert_eq!(req.args, vec!["--lang=de"]);
        assert_eq!(req.style, "bw");
    }

    // =========================================================================
    // test modes
    // =========================================================================

    #[test]
    fn print_mode_writes_nothing() {
        let toolkit = toolkit(40.0);
        let renderer = MockRenderer::new();
        let (tx, rx) = mpsc::channel();
        let composer = Composer::new(
            &toolkit,
            &renderer,
            ComposeSettings {
                test: TestMode::Print,
                ..settings()
            },
        )
        .with_events(Some(tx));

        let record = composer.compose(&job(1)).unwrap();
        drop(composer);
        assert_eq!(record.output, None);
        assert_eq!(record.dark, None);
        assert!(renderer.get_requests().is_empty());

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            ComposeEvent::Diagnostic {
                mode: TestMode::Print,
                geometry: HOLE,
                output: None,
            }
        );
    }

    #[test]
    fn area_and_crop_modes_use_toolkit() {
        for (mode, is_crop) in [(TestMode::Area, false), (TestMode::Crop, true)] {
            let toolkit = toolkit(40.0);
            let renderer = MockRenderer::new();
            let composer = Composer::new(
                &toolkit,
                &renderer,
                ComposeSettings {
                    test: mode,
                    ..settings()
                },
            );
            let record = composer.compose(&job(1)).unwrap();
            assert_eq!(record.output, Some(PathBuf::from("/out/1.jpg")));
            let last = toolkit.get_operations().pop().unwrap();
            if is_crop {
                assert!(matches!(last, RecordedOp::Crop { region, .. } if region == HOLE));
            } else {
                assert!(matches!(last, RecordedOp::Highlight { region, .. } if region == HOLE));
            }
            assert!(renderer.get_requests().is_empty());
        }
    }

    #[test]
    fn entropy_backdrops_are_not_negated_in_max_mode() {
        for mode in [TestMode::Quant, TestMode::QuantImg] {
            let toolkit = toolkit(40.0);
            let renderer = MockRenderer::new();
            let base = settings();
            let composer = Composer::new(
                &toolkit,
                &renderer,
                ComposeSettings {
                    test: mode,
                    placement: PlacementSettings {
                        mode: PlacementMode::Max,
                        ..base.placement
                    },
                    ..base
                },
            );
            composer.compose(&job(1)).unwrap();
            let mut ops = toolkit.get_operations();
            let last = ops.pop().unwrap();
            assert!(matches!(last, RecordedOp::Highlight { negate: false, .. }));
            assert!(
                ops.iter()
                    .any(|op| matches!(op, RecordedOp::EntropyRaster { negate: true, .. }))
            );
        }
    }

    #[test]
    fn events_report_placement_then_result() {
        let toolkit = toolkit(200.0);
        let renderer = MockRenderer::new();
        let (tx, rx) = mpsc::channel();
        let composer = Composer::new(&toolkit, &renderer, settings()).with_events(Some(tx));
        composer.compose(&job(2)).unwrap();
        drop(composer);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                ComposeEvent::Placed {
                    index: 2,
                    total: 3,
                    photo: "/photos/a.jpg".into(),
                    geometry: HOLE,
                    cached: false,
                },
                ComposeEvent::Composed {
                    output: "/out/2.jpg".into(),
                    month: Some((2, 2025)),
                    dark: false,
                },
            ]
        );
    }

    #[test]
    fn color_adjust_flips_brightness_for_dark() {
        let s = ComposeSettings::default();
        assert_eq!(s.color_adjust(false).brightness, 10);
        assert_eq!(s.color_adjust(true).brightness, -10);
        assert_eq!(s.color_adjust(true).saturation, 100);
    }

    #[test]
    fn settings_from_default_config() {
        let s = ComposeSettings::from_config(&ComposeConfig::default()).unwrap();
        assert_eq!(s.style, "transparent");
        assert_eq!(s.placement.size_range, (0.333, 0.8));
        assert_eq!(s.test, TestMode::None);
    }
}
