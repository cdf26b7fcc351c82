//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Compose
//!
//! ```text
//! 001/012 beach.jpg 1240x930+2110+180
//!     2025-01 → out/2025-01_beach.jpg (negative)
//! 002/012 forest.jpg 1600x1200+0+0 (cached)
//!     2025-02 → out/2025-02_forest.jpg
//!
//! Composed 12 calendars
//! Placements: 6 cached, 6 computed (12 total)
//! ```
//!
//! The `print` test mode writes one bare `W H X Y` line per job instead, so
//! its output can be piped into other tools.
//!
//! ## Fit
//!
//! ```text
//! avg=3.250 min=1.100 frac=0.50x0.50 pos=12,30 block=30x30
//! ```
//!
//! # Architecture
//!
//! Each event or result has a `format_*` function (returns `Vec<String>`)
//! for testability. Format functions are pure; the printer thread in `main`
//! writes their lines to stdout.

use crate::batch::BatchSummary;
use crate::compose::ComposeEvent;
use crate::config::TestMode;
use crate::entropy::FitResult;
use std::path::Path;

/// Format a 1-based index against a total, zero-padded to 3 digits.
fn format_position(index: usize, total: usize) -> String {
    format!("{:0>3}/{:0>3}", index, total)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_month(month: Option<(u32, i32)>) -> Option<String> {
    month.map(|(m, y)| format!("{:04}-{:02}", y, m))
}

fn mode_name(mode: TestMode) -> &'static str {
    match mode {
        TestMode::None => "none",
        TestMode::Area => "area",
        TestMode::Quant => "quant",
        TestMode::QuantImg => "quantimg",
        TestMode::Print => "print",
        TestMode::Crop => "crop",
    }
}

// ============================================================================
// Compose events
// ============================================================================

/// Format a single compose progress event as display lines.
///
/// `quiet` drops the placement line; it is set for the `print` test mode so
/// that only the geometry reaches stdout.
pub fn format_compose_event(event: &ComposeEvent, quiet: bool) -> Vec<String> {
    match event {
        ComposeEvent::Placed {
            index,
            total,
            photo,
            geometry,
            cached,
        } => {
            if quiet {
                return Vec::new();
            }
            let marker = if *cached { " (cached)" } else { "" };
            vec![format!(
                "{} {} {}{}",
                format_position(*index, *total),
                file_name(photo),
                geometry,
                marker
            )]
        }
        ComposeEvent::Composed {
            output,
            month,
            dark,
        } => {
            let month = format_month(*month)
                .map(|m| format!("{} ", m))
                .unwrap_or_default();
            let polarity = if *dark { " (negative)" } else { "" };
            vec![format!("    {}→ {}{}", month, output.display(), polarity)]
        }
        ComposeEvent::Diagnostic {
            mode: TestMode::Print,
            geometry,
            ..
        } => vec![format!(
            "{} {} {} {}",
            geometry.width, geometry.height, geometry.x, geometry.y
        )],
        ComposeEvent::Diagnostic {
            mode,
            output: Some(output),
            ..
        } => vec![format!("    {} → {}", mode_name(*mode), output.display())],
        ComposeEvent::Diagnostic { .. } => Vec::new(),
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// Format the end-of-run summary.
pub fn format_summary(summary: &BatchSummary, test: TestMode) -> Vec<String> {
    let mut lines = Vec::new();
    if test == TestMode::Print {
        // stdout carries geometry only; failures still go to the summary
        if summary.is_success() {
            return lines;
        }
    } else {
        lines.push(String::new());
        let n = summary.records.len();
        let noun = if n == 1 { "calendar" } else { "calendars" };
        if test == TestMode::None {
            lines.push(format!("Composed {} {}", n, noun));
        } else {
            lines.push(format!("Wrote {} {} diagnostics", n, mode_name(test)));
        }
        if let Some(stats) = summary.cache {
            lines.push(format!("Placements: {}", stats));
        }
    }

    for failure in &summary.failures {
        lines.push(format!(
            "Failed {} {}: {}",
            format_position(failure.job.index, failure.job.total),
            file_name(&failure.job.photo),
            failure.error
        ));
    }
    if !summary.skipped.is_empty() {
        lines.push(format!(
            "Skipped {} remaining after failure",
            summary.skipped.len()
        ));
    }
    lines
}

// ============================================================================
// Fit
// ============================================================================

/// Format a rectangle fit on a standalone entropy map.
pub fn format_fit_result(fit: &FitResult) -> Vec<String> {
    let c = &fit.candidate;
    vec![format!(
        "avg={:.3} min={:.3} frac={:.2}x{:.2} pos={},{} block={}x{}",
        c.average,
        fit.global_min_average,
        c.size_fraction.0,
        c.size_fraction.1,
        c.position.0,
        c.position.1,
        c.block_size.0,
        c.block_size.1
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Failure;
    use crate::cache::CacheStats;
    use crate::compose::{ComposeRecord, Job};
    use crate::entropy::Candidate;
    use crate::geometry::Geometry;
    use std::path::PathBuf;

    const GEOMETRY: Geometry = Geometry {
        width: 300,
        height: 200,
        x: 10,
        y: 20,
    };

    fn job(index: usize) -> Job {
        Job {
            photo: PathBuf::from("/photos/beach.jpg"),
            output: PathBuf::from("out/beach.jpg"),
            month: Some((1, 2025)),
            index,
            total: 12,
        }
    }

    fn record() -> ComposeRecord {
        ComposeRecord {
            photo: PathBuf::from("/photos/beach.jpg"),
            output: Some(PathBuf::from("out/beach.jpg")),
            month: Some(1),
            year: Some(2025),
            geometry: GEOMETRY,
            dark: Some(false),
            cached: false,
        }
    }

    // =========================================================================
    // helpers
    // =========================================================================

    #[test]
    fn format_position_pads() {
        assert_eq!(format_position(1, 12), "001/012");
        assert_eq!(format_position(123, 1000), "123/1000");
    }

    #[test]
    fn format_month_year_first() {
        assert_eq!(format_month(Some((3, 2025))), Some("2025-03".to_string()));
        assert_eq!(format_month(None), None);
    }

    // =========================================================================
    // compose events
    // =========================================================================

    #[test]
    fn placed_line() {
        let event = ComposeEvent::Placed {
            index: 1,
            total: 12,
            photo: PathBuf::from("/photos/beach.jpg"),
            geometry: GEOMETRY,
            cached: true,
        };
        assert_eq!(
            format_compose_event(&event, false),
            vec!["001/012 beach.jpg 300x200+10+20 (cached)"]
        );
        assert!(format_compose_event(&event, true).is_empty());
    }

    #[test]
    fn composed_line_with_month_and_polarity() {
        let event = ComposeEvent::Composed {
            output: PathBuf::from("out/2025-01_beach.jpg"),
            month: Some((1, 2025)),
            dark: true,
        };
        assert_eq!(
            format_compose_event(&event, false),
            vec!["    2025-01 → out/2025-01_beach.jpg (negative)"]
        );
    }

    #[test]
    fn composed_line_without_month() {
        let event = ComposeEvent::Composed {
            output: PathBuf::from("beach_cal.jpg"),
            month: None,
            dark: false,
        };
        assert_eq!(format_compose_event(&event, false), vec!["    → beach_cal.jpg"]);
    }

    #[test]
    fn print_diagnostic_is_bare_geometry() {
        let event = ComposeEvent::Diagnostic {
            mode: TestMode::Print,
            geometry: GEOMETRY,
            output: None,
        };
        assert_eq!(format_compose_event(&event, true), vec!["300 200 10 20"]);
    }

    #[test]
    fn file_diagnostic_names_output() {
        let event = ComposeEvent::Diagnostic {
            mode: TestMode::QuantImg,
            geometry: GEOMETRY,
            output: Some(PathBuf::from("d.png")),
        };
        assert_eq!(format_compose_event(&event, false), vec!["    quantimg → d.png"]);
    }

    // =========================================================================
    // summary
    // =========================================================================

    #[test]
    fn summary_success_with_cache() {
        let summary = BatchSummary {
            records: vec![record(), record()],
            cache: Some(CacheStats { hits: 1, misses: 1 }),
            ..BatchSummary::default()
        };
        assert_eq!(
            format_summary(&summary, TestMode::None),
            vec!["", "Composed 2 calendars", "Placements: 1 cached, 1 computed (2 total)"]
        );
    }

    #[test]
    fn summary_lists_failures_and_skips() {
        let summary = BatchSummary {
            records: vec![record()],
            failures: vec![Failure {
                job: job(2),
                error: "boom".into(),
            }],
            skipped: vec![job(3), job(4)],
            cache: None,
        };
        let lines = format_summary(&summary, TestMode::None);
        assert_eq!(lines[1], "Composed 1 calendar");
        assert_eq!(lines[2], "Failed 002/012 beach.jpg: boom");
        assert_eq!(lines[3], "Skipped 2 remaining after failure");
    }

    #[test]
    fn summary_silent_for_successful_print() {
        let summary = BatchSummary {
            records: vec![record()],
            ..BatchSummary::default()
        };
        assert!(format_summary(&summary, TestMode::Print).is_empty());
    }

    #[test]
    fn summary_for_diagnostics() {
        let summary = BatchSummary {
            records: vec![record()],
            ..BatchSummary::default()
        };
        assert_eq!(format_summary(&summary, TestMode::Crop)[1], "Wrote 1 crop diagnostics");
    }

    // =========================================================================
    // fit
    // =========================================================================

    #[test]
    fn fit_result_line() {
        let fit = FitResult {
            candidate: Candidate {
                average: 3.25,
                size_fraction: (0.5, 0.5),
                position: (12, 30),
                block_size: (30, 30),
            },
            global_min_average: 1.1,
        };
        assert_eq!(
            format_fit_result(&fit),
            vec!["avg=3.250 min=1.100 frac=0.50x0.50 pos=12,30 block=30x30"]
        );
    }
}
